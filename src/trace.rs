//! Append-only attack trace and its JSON report format.
//!
//! One `AttackTrace` is allocated per attack instance and flushed exactly
//! once at termination, never shared at type or module scope (see the design
//! notes for why that matters). Serialization rides on `serde`/`serde_json`,
//! the same as the rest of this engine's JSON-facing surface.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::types::GeoPoint;

/// A timestamp-derived test identifier, for callers that don't already have
/// one from an enclosing test harness.
pub fn generate_test_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    #[error("serializing attack trace: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("writing attack trace: {0}")]
    Io(#[from] std::io::Error),
}

/// Which probe stream an entry belongs to.
#[derive(Clone, Copy, Debug)]
pub enum Stream {
    Coverage,
    Dudp,
    Rudp,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProbeEntry {
    pub query: u64,
    pub kml_path: String,
    pub active_area_m2: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LocationEntry {
    pub query: u64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AttackTrace {
    pub coverage: Vec<ProbeEntry>,
    pub dudp: Vec<ProbeEntry>,
    pub rudp: Vec<ProbeEntry>,
    pub est_location: Option<LocationEntry>,
    pub real_location: Option<LocationEntry>,
}

impl AttackTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_probe(&mut self, stream: Stream, query: u64, kml_path: impl Into<String>, active_area_m2: f64) {
        let entry = ProbeEntry { query, kml_path: kml_path.into(), active_area_m2 };
        match stream {
            Stream::Coverage => self.coverage.push(entry),
            Stream::Dudp => self.dudp.push(entry),
            Stream::Rudp => self.rudp.push(entry),
        }
    }

    pub fn set_est_location(&mut self, query: u64, point: GeoPoint) {
        self.est_location = Some(LocationEntry { query, lat: point.lat(), lon: point.lon() });
    }

    pub fn set_real_location(&mut self, query: u64, point: GeoPoint) {
        self.real_location = Some(LocationEntry { query, lat: point.lat(), lon: point.lon() });
    }

    /// Serializes the trace to `{dir}/files/json/{service}_{stage}_{test_id}.json`,
    /// creating the directory tree if needed. Called exactly once per attack,
    /// including on fatal abort (best-effort).
    pub fn flush(&self, dir: &Path, service: &str, stage: &str, test_id: &str) -> Result<(), TraceError> {
        let json_dir = dir.join("files").join("json");
        fs::create_dir_all(&json_dir)?;
        let path = json_dir.join(format!("{service}_{stage}_{test_id}.json"));
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
