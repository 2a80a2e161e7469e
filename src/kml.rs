//! KML polygon I/O.
//!
//! Parsing uses a streaming `quick_xml::Reader` that walks start/text/end
//! events rather than building a DOM, tracking just enough state (which
//! boundary, whether we're inside `<coordinates>`) to assemble rings.
//! Emission uses `quick_xml::Writer`, so one dependency covers both
//! directions instead of pulling in a templating crate.

use std::io::{BufRead, Cursor, Write};
use std::path::{Path, PathBuf};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use thiserror::Error;
use tracing::debug;

use crate::projection::Projection;
use crate::types::{GeoPoint, TypeError, XyPoint};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KmlError {
    #[error("reading KML: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing KML XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed KML document: {0}")]
    Schema(String),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("invalid coordinate value: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

pub type Result<T> = std::result::Result<T, KmlError>;

#[derive(Default)]
struct PolygonBuilder {
    exterior: Vec<Coord<f64>>,
    interiors: Vec<Vec<Coord<f64>>>,
}

enum RingKind {
    Outer,
    Inner,
}

/// Parses every `Polygon` under a KML `Document`, forward-projecting each
/// ring's `lon,lat[,alt]` coordinates through `proj` into the working plane.
#[tracing::instrument(name = "parse_kml", level = "debug", skip_all)]
pub fn parse<R: BufRead>(reader: R, proj: &impl Projection) -> Result<MultiPolygon<f64>> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut polygons = Vec::new();
    let mut current: Option<PolygonBuilder> = None;
    let mut ring_kind: Option<RingKind> = None;
    let mut in_coordinates = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Polygon" => current = Some(PolygonBuilder::default()),
                b"outerBoundaryIs" => ring_kind = Some(RingKind::Outer),
                b"innerBoundaryIs" => ring_kind = Some(RingKind::Inner),
                b"coordinates" => in_coordinates = true,
                _ => {}
            },
            Event::Text(t) if in_coordinates => {
                let text = t.unescape()?;
                let builder = current
                    .as_mut()
                    .ok_or_else(|| KmlError::Schema("coordinates outside a Polygon".into()))?;
                let ring = parse_coordinate_text(&text, proj)?;
                match ring_kind {
                    Some(RingKind::Outer) => builder.exterior = ring,
                    Some(RingKind::Inner) => builder.interiors.push(ring),
                    None => {
                        return Err(KmlError::Schema(
                            "coordinates outside outerBoundaryIs/innerBoundaryIs".into(),
                        ));
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"coordinates" => in_coordinates = false,
                b"outerBoundaryIs" | b"innerBoundaryIs" => ring_kind = None,
                b"Polygon" => {
                    let builder = current
                        .take()
                        .ok_or_else(|| KmlError::Schema("unmatched </Polygon>".into()))?;
                    if builder.exterior.is_empty() {
                        return Err(KmlError::Schema("Polygon missing outerBoundaryIs".into()));
                    }
                    let interiors = builder.interiors.into_iter().map(LineString::new).collect();
                    polygons.push(Polygon::new(LineString::new(builder.exterior), interiors));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(count = polygons.len(), "parsed KML polygons");
    Ok(MultiPolygon::new(polygons))
}

fn parse_coordinate_text(text: &str, proj: &impl Projection) -> Result<Vec<Coord<f64>>> {
    let mut coords = Vec::new();
    for triple in text.split_whitespace() {
        let mut parts = triple.splitn(3, ',');
        let lon: f64 = parts
            .next()
            .ok_or_else(|| KmlError::Schema(format!("malformed coordinate tuple: {triple}")))?
            .parse()?;
        let lat: f64 = parts
            .next()
            .ok_or_else(|| KmlError::Schema(format!("malformed coordinate tuple: {triple}")))?
            .parse()?;
        let point = GeoPoint::new(lat, lon)?;
        let xy = proj.forward(&point);
        coords.push(Coord { x: xy.x, y: xy.y });
    }
    Ok(coords)
}

/// Serializes a polygon set back to a KML document, inverse-projecting
/// coordinates (including any interior rings) to lat/lon.
pub fn to_kml_bytes(poly: &MultiPolygon<f64>, proj: &impl Projection) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Start(BytesStart::new("kml")))?;
    writer.write_event(Event::Start(BytesStart::new("Document")))?;

    for polygon in poly.iter() {
        write_polygon(&mut writer, polygon, proj)?;
    }

    writer.write_event(Event::End(BytesEnd::new("Document")))?;
    writer.write_event(Event::End(BytesEnd::new("kml")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_polygon<W: Write>(writer: &mut Writer<W>, polygon: &Polygon<f64>, proj: &impl Projection) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
    writer.write_event(Event::Start(BytesStart::new("Polygon")))?;
    write_boundary(writer, "outerBoundaryIs", polygon.exterior(), proj)?;
    for interior in polygon.interiors() {
        write_boundary(writer, "innerBoundaryIs", interior, proj)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Polygon")))?;
    writer.write_event(Event::End(BytesEnd::new("Placemark")))?;
    Ok(())
}

fn write_boundary<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    ring: &LineString<f64>,
    proj: &impl Projection,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Start(BytesStart::new("LinearRing")))?;
    writer.write_event(Event::Start(BytesStart::new("coordinates")))?;

    let mut text = String::new();
    for coord in &ring.0 {
        let point = proj.inverse(&XyPoint::new(coord.x, coord.y))?;
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("{},{},0", point.lon(), point.lat()));
    }
    writer.write_event(Event::Text(BytesText::new(&text)))?;

    writer.write_event(Event::End(BytesEnd::new("coordinates")))?;
    writer.write_event(Event::End(BytesEnd::new("LinearRing")))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Writes `poly` as a KML snapshot named
/// `{service}_{test}_{test_id}_q_{restart_count}_{attack_queries}_{tag}.kml`
/// under `kml_dir`, returning both the path written and the bytes (so a
/// caller building a trace entry doesn't need to read the file back).
#[allow(clippy::too_many_arguments)]
pub fn write_kml(
    poly: &MultiPolygon<f64>,
    proj: &impl Projection,
    kml_dir: &Path,
    service: &str,
    test: &str,
    test_id: &str,
    restart_count: u64,
    attack_queries: u64,
    tag: &str,
) -> Result<(PathBuf, Vec<u8>)> {
    let bytes = to_kml_bytes(poly, proj)?;
    let filename = format!("{service}_{test}_{test_id}_q_{restart_count}_{attack_queries}_{tag}.kml");
    let path = kml_dir.join(filename);
    std::fs::write(&path, &bytes)?;
    debug!(path = %path.display(), "wrote KML snapshot");
    Ok((path, bytes))
}

#[cfg(test)]
mod tests {
    use geo::Area;

    use super::*;
    use crate::projection::IdentityProjection;

    fn square() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::new(vec![
                Coord { x: -1000.0, y: -1000.0 },
                Coord { x: 1000.0, y: -1000.0 },
                Coord { x: 1000.0, y: 1000.0 },
                Coord { x: -1000.0, y: 1000.0 },
                Coord { x: -1000.0, y: -1000.0 },
            ]),
            vec![],
        )])
    }

    #[test]
    fn round_trips_through_kml_bytes() {
        let proj = IdentityProjection::default();
        let original = square();

        let bytes = to_kml_bytes(&original, &proj).unwrap();
        let parsed = parse(Cursor::new(bytes), &proj).unwrap();

        assert_eq!(parsed.0.len(), 1);
        assert!((parsed.unsigned_area() - original.unsigned_area()).abs() < 1.0);
    }

    #[test]
    fn missing_outer_boundary_is_a_schema_error() {
        let proj = IdentityProjection::default();
        let doc = br#"<kml><Document><Placemark><Polygon></Polygon></Placemark></Document></kml>"#;
        let err = parse(Cursor::new(doc.as_ref()), &proj).unwrap_err();
        assert!(matches!(err, KmlError::Schema(_)));
    }

    #[test]
    fn coordinates_outside_polygon_is_a_schema_error() {
        let proj = IdentityProjection::default();
        let doc = br#"<kml><Document><coordinates>0,0,0</coordinates></Document></kml>"#;
        let err = parse(Cursor::new(doc.as_ref()), &proj).unwrap_err();
        assert!(matches!(err, KmlError::Schema(_)));
    }
}
