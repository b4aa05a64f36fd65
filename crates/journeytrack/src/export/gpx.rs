//! GPX 1.1 export: a single track with one segment.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::Reliability;
use crate::error::{Error, Result};
use crate::journey::{Journey, RoutePoint};

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const EXTENSION_NAMESPACE: &str = "https://journeytrack.dev/xmlschemas/point/1";

type XmlWriter = Writer<Vec<u8>>;

pub(super) fn to_gpx(journey: &Journey) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(
        &mut writer,
        Event::Start(BytesStart::new("gpx").with_attributes([
            ("version", "1.1"),
            ("creator", "journeytrack"),
            ("xmlns", GPX_NAMESPACE),
            ("xmlns:jt", EXTENSION_NAMESPACE),
        ])),
    )?;

    write(&mut writer, Event::Start(BytesStart::new("metadata")))?;
    text_element(&mut writer, "name", &format!("Journey {}", journey.journey_id))?;
    text_element(&mut writer, "time", &journey.start_time.to_rfc3339())?;
    write(&mut writer, Event::End(BytesEnd::new("metadata")))?;

    write(&mut writer, Event::Start(BytesStart::new("trk")))?;
    text_element(&mut writer, "name", journey.vehicle_label())?;
    write(&mut writer, Event::Start(BytesStart::new("trkseg")))?;
    for point in &journey.route_points {
        track_point(&mut writer, point)?;
    }
    write(&mut writer, Event::End(BytesEnd::new("trkseg")))?;
    write(&mut writer, Event::End(BytesEnd::new("trk")))?;
    write(&mut writer, Event::End(BytesEnd::new("gpx")))?;

    Ok(writer.into_inner())
}

fn track_point(writer: &mut XmlWriter, point: &RoutePoint) -> Result<()> {
    let lat = point.latitude.to_string();
    let lon = point.longitude.to_string();
    write(
        writer,
        Event::Start(
            BytesStart::new("trkpt").with_attributes([("lat", lat.as_str()), ("lon", lon.as_str())]),
        ),
    )?;
    text_element(writer, "time", &point.timestamp.to_rfc3339())?;
    write(writer, Event::Start(BytesStart::new("extensions")))?;
    text_element(writer, "jt:speed", &format!("{:.2}", point.speed))?;
    text_element(writer, "jt:heading", &format!("{:.1}", point.heading))?;
    if let Some(accuracy) = point.accuracy {
        text_element(writer, "jt:accuracy", &format!("{accuracy:.1}"))?;
    }
    text_element(writer, "jt:source", point.source.as_str())?;
    text_element(writer, "jt:reliability", Reliability::of(point.source).as_str())?;
    write(writer, Event::End(BytesEnd::new("extensions")))?;
    write(writer, Event::End(BytesEnd::new("trkpt")))
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::xml(e.to_string()))
}
