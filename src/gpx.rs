use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;
use crate::model::{Activity, DistanceAccumulator, Lap, TrackPoint};
use crate::xml::{self, Namespaces, Result, Root, XmlReader};

/// Root prefix under which vendor extensions (cumulative distance, speed,
/// heart rate) are looked up.
const EXTENSION_PREFIX: &str = "gpxdata";

/// Parse a GPX document: one activity per `<trk>`, one lap per `<trkseg>`.
pub fn parse(xml: &str) -> Result<Vec<Activity>> {
    let mut reader = Reader::from_str(xml);
    let root = xml::read_root(&mut reader)?;
    let ns = Namespaces::from_root(root.start())?;

    let mut activities = Vec::new();
    if let Root::Open(start) = &root {
        let end_name = start.name().as_ref().to_vec();
        loop {
            match reader.read_event()? {
                Event::Start(e) if ns.is(e.name(), b"trk") => {
                    activities.push(parse_track(&mut reader, &ns, &e)?);
                }
                Event::Empty(e) if ns.is(e.name(), b"trk") => activities.push(Activity::default()),
                Event::Start(e) => xml::skip(&mut reader, &e)?,
                Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
                Event::Eof => return Err(ParseError::truncated("gpx")),
                _ => {}
            }
        }
    }
    xml::finish(&mut reader)?;

    tracing::debug!(
        activities = activities.len(),
        laps = activities.iter().map(|a| a.laps.len()).sum::<usize>(),
        "parsed GPX document"
    );
    Ok(activities)
}

/// Parse a `<trk>` element.
fn parse_track<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<Activity> {
    let end_name = start.name().as_ref().to_vec();
    let mut name = None;
    let mut laps = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"name") => {
                name = Some(xml::read_text(reader, &e)?).filter(|n| !n.is_empty());
            }
            Event::Start(e) if ns.is(e.name(), b"trkseg") => {
                laps.push(parse_segment(reader, ns, &e)?);
            }
            Event::Empty(e) if ns.is(e.name(), b"trkseg") => laps.push(Lap::default()),
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("trk")),
            _ => {}
        }
    }

    Ok(Activity {
        name,
        sport: None,
        date: None,
        laps,
    })
}

/// Parse a `<trkseg>` element into a lap.
///
/// Lap time is the span between the first and last point; a segment with no
/// points keeps the default of zero.
fn parse_segment<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<Lap> {
    let end_name = start.name().as_ref().to_vec();
    let mut accumulator = DistanceAccumulator::default();
    let mut track_points = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"trkpt") => {
                track_points.push(parse_point(reader, ns, &e, &mut accumulator)?);
            }
            Event::Empty(e) if ns.is(e.name(), b"trkpt") => {
                return Err(ParseError::missing("time", "trkpt"));
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("trkseg")),
            _ => {}
        }
    }

    let time = match (track_points.first(), track_points.last()) {
        (Some(first), Some(last)) => elapsed_seconds(first, last),
        _ => 0.0,
    };

    Ok(Lap {
        distance: accumulator.total(),
        time,
        track_points,
        ..Default::default()
    })
}

fn elapsed_seconds(first: &TrackPoint, last: &TrackPoint) -> f64 {
    (last.time - first.time).num_milliseconds() as f64 / 1000.0
}

/// Values found under a point's `<extensions>`.
#[derive(Debug, Default)]
struct PointExtensions {
    distance: f64,
    speed: f64,
    heart_rate: Option<u32>,
}

/// Parse a `<trkpt>` element and its children.
fn parse_point<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
    accumulator: &mut DistanceAccumulator,
) -> Result<TrackPoint> {
    let latitude = xml::attr_f64(start, b"lat")?;
    let longitude = xml::attr_f64(start, b"lon")?;
    let end_name = start.name().as_ref().to_vec();

    let mut altitude = 0.0;
    let mut time = None;
    let mut ext = PointExtensions::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if ns.is(name, b"ele") {
                    altitude = xml::read_f64(reader, &e)?;
                } else if ns.is(name, b"time") {
                    time = Some(xml::parse_time(&xml::read_text(reader, &e)?)?);
                } else if ns.is(name, b"extensions") {
                    ext = parse_extensions(reader, ns, &e)?;
                } else {
                    xml::skip(reader, &e)?;
                }
            }
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("trkpt")),
            _ => {}
        }
    }

    let time = time.ok_or_else(|| ParseError::missing("time", "trkpt"))?;

    Ok(TrackPoint {
        latitude,
        longitude,
        altitude,
        heart_rate: ext.heart_rate,
        distance: accumulator.advance(ext.distance),
        time,
        speed: Some(ext.speed),
    })
}

/// Parse a point's `<extensions>`, picking up the `gpxdata` vendor values.
fn parse_extensions<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<PointExtensions> {
    let end_name = start.name().as_ref().to_vec();
    let uri = ns.uri_for_prefix(EXTENSION_PREFIX);
    let mut ext = PointExtensions::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match uri {
                Some(uri) if ns.is_in(e.name(), uri, b"distance") => {
                    ext.distance = xml::read_f64(reader, &e)?;
                }
                Some(uri) if ns.is_in(e.name(), uri, b"speed") => {
                    ext.speed = xml::read_f64(reader, &e)?;
                }
                Some(uri) if ns.is_in(e.name(), uri, b"hr") => {
                    ext.heart_rate = Some(xml::parse_u32(&xml::read_text(reader, &e)?));
                }
                _ => xml::skip(reader, &e)?,
            },
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("extensions")),
            _ => {}
        }
    }

    Ok(ext)
}
