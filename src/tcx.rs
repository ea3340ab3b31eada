use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;
use crate::model::{Activity, DistanceAccumulator, Lap, TrackPoint};
use crate::xml::{self, Namespaces, Result, Root, XmlReader};

/// Garmin extension namespace carrying per-point speed (`<TPX><Speed>`).
pub const ACTIVITY_EXTENSION_NS: &str = "http://www.garmin.com/xmlschemas/ActivityExtension/v2";

/// Parse a TCX document into its activities.
///
/// Activities may sit directly under the root or inside `<Activities>`.
/// Lap figures are taken as reported by the device; track point distances
/// are recovered from the cumulative `DistanceMeters` readings.
pub fn parse(xml: &str) -> Result<Vec<Activity>> {
    let mut reader = Reader::from_str(xml);
    let root = xml::read_root(&mut reader)?;
    let ns = Namespaces::from_root(root.start())?;

    let mut activities = Vec::new();
    if let Root::Open(start) = &root {
        collect_activities(&mut reader, &ns, start, &mut activities)?;
    }
    xml::finish(&mut reader)?;

    tracing::debug!(
        activities = activities.len(),
        laps = activities.iter().map(|a| a.laps.len()).sum::<usize>(),
        "parsed TCX document"
    );
    Ok(activities)
}

fn collect_activities<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
    out: &mut Vec<Activity>,
) -> Result<()> {
    let end_name = start.name().as_ref().to_vec();

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"Activity") => {
                out.push(parse_activity(reader, ns, &e)?);
            }
            Event::Empty(e) if ns.is(e.name(), b"Activity") => {
                return Err(ParseError::missing("Id", "Activity"));
            }
            Event::Start(e) if ns.is(e.name(), b"Activities") => {
                collect_activities(reader, ns, &e, out)?;
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => {
                return Err(ParseError::truncated(&String::from_utf8_lossy(&end_name)));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Parse an `<Activity>` element.
fn parse_activity<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<Activity> {
    let sport = xml::attr_string(start, b"Sport")?;
    let end_name = start.name().as_ref().to_vec();

    let mut date = None;
    let mut laps = Vec::new();
    // DistanceMeters on track points runs across the whole activity.
    let mut accumulator = DistanceAccumulator::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if ns.is(name, b"Id") {
                    date = Some(xml::parse_time(&xml::read_text(reader, &e)?)?);
                } else if ns.is(name, b"Lap") {
                    laps.push(parse_lap(reader, ns, &e, &mut accumulator)?);
                } else {
                    xml::skip(reader, &e)?;
                }
            }
            Event::Empty(e) if ns.is(e.name(), b"Lap") => laps.push(Lap::default()),
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Activity")),
            _ => {}
        }
    }

    let date = date.ok_or_else(|| ParseError::missing("Id", "Activity"))?;

    Ok(Activity {
        name: None,
        sport,
        date: Some(date),
        laps,
    })
}

/// Parse a `<Lap>` element with every `<Track>` it contains.
fn parse_lap<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
    accumulator: &mut DistanceAccumulator,
) -> Result<Lap> {
    let end_name = start.name().as_ref().to_vec();
    let mut lap = Lap::default();
    let mut track_points = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if ns.is(name, b"TotalTimeSeconds") {
                    lap.time = xml::read_f64(reader, &e)?;
                } else if ns.is(name, b"DistanceMeters") {
                    lap.distance = xml::read_f64(reader, &e)?;
                } else if ns.is(name, b"MaximumSpeed") {
                    lap.max_speed = xml::read_f64(reader, &e)?;
                } else if ns.is(name, b"Calories") {
                    lap.calories = xml::parse_u32(&xml::read_text(reader, &e)?);
                } else if ns.is(name, b"AverageHeartRateBpm") {
                    lap.average_heart_rate = read_value(reader, ns, &e)?;
                } else if ns.is(name, b"MaximumHeartRateBpm") {
                    lap.max_heart_rate = read_value(reader, ns, &e)?;
                } else if ns.is(name, b"Track") {
                    parse_track(reader, ns, &e, accumulator, &mut track_points)?;
                } else {
                    xml::skip(reader, &e)?;
                }
            }
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Lap")),
            _ => {}
        }
    }

    Ok(Lap {
        track_points,
        ..lap
    })
}

fn parse_track<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
    accumulator: &mut DistanceAccumulator,
    out: &mut Vec<TrackPoint>,
) -> Result<()> {
    let end_name = start.name().as_ref().to_vec();

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"Trackpoint") => {
                out.push(parse_trackpoint(reader, ns, &e, accumulator)?);
            }
            Event::Empty(e) if ns.is(e.name(), b"Trackpoint") => {
                return Err(ParseError::missing("Time", "Trackpoint"));
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Track")),
            _ => {}
        }
    }

    Ok(())
}

/// Parse a `<Trackpoint>` element.
fn parse_trackpoint<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
    accumulator: &mut DistanceAccumulator,
) -> Result<TrackPoint> {
    let end_name = start.name().as_ref().to_vec();

    let mut time = None;
    let mut position = (0.0, 0.0);
    let mut altitude = 0.0;
    let mut cumulative = None;
    let mut heart_rate = None;
    let mut speed = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if ns.is(name, b"Time") {
                    time = Some(xml::parse_time(&xml::read_text(reader, &e)?)?);
                } else if ns.is(name, b"Position") {
                    position = parse_position(reader, ns, &e)?;
                } else if ns.is(name, b"AltitudeMeters") {
                    altitude = xml::read_f64(reader, &e)?;
                } else if ns.is(name, b"DistanceMeters") {
                    cumulative = Some(xml::read_f64(reader, &e)?);
                } else if ns.is(name, b"HeartRateBpm") {
                    heart_rate = Some(read_value(reader, ns, &e)?);
                } else if ns.is(name, b"Extensions") {
                    speed = parse_extensions(reader, ns, &e)?;
                } else {
                    xml::skip(reader, &e)?;
                }
            }
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Trackpoint")),
            _ => {}
        }
    }

    let time = time.ok_or_else(|| ParseError::missing("Time", "Trackpoint"))?;
    // Points without a reading (e.g. paused) keep the running total.
    let distance = accumulator.advance(cumulative.unwrap_or(accumulator.total()));
    let (latitude, longitude) = position;

    Ok(TrackPoint {
        latitude,
        longitude,
        altitude,
        heart_rate,
        distance,
        time,
        speed,
    })
}

fn parse_position<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<(f64, f64)> {
    let end_name = start.name().as_ref().to_vec();
    let (mut lat, mut lon) = (0.0, 0.0);

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"LatitudeDegrees") => {
                lat = xml::read_f64(reader, &e)?;
            }
            Event::Start(e) if ns.is(e.name(), b"LongitudeDegrees") => {
                lon = xml::read_f64(reader, &e)?;
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Position")),
            _ => {}
        }
    }

    Ok((lat, lon))
}

/// Read the `<Value>` child of a heart-rate element.
fn read_value<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<u32> {
    let end_name = start.name().as_ref().to_vec();
    let mut value = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) if ns.is(e.name(), b"Value") => {
                value = xml::parse_u32(&xml::read_text(reader, &e)?);
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Value")),
            _ => {}
        }
    }

    Ok(value)
}

/// Pick `<TPX><Speed>` out of a track point's `<Extensions>`.
fn parse_extensions<'a>(
    reader: &mut XmlReader<'a>,
    ns: &Namespaces,
    start: &BytesStart<'a>,
) -> Result<Option<f64>> {
    let end_name = start.name().as_ref().to_vec();
    let mut speed = None;

    loop {
        match reader.read_event()? {
            // TPX is a transparent wrapper; its children arrive in this loop.
            Event::Start(e) if ns.is_in(e.name(), ACTIVITY_EXTENSION_NS, b"TPX") => {}
            Event::Start(e) if ns.is_in(e.name(), ACTIVITY_EXTENSION_NS, b"Speed") => {
                speed = Some(xml::read_f64(reader, &e)?);
            }
            Event::Start(e) => xml::skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::truncated("Extensions")),
            _ => {}
        }
    }

    Ok(speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2" xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">"#;

    fn doc(body: &str) -> String {
        format!("{HEADER}<Activities>{body}</Activities></TrainingCenterDatabase>")
    }

    fn trackpoint(time: &str, lat: f64, lon: f64, alt: f64, dist: f64) -> String {
        format!(
            r#"<Trackpoint><Time>{time}</Time>
<Position><LatitudeDegrees>{lat}</LatitudeDegrees><LongitudeDegrees>{lon}</LongitudeDegrees></Position>
<AltitudeMeters>{alt}</AltitudeMeters><DistanceMeters>{dist}</DistanceMeters>
<HeartRateBpm><Value>140</Value></HeartRateBpm>
<Extensions><ns3:TPX><ns3:Speed>3.25</ns3:Speed></ns3:TPX></Extensions></Trackpoint>"#
        )
    }

    #[test]
    fn test_activity_and_lap_fields() {
        let xml = doc(&format!(
            r#"<Activity Sport="Running"><Id>2025-01-01T06:00:00Z</Id>
<Lap StartTime="2025-01-01T06:00:00Z">
  <TotalTimeSeconds>300.5</TotalTimeSeconds>
  <DistanceMeters>1000.0</DistanceMeters>
  <MaximumSpeed>4.2</MaximumSpeed>
  <Calories>71</Calories>
  <AverageHeartRateBpm><Value>150</Value></AverageHeartRateBpm>
  <MaximumHeartRateBpm><Value>168</Value></MaximumHeartRateBpm>
  <Intensity>Active</Intensity>
  <Track>{}{}</Track>
</Lap></Activity>"#,
            trackpoint("2025-01-01T06:00:00Z", 35.0, 139.0, 10.0, 0.0),
            trackpoint("2025-01-01T06:05:00Z", 35.01, 139.01, 12.5, 1000.0),
        ));
        let activities = parse(&xml).unwrap();
        assert_eq!(activities.len(), 1);

        let activity = &activities[0];
        assert_eq!(activity.sport.as_deref(), Some("Running"));
        assert_eq!(activity.date.unwrap().timestamp(), 1_735_711_200);

        let lap = &activity.laps[0];
        assert_eq!(lap.time, 300.5);
        assert_eq!(lap.distance, 1000.0);
        assert_eq!(lap.max_speed, 4.2);
        assert_eq!(lap.calories, 71);
        assert_eq!(lap.average_heart_rate, 150);
        assert_eq!(lap.max_heart_rate, 168);
        assert_eq!(lap.track_points.len(), 2);

        let pt = &lap.track_points[1];
        assert_eq!(pt.latitude, 35.01);
        assert_eq!(pt.longitude, 139.01);
        assert_eq!(pt.altitude, 12.5);
        assert_eq!(pt.distance, 1000.0);
        assert_eq!(pt.heart_rate, Some(140));
        assert_eq!(pt.speed, Some(3.25));
    }

    #[test]
    fn test_point_distance_runs_across_laps() {
        let xml = doc(&format!(
            r#"<Activity Sport="Biking"><Id>2025-01-01T06:00:00Z</Id>
<Lap><DistanceMeters>500</DistanceMeters><Track>{}{}</Track></Lap>
<Lap><DistanceMeters>400</DistanceMeters><Track>{}{}</Track></Lap></Activity>"#,
            trackpoint("2025-01-01T06:00:00Z", 1.0, 2.0, 0.0, 0.0),
            trackpoint("2025-01-01T06:01:00Z", 1.0, 2.0, 0.0, 500.0),
            trackpoint("2025-01-01T06:02:00Z", 1.0, 2.0, 0.0, 480.0),
            trackpoint("2025-01-01T06:03:00Z", 1.0, 2.0, 0.0, 900.0),
        ));
        let activities = parse(&xml).unwrap();
        let laps = &activities[0].laps;
        assert_eq!(laps[1].track_points[0].distance, 0.0);
        assert_eq!(laps[1].track_points[1].distance, 400.0);
        assert_eq!(activities[0].distance(), 900.0);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let xml = doc(
            r#"<Activity><Id>2025-01-01T06:00:00Z</Id><Lap><Track>
<Trackpoint><Time>2025-01-01T06:00:00Z</Time></Trackpoint></Track></Lap></Activity>"#,
        );
        let activities = parse(&xml).unwrap();
        assert!(activities[0].sport.is_none());
        let lap = &activities[0].laps[0];
        assert_eq!(lap.distance, 0.0);
        assert_eq!(lap.calories, 0);
        let pt = &lap.track_points[0];
        assert_eq!((pt.latitude, pt.longitude, pt.altitude), (0.0, 0.0, 0.0));
        assert_eq!(pt.heart_rate, None);
        assert_eq!(pt.speed, None);
    }

    #[test]
    fn test_mandatory_times() {
        let no_id = doc(r#"<Activity Sport="Running"><Lap/></Activity>"#);
        assert!(matches!(parse(&no_id), Err(ParseError::MalformedDocument(_))));

        let no_time = doc(
            r#"<Activity><Id>2025-01-01T06:00:00Z</Id><Lap><Track>
<Trackpoint><AltitudeMeters>3</AltitudeMeters></Trackpoint></Track></Lap></Activity>"#,
        );
        assert!(matches!(parse(&no_time), Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_speed_requires_extension_namespace() {
        let xml = r#"<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2" xmlns:x="urn:other">
<Activities><Activity><Id>2025-01-01T06:00:00Z</Id><Lap><Track>
<Trackpoint><Time>2025-01-01T06:00:00Z</Time><Extensions><x:TPX><x:Speed>9.9</x:Speed></x:TPX></Extensions></Trackpoint>
</Track></Lap></Activity></Activities></TrainingCenterDatabase>"#;
        let activities = parse(xml).unwrap();
        assert_eq!(activities[0].laps[0].track_points[0].speed, None);
    }

    #[test]
    fn test_empty_and_malformed_documents() {
        assert!(parse(&doc("")).unwrap().is_empty());
        assert!(parse("<TrainingCenterDatabase/>").unwrap().is_empty());
        assert!(matches!(
            parse("<TrainingCenterDatabase><Activities><Activity>"),
            Err(ParseError::MalformedDocument(_))
        ));

        let activity = r#"<Activity Sport="Running"><Id>2025-01-01T00:00:00Z</Id></Activity>"#;
        for xml in [
            "<TrainingCenterDatabase/><x>".to_string(),
            "<TrainingCenterDatabase/>trailing".to_string(),
            format!("{}</TrainingCenterDatabase>", doc(activity)),
            format!("{}{}", doc(activity), doc(activity)),
        ] {
            assert!(
                matches!(parse(&xml), Err(ParseError::MalformedDocument(_))),
                "{xml}"
            );
        }
        assert_eq!(parse(&format!("{}\n<!-- end -->", doc(activity))).unwrap().len(), 1);
    }

    #[test]
    fn test_self_closing_activity_and_lap() {
        assert!(matches!(
            parse(&doc(r#"<Activity Sport="Running"/>"#)),
            Err(ParseError::MalformedDocument(_))
        ));

        let xml = doc(&format!(
            r#"<Activity Sport="Running"><Id>2025-01-01T00:00:00Z</Id><Lap StartTime="2025-01-01T00:00:00Z"/>
<Lap StartTime="2025-01-01T00:00:00Z"><DistanceMeters>10</DistanceMeters><Track>{}</Track></Lap></Activity>"#,
            trackpoint("2025-01-01T00:00:00Z", 1.0, 2.0, 0.0, 10.0)
        ));
        let activities = parse(&xml).unwrap();
        let laps = &activities[0].laps;
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[0], Lap::default());
        assert_eq!(laps[1].distance, 10.0);
        assert!(activities[0].name.is_none());
    }
}
