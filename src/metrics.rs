use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::ParseError;
use crate::model::{Activity, Lap};
use crate::options::Format;

type Result<T> = std::result::Result<T, ParseError>;

/// Minutes per kilometer. Zero inputs are not guarded and yield the IEEE
/// result of the division.
pub fn pace(time_sec: f64, distance_m: f64) -> f64 {
    (time_sec / 60.0) / (distance_m / 1000.0)
}

/// Kilometers per hour, unguarded like [`pace`].
pub fn speed_kmh(distance_m: f64, time_sec: f64) -> f64 {
    (distance_m / 1000.0) / (time_sec / 3600.0)
}

/// Serialized form of a parsed document, one variant per source format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActivityDocument {
    Gpx(GpxDocument),
    Tcx(TcxDocument),
}

impl ActivityDocument {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Gpx(doc) => doc.timestamp,
            Self::Tcx(doc) => doc.timestamp,
        }
    }

    /// Flatten into the generic `{activities, @timestamp, @location?}` map.
    /// Non-finite numbers become `null`.
    pub fn render(&self) -> Result<Map<String, JsonValue>> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(ParseError::Render(serde::ser::Error::custom(format!(
                "expected an object, got {other}"
            )))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxDocument {
    pub activities: Vec<GpxActivityRecord>,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxActivityRecord {
    pub distance: f64,
    pub laps: Vec<GpxLapRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxLapRecord {
    pub distance: f64,
    pub time_in_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Minutes per kilometer, published under the `speed` key.
    pub speed: f64,
    /// `[lat, lon]` pairs.
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcxDocument {
    pub activities: Vec<TcxActivityRecord>,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    /// `[lon, lat]` of the first recorded position.
    #[serde(rename = "@location", skip_serializing_if = "Option::is_none")]
    pub location: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcxActivityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub distance: f64,
    pub time: f64,
    pub pace: f64,
    pub speed: f64,
    pub laps: Vec<TcxLapRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcxLapRecord {
    pub id: usize,
    pub distance: f64,
    pub max_speed: f64,
    pub calories: u32,
    pub time_in_sec: i64,
    pub pace: f64,
    pub speed: f64,
    /// Epoch seconds of the first point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<i64>,
    pub points: Vec<TcxPointRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcxPointRecord {
    /// `[lon, lat]`.
    pub coordinates: [f64; 2],
    pub altitude: f64,
    /// Seconds since the lap's first point.
    pub time: i64,
    /// Altitude change from the previous point of the lap.
    pub increase: f64,
}

/// Build the output document for activities parsed from `format`.
pub fn serialize(format: Format, activities: &[Activity]) -> Result<ActivityDocument> {
    match format {
        Format::Gpx => serialize_gpx(activities).map(ActivityDocument::Gpx),
        Format::Tcx => serialize_tcx(activities).map(ActivityDocument::Tcx),
    }
}

/// The document timestamp is the first track point's time.
pub fn serialize_gpx(activities: &[Activity]) -> Result<GpxDocument> {
    let timestamp = activities
        .iter()
        .flat_map(|a| &a.laps)
        .flat_map(|l| &l.track_points)
        .map(|pt| pt.time)
        .next()
        .ok_or(ParseError::EmptyDocument)?;

    let activities = activities
        .iter()
        .map(|activity| GpxActivityRecord {
            distance: activity.distance(),
            laps: activity.laps.iter().map(gpx_lap).collect(),
        })
        .collect();

    Ok(GpxDocument {
        activities,
        timestamp,
    })
}

fn gpx_lap(lap: &Lap) -> GpxLapRecord {
    GpxLapRecord {
        distance: lap.distance,
        time_in_sec: lap.time,
        start_time: lap.start_time(),
        finish_time: lap.finish_time(),
        speed: pace(lap.time, lap.distance),
        points: lap
            .track_points
            .iter()
            .map(|pt| [pt.latitude, pt.longitude])
            .collect(),
    }
}

/// The document timestamp is the first activity's date. Laps reporting a
/// distance of exactly zero are dropped and the survivors numbered from 0.
pub fn serialize_tcx(activities: &[Activity]) -> Result<TcxDocument> {
    let timestamp = activities
        .first()
        .and_then(|a| a.date)
        .ok_or(ParseError::EmptyDocument)?;

    let mut location = None;
    let activities = activities
        .iter()
        .map(|activity| tcx_activity(activity, &mut location))
        .collect();

    Ok(TcxDocument {
        activities,
        timestamp,
        location,
    })
}

fn tcx_activity(activity: &Activity, location: &mut Option<[f64; 2]>) -> TcxActivityRecord {
    let mut total_time = 0.0;
    let mut laps = Vec::new();

    for lap in &activity.laps {
        if lap.distance == 0.0 {
            tracing::debug!(time = lap.time, "skipping zero-distance lap");
            continue;
        }
        total_time += lap.time;
        if location.is_none() {
            *location = lap
                .track_points
                .first()
                .map(|pt| [pt.longitude, pt.latitude]);
        }
        laps.push(tcx_lap(laps.len(), lap));
    }

    let distance = activity.distance();
    TcxActivityRecord {
        sport: activity.sport.clone(),
        date: activity.date,
        distance,
        time: total_time,
        pace: pace(total_time, distance),
        speed: speed_kmh(distance, total_time),
        laps,
    }
}

fn tcx_lap(id: usize, lap: &Lap) -> TcxLapRecord {
    let start = lap.start_time();

    let points = match start {
        None => Vec::new(),
        Some(start) => {
            let mut previous = lap.track_points.first().map_or(0.0, |pt| pt.altitude);
            lap.track_points
                .iter()
                .map(|pt| {
                    let increase = pt.altitude - previous;
                    previous = pt.altitude;
                    TcxPointRecord {
                        coordinates: [pt.longitude, pt.latitude],
                        altitude: pt.altitude,
                        time: (pt.time - start).num_seconds(),
                        increase,
                    }
                })
                .collect()
        }
    };

    TcxLapRecord {
        id,
        distance: lap.distance,
        max_speed: lap.max_speed,
        calories: lap.calories,
        time_in_sec: lap.time as i64,
        pace: pace(lap.time, lap.distance),
        speed: speed_kmh(lap.distance, lap.time),
        start_time: start.map(|t| t.timestamp()),
        finish_time: lap.finish_time().map(|t| t.timestamp()),
        points,
    }
}
