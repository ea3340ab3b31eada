use chrono::{DateTime, Utc};

/// A single timestamped sample (GPX `<trkpt>`, TCX `<Trackpoint>`).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heart_rate: Option<u32>,
    /// Distance covered since the previous point, never negative.
    pub distance: f64,
    pub time: DateTime<Utc>,
    pub speed: Option<f64>,
}

/// A lap (GPX `<trkseg>`, TCX `<Lap>`) and its points in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lap {
    pub distance: f64,
    pub max_speed: f64,
    /// Elapsed seconds.
    pub time: f64,
    pub calories: u32,
    pub average_heart_rate: u32,
    pub max_heart_rate: u32,
    pub track_points: Vec<TrackPoint>,
}

impl Lap {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.track_points.first().map(|pt| pt.time)
    }

    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.track_points.last().map(|pt| pt.time)
    }
}

/// One recorded session (GPX `<trk>`, TCX `<Activity>`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    /// GPX `<trk><name>`, the key used by [`Activity::find`].
    pub name: Option<String>,
    pub sport: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub laps: Vec<Lap>,
}

impl Activity {
    /// The first activity named `name`.
    pub fn find<'a>(activities: &'a [Activity], name: &str) -> Option<&'a Activity> {
        activities.iter().find(|a| a.name.as_deref() == Some(name))
    }

    /// Sum of the lap distances.
    pub fn distance(&self) -> f64 {
        self.laps.iter().fold(0.0, |sum, lap| sum + lap.distance)
    }
}

/// Turns a source's cumulative distance readings into per-point increments.
///
/// The running total advances by the clamped increment, so a reading that
/// goes backwards yields zero and the following readings are measured
/// against the last total reached.
#[derive(Debug, Default)]
pub(crate) struct DistanceAccumulator {
    total: f64,
}

impl DistanceAccumulator {
    pub(crate) fn advance(&mut self, cumulative: f64) -> f64 {
        let delta = cumulative - self.total;
        let distance = if delta > 0.0 { delta } else { 0.0 };
        self.total += distance;
        distance
    }

    pub(crate) fn total(&self) -> f64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_at(secs: i64, distance: f64) -> TrackPoint {
        TrackPoint {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heart_rate: None,
            distance,
            time: DateTime::from_timestamp(secs, 0).unwrap(),
            speed: None,
        }
    }

    #[test]
    fn test_lap_defaults() {
        let lap = Lap::default();
        assert_eq!(lap.distance, 0.0);
        assert_eq!(lap.max_speed, 0.0);
        assert_eq!(lap.time, 0.0);
        assert_eq!(lap.calories, 0);
        assert_eq!(lap.average_heart_rate, 0);
        assert_eq!(lap.max_heart_rate, 0);
        assert!(lap.start_time().is_none());
        assert!(lap.finish_time().is_none());
    }

    #[test]
    fn test_lap_bounds() {
        let lap = Lap {
            track_points: vec![point_at(100, 0.0), point_at(130, 5.0), point_at(160, 5.0)],
            ..Default::default()
        };
        assert_eq!(lap.start_time().unwrap().timestamp(), 100);
        assert_eq!(lap.finish_time().unwrap().timestamp(), 160);
    }

    #[test]
    fn test_activity_distance_sums_laps() {
        let activity = Activity {
            laps: vec![
                Lap { distance: 1000.0, ..Default::default() },
                Lap { distance: 523.5, ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(activity.distance(), 1523.5);
        assert_eq!(Activity::default().distance(), 0.0);
    }

    #[test]
    fn test_find_activity_by_name() {
        let named = |name: &str, distance: f64| Activity {
            name: Some(name.to_string()),
            laps: vec![Lap { distance, ..Default::default() }],
            ..Default::default()
        };
        let activities = vec![Activity::default(), named("morning", 1.0), named("morning", 2.0)];
        assert_eq!(Activity::find(&activities, "morning").unwrap().distance(), 1.0);
        assert!(Activity::find(&activities, "evening").is_none());
    }

    #[test]
    fn test_accumulator_clamps_backwards_readings() {
        let mut acc = DistanceAccumulator::default();
        assert_eq!(acc.advance(0.0), 0.0);
        assert_eq!(acc.advance(100.0), 100.0);
        assert_eq!(acc.advance(90.0), 0.0);
        assert_eq!(acc.total(), 100.0);
        assert_eq!(acc.advance(150.0), 50.0);
        assert_eq!(acc.total(), 150.0);
    }
}
