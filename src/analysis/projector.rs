use std::fmt;

use log::debug;
use serde::Serialize;

use crate::EcolapError;
use crate::telemetry::{Odometer, SampleSource, TrackIdentifier};

/// Accelerations beyond this magnitude (m/s²) are not plausible for the
/// vehicle and are reported as not significant.
pub const MAX_SIGNIFICANT_ACCELERATION: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum Acceleration {
    Value(f64),
    NotSignificant,
}

impl Acceleration {
    pub fn from_measure(value: f64) -> Self {
        if value.abs() > MAX_SIGNIFICANT_ACCELERATION || !value.is_finite() {
            Acceleration::NotSignificant
        } else {
            Acceleration::Value(value)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Acceleration::Value(v) => Some(*v),
            Acceleration::NotSignificant => None,
        }
    }
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acceleration::Value(v) => write!(f, "{}", v),
            Acceleration::NotSignificant => write!(f, "NS"),
        }
    }
}

/// One line of the lap table
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapRow {
    pub time_ms: u64,
    pub time_s: f64,
    pub distance_m: f64,
    pub speed_kmh: f64,
    pub acceleration: Acceleration,
    /// Engine channels are not recorded yet
    pub rpm: Option<f64>,
    pub pw: Option<f64>,
}

/// Builds the lap table for a time window of a displayed lap
pub struct LapDataProjector<'a, S: SampleSource + ?Sized> {
    source: &'a S,
    odometer: Odometer,
}

impl<'a, S: SampleSource + ?Sized> LapDataProjector<'a, S> {
    pub fn new(source: &'a S, wheel_perimeter: f64) -> Result<Self, EcolapError> {
        Ok(Self {
            source,
            odometer: Odometer::new(wheel_perimeter)?,
        })
    }

    /// Rows of `track` with `lower_time <= time <= upper_time` (seconds).
    ///
    /// The odometer is re-run from the start of the lap up to the window end on
    /// every call, so distances are those of a fresh reconstruction rather than
    /// cached plot points.
    pub fn project(
        &self,
        track: TrackIdentifier,
        lower_time: f64,
        upper_time: f64,
    ) -> Result<Vec<LapRow>, EcolapError> {
        if upper_time < 0. || upper_time < lower_time {
            return Ok(Vec::new());
        }
        let max_timestamp_ms = (upper_time * 1000.).floor() as u64;
        let samples = self.source.query_speed(track, Some(max_timestamp_ms))?;
        let series = self.odometer.reconstruct(&samples)?;

        let rows: Vec<LapRow> = samples
            .iter()
            .zip(series.distance_speed.iter())
            .zip(series.time_acceleration.iter())
            .filter(|((sample, _), _)| sample.time_s() >= lower_time)
            .map(|((sample, distance), acceleration)| LapRow {
                time_ms: sample.timestamp_ms,
                time_s: sample.time_s(),
                distance_m: distance.x,
                speed_kmh: sample.speed_kmh,
                acceleration: Acceleration::from_measure(acceleration.y),
                rpm: None,
                pw: None,
            })
            .collect();

        debug!(
            "Projected {} rows of {} in [{}, {}] s",
            rows.len(),
            track,
            lower_time,
            upper_time
        );
        Ok(rows)
    }

    /// Last row at or before `time`, the row shown for a point selection
    pub fn project_point(
        &self,
        track: TrackIdentifier,
        time: f64,
    ) -> Result<Option<LapRow>, EcolapError> {
        Ok(self.project(track, 0., time)?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Sample, SampleLog};

    fn log_with(track: TrackIdentifier, points: &[(u64, f64)]) -> SampleLog {
        let mut log = SampleLog::default();
        for (t, v) in points {
            log.push_speed(track, Sample::new(*t, *v));
        }
        log
    }

    #[test]
    fn test_window_is_inclusive_on_both_ends() {
        let track = TrackIdentifier::new(1, 1);
        let log = log_with(track, &[(0, 10.), (1000, 11.), (2000, 12.), (3000, 13.)]);
        let projector = LapDataProjector::new(&log, 1.0).unwrap();

        let rows = projector.project(track, 1.0, 2.0).unwrap();
        assert_eq!(rows.iter().map(|r| r.time_ms).collect::<Vec<_>>(), vec![1000, 2000]);
        assert_eq!(rows[0].time_s, 1.0);
        assert_eq!(rows[0].rpm, None);
    }

    #[test]
    fn test_distance_matches_full_reconstruction() {
        let track = TrackIdentifier::new(1, 1);
        let points = [(0, 20.), (1000, 25.), (2000, 30.), (3000, 32.)];
        let log = log_with(track, &points);
        let projector = LapDataProjector::new(&log, 1.5).unwrap();

        let full = projector.project(track, 0., 10.).unwrap();
        let window = projector.project(track, 2.0, 3.0).unwrap();
        assert_eq!(window[0].distance_m, full[2].distance_m);
        assert_eq!(window[1].distance_m, full[3].distance_m);
    }

    #[test]
    fn test_implausible_acceleration_is_flagged() {
        let track = TrackIdentifier::new(1, 1);
        // +36 km/h in one second = 10 m/s², then +3.6 km/h = 1 m/s²
        let log = log_with(track, &[(1000, 0.), (2000, 36.), (3000, 39.6)]);
        let projector = LapDataProjector::new(&log, 1.0).unwrap();

        let rows = projector.project(track, 0., 5.).unwrap();
        assert_eq!(rows[1].acceleration, Acceleration::NotSignificant);
        let value = rows[2].acceleration.value().unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window() {
        let track = TrackIdentifier::new(1, 1);
        let log = log_with(track, &[(0, 10.), (1000, 11.)]);
        let projector = LapDataProjector::new(&log, 1.0).unwrap();

        assert!(projector.project(track, 5.0, 6.0).unwrap().is_empty());
        assert!(projector.project(track, 2.0, 1.0).unwrap().is_empty());
        assert!(
            projector
                .project(TrackIdentifier::new(4, 4), 0., 10.)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_point_projection_picks_last_row_before_time() {
        let track = TrackIdentifier::new(1, 1);
        let log = log_with(track, &[(0, 10.), (1000, 11.), (2000, 12.)]);
        let projector = LapDataProjector::new(&log, 1.0).unwrap();

        let row = projector.project_point(track, 1.7).unwrap().unwrap();
        assert_eq!(row.time_ms, 1000);
    }

    #[test]
    fn test_invalid_perimeter() {
        let log = SampleLog::default();
        assert!(LapDataProjector::new(&log, -2.0).is_err());
    }
}
