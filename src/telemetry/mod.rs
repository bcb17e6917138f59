pub mod geo;
pub mod loader;
pub mod odometer;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::EcolapError;

pub use geo::{PlanarPoint, project};
pub use loader::SampleLog;
pub use odometer::{Odometer, Reconstruction};

/// Absolute row index of a recorded GPS position.
pub type PositionIndex = i64;

/// Key of a displayed lap, shared by every view as the correlation key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackIdentifier {
    pub race: i64,
    pub lap: i64,
}

impl TrackIdentifier {
    pub fn new(race: i64, lap: i64) -> Self {
        Self { race, lap }
    }
}

impl fmt::Display for TrackIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "race {} lap {}", self.race, self.lap)
    }
}

/// A single speed observation of a lap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since the start of the lap
    pub timestamp_ms: u64,
    /// Instantaneous speed in km/h
    pub speed_kmh: f64,
    /// Longitude in decimal degrees, when the sample was co-timed with a fix
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Latitude in decimal degrees
    #[serde(default)]
    pub latitude: Option<f64>,
}

impl Sample {
    pub fn new(timestamp_ms: u64, speed_kmh: f64) -> Self {
        Self {
            timestamp_ms,
            speed_kmh,
            longitude: None,
            latitude: None,
        }
    }

    pub fn time_s(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.
    }
}

/// A recorded GPS fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionIndex,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp_ms: u64,
}

/// Generic plotted point. `index` is always the elapsed time in seconds, whatever
/// `x` holds, so a time based selection resolves to a point in every view.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistancePoint {
    pub index: f64,
    pub x: f64,
    pub y: f64,
}

impl DistancePoint {
    pub fn new(index: f64, x: f64, y: f64) -> Self {
        Self { index, x, y }
    }
}

/// Node of the race browser: a race day, a race, or a single lap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceViewItemId {
    Date(NaiveDate),
    RaceId(i64),
    TrackId(TrackIdentifier),
}

impl RaceViewItemId {
    pub fn track(&self) -> Option<TrackIdentifier> {
        match self {
            RaceViewItemId::TrackId(track) => Some(*track),
            _ => None,
        }
    }
}

impl fmt::Display for RaceViewItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceViewItemId::Date(date) => write!(f, "race day {}", date),
            RaceViewItemId::RaceId(race) => write!(f, "race {}", race),
            RaceViewItemId::TrackId(track) => write!(f, "{}", track),
        }
    }
}

/// Read access to recorded laps. Every timestamp handed out is relative to the
/// start of the lap it belongs to.
pub trait SampleSource {
    /// Speed samples of a lap ordered by timestamp, optionally bounded to
    /// `timestamp_ms <= max_timestamp_ms`.
    fn query_speed(
        &self,
        track: TrackIdentifier,
        max_timestamp_ms: Option<u64>,
    ) -> Result<Vec<Sample>, EcolapError>;

    /// GPS fixes of a lap ordered by timestamp.
    fn query_positions(&self, track: TrackIdentifier) -> Result<Vec<Position>, EcolapError>;

    /// GPS fixes with `start <= id <= end`, ordered by id.
    fn query_position_range(
        &self,
        start: PositionIndex,
        end: PositionIndex,
    ) -> Result<Vec<Position>, EcolapError>;

    /// Lowest and highest position index recorded for a lap.
    fn position_bounds(
        &self,
        track: TrackIdentifier,
    ) -> Result<Option<(PositionIndex, PositionIndex)>, EcolapError>;
}
