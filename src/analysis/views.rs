// Interfaces of the presentational views driven by the analysis session

use std::fmt;

use crate::EcolapError;
use crate::telemetry::{DistancePoint, PlanarPoint, PositionIndex, TrackIdentifier};

/// Kind of view a sink renders
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Map,
    DistancePlot,
    TimePlot,
    Table,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Map => write!(f, "map"),
            ViewKind::DistancePlot => write!(f, "distance plot"),
            ViewKind::TimePlot => write!(f, "time plot"),
            ViewKind::Table => write!(f, "lap table"),
        }
    }
}

/// Series of a lap drawn on a plot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Series {
    Speed,
    Acceleration,
}

/// Projected GPS fix of a sector, keeping its position index so the sector
/// boundaries can be moved on the map
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorPoint {
    pub index: PositionIndex,
    pub point: PlanarPoint,
}

/// Receiver of selection events relayed by the correlation bus.
///
/// Handlers must be idempotent: the same event delivered twice leaves the view
/// as if it was delivered once.
pub trait SelectionHandler {
    /// Name used in logs and dispatch reports
    fn name(&self) -> String;

    /// Highlight the point of `track` recorded at `time` seconds
    fn highlight_point(&mut self, time: f64, track: TrackIdentifier) -> Result<(), EcolapError>;

    /// Highlight the part of `track` between `low` and `high` seconds
    fn highlight_interval(
        &mut self,
        low: f64,
        high: f64,
        track: TrackIdentifier,
    ) -> Result<(), EcolapError>;

    /// Drop any highlight
    fn clear_selection(&mut self) -> Result<(), EcolapError>;
}

/// A rendering view. Purely presentational: every method only mirrors what the
/// session tells it. Views that do not show a kind of content keep the default
/// no-op.
pub trait ViewSink: SelectionHandler {
    /// Draw the GPS trace of a lap; `index` holds the elapsed time of each point
    fn add_track(&mut self, _track: TrackIdentifier, _points: &[PlanarPoint], _index: &[f64]) {}

    /// Draw a plotted series of a lap
    fn add_curve(&mut self, _track: TrackIdentifier, _series: Series, _points: &[DistancePoint]) {
    }

    /// Draw a sector of the reference lap
    fn add_sector(&mut self, _competition: &str, _num: u32, _points: &[SectorPoint]) {}

    fn has_sectors(&self) -> bool {
        false
    }

    /// Forget everything drawn for one lap
    fn remove_track(&mut self, _track: TrackIdentifier) {}

    fn clear_tracks(&mut self) {}

    fn clear_curves(&mut self) {}

    fn clear_sectors(&mut self) {}
}
