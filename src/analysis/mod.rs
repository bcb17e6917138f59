// Lap analysis: displayed laps, selection correlation between views and the
// lap table

pub mod correlation;
pub mod lap_table;
pub mod projector;
pub mod registry;
pub mod sector_stats;
pub mod session;
pub mod views;

pub use correlation::{CorrelationBus, DispatchReport, SelectionEvent, SubscriberId};
pub use lap_table::LapTable;
pub use projector::{Acceleration, LapDataProjector, LapRow, MAX_SIGNIFICANT_ACCELERATION};
pub use registry::TrackRegistry;
pub use sector_stats::{SectorSpeeds, sector_speeds};
pub use session::AnalysisSession;
pub use views::{SectorPoint, SelectionHandler, Series, ViewKind, ViewSink};
