// Library interface for ecolap
// This allows integration tests and benches to access internal modules

pub mod analysis;
pub mod config;
pub mod errors;
pub mod sectors;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use analysis::{AnalysisSession, LapDataProjector, LapRow, SelectionEvent, TrackRegistry};
pub use config::AppConfig;
pub use errors::EcolapError;
pub use sectors::{Competition, Sector, SectorStore, SectorTable};
pub use telemetry::{SampleLog, SampleSource, TrackIdentifier};
