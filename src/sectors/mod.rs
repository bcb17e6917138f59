// Sector management module
// An ordered partition of the reference lap of a competition, persisted through
// a SectorStore and mirrored in a SectorTable

pub mod store;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use store::{FileBasedSectorStore, MemorySectorStore, SectorStore, Transaction};
pub use table::SectorTable;
pub use types::{Competition, Sector};
