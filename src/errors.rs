// Error types for ecolap

use crate::telemetry::TrackIdentifier;
use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum EcolapError {
    // Configuration errors
    #[snafu(display("Invalid wheel perimeter: {perimeter} (must be a finite value > 0)"))]
    InvalidWheelPerimeter { perimeter: f64 },
    #[snafu(display("No competition selected"))]
    MissingCompetition,
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Storage errors
    #[snafu(display("Sample query failed for {track}: {reason}"))]
    SampleQueryError {
        track: TrackIdentifier,
        reason: String,
    },
    #[snafu(display("Error loading sample log"))]
    SampleLoaderError { source: io::Error },
    #[snafu(display("Sector storage error: {reason}"))]
    SectorStorageError { reason: String },
    #[snafu(display("Sector {num} not found for competition {competition}"))]
    SectorNotFound { competition: String, num: u32 },
    #[snafu(display("Transaction error: {reason}"))]
    TransactionError { reason: String },
    #[snafu(display("Error writing export file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error writing CSV export"))]
    CsvWriterError { source: csv::Error },

    // State conflicts
    #[snafu(display("Only a lap can be displayed, got {item}"))]
    NotALap { item: String },
    #[snafu(display(
        "Samples out of order: {timestamp_ms} ms follows {previous_ms} ms"
    ))]
    UnorderedSamples { previous_ms: u64, timestamp_ms: u64 },
    #[snafu(display("Invalid sector edit: {reason}"))]
    InvalidSectorEdit { reason: String },

    // View errors
    #[snafu(display("View {view} rejected the selection: {reason}"))]
    ViewHandlerError { view: String, reason: String },
}
