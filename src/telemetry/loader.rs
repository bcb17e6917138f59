use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::{Position, PositionIndex, Sample, SampleSource, TrackIdentifier};
use crate::EcolapError;

/// One line of a sample log file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LogRecord {
    Speed {
        race: i64,
        lap: i64,
        timestamp_ms: u64,
        speed_kmh: f64,
    },
    Position {
        id: PositionIndex,
        race: i64,
        lap: i64,
        longitude: f64,
        latitude: f64,
        timestamp_ms: u64,
    },
}

/// In-memory sample source, usually loaded from a JSON Lines file where every
/// line is a [`LogRecord`].
///
/// Records keep the clock of the log. Queries shift every timestamp so that a
/// lap starts at 0, the start being its earliest speed sample or fix.
#[derive(Default, Clone, Debug)]
pub struct SampleLog {
    speeds: BTreeMap<TrackIdentifier, Vec<Sample>>,
    positions: BTreeMap<TrackIdentifier, Vec<Position>>,
    positions_by_id: BTreeMap<PositionIndex, (TrackIdentifier, Position)>,
}

impl SampleLog {
    pub fn load_jsonl(source_file: &Path) -> Result<Self, EcolapError> {
        let records = serde_jsonlines::json_lines(source_file)
            .map_err(|e| EcolapError::SampleLoaderError { source: e })?
            .collect::<Result<Vec<LogRecord>, std::io::Error>>()
            .map_err(|e| EcolapError::SampleLoaderError { source: e })?;

        let log = Self::from_records(records);
        info!(
            "Loaded {:?}, found {} laps and {} positions",
            source_file,
            log.speeds.len(),
            log.positions_by_id.len()
        );
        Ok(log)
    }

    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut log = Self::default();
        for record in records {
            match record {
                LogRecord::Speed {
                    race,
                    lap,
                    timestamp_ms,
                    speed_kmh,
                } => log.push_speed(TrackIdentifier::new(race, lap), Sample::new(timestamp_ms, speed_kmh)),
                LogRecord::Position {
                    id,
                    race,
                    lap,
                    longitude,
                    latitude,
                    timestamp_ms,
                } => log.push_position(
                    TrackIdentifier::new(race, lap),
                    Position {
                        id,
                        longitude,
                        latitude,
                        timestamp_ms,
                    },
                ),
            }
        }
        log
    }

    /// Adds a speed sample, keeping the lap ordered by timestamp.
    pub fn push_speed(&mut self, track: TrackIdentifier, sample: Sample) {
        let lap = self.speeds.entry(track).or_default();
        let at = lap.partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
        lap.insert(at, sample);
    }

    /// Adds a GPS fix, keeping the lap ordered by timestamp.
    pub fn push_position(&mut self, track: TrackIdentifier, position: Position) {
        let lap = self.positions.entry(track).or_default();
        let at = lap.partition_point(|p| p.timestamp_ms <= position.timestamp_ms);
        lap.insert(at, position);
        self.positions_by_id.insert(position.id, (track, position));
    }

    /// Log timestamp of the first record of a lap, 0 for an unknown lap.
    pub fn lap_start_ms(&self, track: TrackIdentifier) -> u64 {
        let speed = self
            .speeds
            .get(&track)
            .and_then(|lap| lap.first())
            .map(|s| s.timestamp_ms);
        let position = self
            .positions
            .get(&track)
            .and_then(|lap| lap.first())
            .map(|p| p.timestamp_ms);
        speed.into_iter().chain(position).min().unwrap_or_default()
    }

    fn relative_position(&self, track: TrackIdentifier, position: &Position) -> Position {
        Position {
            timestamp_ms: position
                .timestamp_ms
                .saturating_sub(self.lap_start_ms(track)),
            ..*position
        }
    }

    /// Every lap with at least one speed sample.
    pub fn tracks(&self) -> impl Iterator<Item = TrackIdentifier> + '_ {
        self.speeds.keys().copied()
    }
}

impl SampleSource for SampleLog {
    fn query_speed(
        &self,
        track: TrackIdentifier,
        max_timestamp_ms: Option<u64>,
    ) -> Result<Vec<Sample>, EcolapError> {
        let Some(lap) = self.speeds.get(&track) else {
            return Ok(Vec::new());
        };
        let start = self.lap_start_ms(track);
        Ok(lap
            .iter()
            .map(|s| Sample {
                timestamp_ms: s.timestamp_ms.saturating_sub(start),
                ..*s
            })
            .take_while(|s| max_timestamp_ms.is_none_or(|max| s.timestamp_ms <= max))
            .collect())
    }

    fn query_positions(&self, track: TrackIdentifier) -> Result<Vec<Position>, EcolapError> {
        Ok(self
            .positions
            .get(&track)
            .map(|lap| {
                lap.iter()
                    .map(|p| self.relative_position(track, p))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn query_position_range(
        &self,
        start: PositionIndex,
        end: PositionIndex,
    ) -> Result<Vec<Position>, EcolapError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .positions_by_id
            .range(start..=end)
            .map(|(_, (track, p))| self.relative_position(*track, p))
            .collect())
    }

    fn position_bounds(
        &self,
        track: TrackIdentifier,
    ) -> Result<Option<(PositionIndex, PositionIndex)>, EcolapError> {
        let Some(lap) = self.positions.get(&track) else {
            return Ok(None);
        };
        let min = lap.iter().map(|p| p.id).min();
        let max = lap.iter().map(|p| p.id).max();
        Ok(min.zip(max))
    }
}
