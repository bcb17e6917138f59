use std::collections::BTreeSet;

use log::{debug, warn};

use crate::telemetry::TrackIdentifier;

/// Laps currently displayed in the views
#[derive(Default, Debug, Clone)]
pub struct TrackRegistry {
    tracks: BTreeSet<TrackIdentifier>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lap for display. Returns `false`, with a notice, when the lap
    /// is already displayed.
    pub fn try_add(&mut self, track: TrackIdentifier) -> bool {
        if self.tracks.insert(track) {
            debug!("Registered {}", track);
            true
        } else {
            warn!("Lap {} is already displayed in the views", track);
            false
        }
    }

    pub fn remove(&mut self, track: &TrackIdentifier) -> bool {
        self.tracks.remove(track)
    }

    /// Remove every lap of a race, returning the removed identifiers
    pub fn remove_all_for_race(&mut self, race: i64) -> Vec<TrackIdentifier> {
        let removed: Vec<TrackIdentifier> = self
            .tracks
            .iter()
            .filter(|t| t.race == race)
            .copied()
            .collect();
        self.tracks.retain(|t| t.race != race);
        removed
    }

    pub fn contains(&self, track: &TrackIdentifier) -> bool {
        self.tracks.contains(track)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Displayed laps ordered by race then lap
    pub fn iter(&self) -> impl Iterator<Item = &TrackIdentifier> {
        self.tracks.iter()
    }
}
