use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use super::projector::{LapDataProjector, LapRow};
use super::views::SelectionHandler;
use crate::EcolapError;
use crate::telemetry::{SampleSource, TrackIdentifier};

/// Tabular view content: the rows of the current selection, per lap.
///
/// Subscribed to the correlation bus, it re-projects the selected window of a
/// lap on every point or interval selection and empties itself when the
/// selection is cleared.
pub struct LapTable<S: SampleSource + ?Sized> {
    source: Rc<S>,
    wheel_perimeter: f64,
    rows: BTreeMap<TrackIdentifier, Vec<LapRow>>,
}

impl<S: SampleSource + ?Sized> LapTable<S> {
    pub fn new(source: Rc<S>, wheel_perimeter: f64) -> Self {
        Self {
            source,
            wheel_perimeter,
            rows: BTreeMap::new(),
        }
    }

    pub fn set_wheel_perimeter(&mut self, wheel_perimeter: f64) {
        self.wheel_perimeter = wheel_perimeter;
        self.rows.clear();
    }

    pub fn rows(&self, track: &TrackIdentifier) -> &[LapRow] {
        self.rows.get(track).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All rows, ordered by race, lap then time
    pub fn all_rows(&self) -> impl Iterator<Item = (&TrackIdentifier, &LapRow)> {
        self.rows
            .iter()
            .flat_map(|(track, rows)| rows.iter().map(move |row| (track, row)))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Vec::is_empty)
    }

    pub fn remove_track(&mut self, track: &TrackIdentifier) {
        self.rows.remove(track);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    fn projector(&self) -> Result<LapDataProjector<'_, S>, EcolapError> {
        LapDataProjector::new(self.source.as_ref(), self.wheel_perimeter)
    }
}

impl<S: SampleSource + ?Sized> SelectionHandler for LapTable<S> {
    fn name(&self) -> String {
        "lap table".to_string()
    }

    fn highlight_point(&mut self, time: f64, track: TrackIdentifier) -> Result<(), EcolapError> {
        let row = self.projector()?.project_point(track, time)?;
        debug!("Table shows {} at {} s: {:?}", track, time, row);
        self.rows.insert(track, row.into_iter().collect());
        Ok(())
    }

    fn highlight_interval(
        &mut self,
        low: f64,
        high: f64,
        track: TrackIdentifier,
    ) -> Result<(), EcolapError> {
        let rows = self.projector()?.project(track, low, high)?;
        debug!("Table shows {} rows of {}", rows.len(), track);
        self.rows.insert(track, rows);
        Ok(())
    }

    fn clear_selection(&mut self) -> Result<(), EcolapError> {
        self.rows.clear();
        Ok(())
    }
}
