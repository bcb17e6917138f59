use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use log::{debug, info, warn};

use super::correlation::{CorrelationBus, DispatchReport, SelectionEvent, SubscriberId};
use super::lap_table::LapTable;
use super::registry::TrackRegistry;
use super::sector_stats::{SectorSpeeds, sector_speeds};
use super::views::{SectorPoint, Series, ViewKind, ViewSink};
use crate::EcolapError;
use crate::sectors::{Competition, Sector, SectorStore, SectorTable};
use crate::telemetry::{
    Odometer, PlanarPoint, PositionIndex, RaceViewItemId, SampleSource, TrackIdentifier, project,
};

struct AttachedView {
    kind: ViewKind,
    subscriber: SubscriberId,
    sink: Rc<RefCell<dyn ViewSink>>,
}

/// Analysis context of one competition.
///
/// Owns the displayed laps, the sectors of the competition and the
/// correlation bus, and keeps every attached view in line with them. The lap
/// table is always subscribed to the bus so it follows the selections made in
/// the other views.
pub struct AnalysisSession<S, St>
where
    S: SampleSource + ?Sized + 'static,
    St: SectorStore,
{
    competition: Competition,
    reference_lap: Option<TrackIdentifier>,
    source: Rc<S>,
    registry: TrackRegistry,
    sectors: SectorTable<St>,
    bus: CorrelationBus,
    views: Vec<AttachedView>,
    table: Rc<RefCell<LapTable<S>>>,
    table_subscriber: SubscriberId,
}

impl<S, St> AnalysisSession<S, St>
where
    S: SampleSource + ?Sized + 'static,
    St: SectorStore,
{
    /// Open a session and load the sectors of `competition`
    pub fn new(source: Rc<S>, store: St, competition: Competition) -> Result<Self, EcolapError> {
        let table = Rc::new(RefCell::new(LapTable::new(
            source.clone(),
            competition.wheel_perimeter_m,
        )));
        let mut bus = CorrelationBus::new();
        let table_subscriber = bus.subscribe(table.clone());

        let mut session = Self {
            competition,
            reference_lap: None,
            source,
            registry: TrackRegistry::new(),
            sectors: SectorTable::new(store),
            bus,
            views: Vec::new(),
            table,
            table_subscriber,
        };
        session.refresh_sectors()?;
        info!(
            "Opened analysis session for {} with {} sectors",
            session.competition.name,
            session.sectors.sectors().len()
        );
        Ok(session)
    }

    /// Attach a view and subscribe it to the selection events of the others
    pub fn attach_view<V: ViewSink + 'static>(
        &mut self,
        kind: ViewKind,
        view: Rc<RefCell<V>>,
    ) -> SubscriberId {
        let subscriber = self.bus.subscribe(view.clone());
        debug!("Attached {} view {}", kind, subscriber);
        self.views.push(AttachedView {
            kind,
            subscriber,
            sink: view,
        });
        subscriber
    }

    pub fn detach_view(&mut self, subscriber: SubscriberId) -> bool {
        self.bus.unsubscribe(subscriber);
        let before = self.views.len();
        self.views.retain(|v| v.subscriber != subscriber);
        self.views.len() != before
    }

    pub fn competition(&self) -> &Competition {
        &self.competition
    }

    pub fn reference_lap(&self) -> Option<TrackIdentifier> {
        self.reference_lap
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    /// Sectors of the competition as last listed
    pub fn sectors(&self) -> &[Sector] {
        self.sectors.sectors()
    }

    pub fn sector_store(&self) -> &St {
        self.sectors.store()
    }

    pub fn table(&self) -> Rc<RefCell<LapTable<S>>> {
        self.table.clone()
    }

    pub fn table_subscriber(&self) -> SubscriberId {
        self.table_subscriber
    }

    /// Display a lap in every view. Returns `Ok(false)` when the lap is already
    /// displayed; a lap that fails to render is not kept in the registry.
    pub fn display_lap(&mut self, track: TrackIdentifier) -> Result<bool, EcolapError> {
        if !self.registry.try_add(track) {
            return Ok(false);
        }
        if let Err(e) = self.render_lap(track) {
            warn!("Could not display {}: {}", track, e);
            self.registry.remove(&track);
            for view in &self.views {
                if let Ok(mut sink) = view.sink.try_borrow_mut() {
                    sink.remove_track(track);
                }
            }
            return Err(e);
        }
        info!("Displayed {}", track);
        Ok(true)
    }

    /// Display the node selected in the race browser; only laps can be shown
    pub fn display_item(&mut self, item: &RaceViewItemId) -> Result<bool, EcolapError> {
        match item.track() {
            Some(track) => self.display_lap(track),
            None => Err(EcolapError::NotALap {
                item: item.to_string(),
            }),
        }
    }

    fn render_lap(&mut self, track: TrackIdentifier) -> Result<(), EcolapError> {
        let positions = self.source.query_positions(track)?;
        let points: Vec<PlanarPoint> = positions
            .iter()
            .map(|p| project(p.longitude, p.latitude))
            .collect();
        let index: Vec<f64> = positions
            .iter()
            .map(|p| p.timestamp_ms as f64 / 1000.)
            .collect();

        let samples = self.source.query_speed(track, None)?;
        let series = Odometer::new(self.competition.wheel_perimeter_m)?.reconstruct(&samples)?;

        for view in &self.views {
            let mut sink = borrow_view(view)?;
            match view.kind {
                ViewKind::Map => {
                    sink.add_track(track, &points, &index);
                    if !sink.has_sectors() {
                        render_sectors(
                            self.source.as_ref(),
                            &self.competition.name,
                            self.sectors.sectors(),
                            &mut *sink,
                        )?;
                    }
                }
                ViewKind::DistancePlot => {
                    sink.add_curve(track, Series::Speed, &series.distance_speed);
                    sink.add_curve(track, Series::Acceleration, &series.distance_acceleration);
                }
                ViewKind::TimePlot => {
                    sink.add_curve(track, Series::Speed, &series.time_speed);
                    sink.add_curve(track, Series::Acceleration, &series.time_acceleration);
                }
                ViewKind::Table => {}
            }
        }
        Ok(())
    }

    /// Stop displaying a lap. Returns `false` if it was not displayed.
    pub fn remove_lap(&mut self, track: TrackIdentifier) -> Result<bool, EcolapError> {
        if !self.registry.remove(&track) {
            return Ok(false);
        }
        self.forget_track(track)?;
        info!("Removed {}", track);
        Ok(true)
    }

    /// Stop displaying every lap of a race
    pub fn remove_race(&mut self, race: i64) -> Result<Vec<TrackIdentifier>, EcolapError> {
        let removed = self.registry.remove_all_for_race(race);
        for track in &removed {
            self.forget_track(*track)?;
        }
        info!("Removed {} laps of race {}", removed.len(), race);
        Ok(removed)
    }

    fn forget_track(&mut self, track: TrackIdentifier) -> Result<(), EcolapError> {
        for view in &self.views {
            borrow_view(view)?.remove_track(track);
        }
        self.table.borrow_mut().remove_track(&track);
        Ok(())
    }

    /// Remove every displayed lap from every view
    pub fn clear_all(&mut self) -> Result<(), EcolapError> {
        self.registry.clear();
        for view in &self.views {
            let mut sink = borrow_view(view)?;
            sink.clear_tracks();
            sink.clear_curves();
        }
        self.table.borrow_mut().clear();
        info!("Cleared all displayed laps");
        Ok(())
    }

    /// Switch to another competition: displayed laps are dropped and its
    /// sectors are loaded
    pub fn load_competition(&mut self, competition: Competition) -> Result<(), EcolapError> {
        self.clear_all()?;
        self.sectors.clear();
        for view in &self.views {
            borrow_view(view)?.clear_sectors();
        }
        self.table
            .borrow_mut()
            .set_wheel_perimeter(competition.wheel_perimeter_m);
        self.competition = competition;
        self.reference_lap = None;
        info!("Loaded competition {}", self.competition.name);
        self.refresh_sectors()
    }

    /// Replace the sectors of the competition with one sector spanning the
    /// recorded positions of `reference_lap`
    pub fn delimit_sectors(&mut self, reference_lap: TrackIdentifier) -> Result<(), EcolapError> {
        let (start_pos, end_pos) = self.source.position_bounds(reference_lap)?.ok_or_else(|| {
            EcolapError::SampleQueryError {
                track: reference_lap,
                reason: "no position recorded".to_string(),
            }
        })?;
        let result = self
            .sectors
            .reset_from_reference_lap(&self.competition.name, start_pos, end_pos);
        if result.is_ok() {
            self.reference_lap = Some(reference_lap);
        }
        let refreshed = self.refresh_sectors();
        result.and(refreshed)
    }

    pub fn insert_sector(
        &mut self,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        let result = self
            .sectors
            .insert(&self.competition.name, num, start_pos, end_pos);
        let refreshed = self.refresh_sectors();
        result.and(refreshed)
    }

    pub fn remove_sector(&mut self, num: u32) -> Result<(), EcolapError> {
        let result = self.sectors.remove(&self.competition.name, num);
        let refreshed = self.refresh_sectors();
        result.and(refreshed)
    }

    pub fn update_sector(
        &mut self,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        let result =
            self.sectors
                .update_boundaries(&self.competition.name, num, start_pos, end_pos);
        let refreshed = self.refresh_sectors();
        result.and(refreshed)
    }

    /// Fold sector `num` into its predecessor
    pub fn merge_sectors(&mut self, num: u32) -> Result<(), EcolapError> {
        let result = self.sectors.merge(&self.competition.name, num);
        let refreshed = self.refresh_sectors();
        result.and(refreshed)
    }

    /// Reload the sectors from the store and redraw them on the maps
    pub fn refresh_sectors(&mut self) -> Result<(), EcolapError> {
        self.sectors.list(&self.competition.name)?;
        for view in self.views.iter().filter(|v| v.kind == ViewKind::Map) {
            let mut sink = borrow_view(view)?;
            sink.clear_sectors();
            render_sectors(
                self.source.as_ref(),
                &self.competition.name,
                self.sectors.sectors(),
                &mut *sink,
            )?;
        }
        Ok(())
    }

    /// Minimum and maximum speed of `track` in each sector of the competition
    pub fn sector_speeds(&self, track: TrackIdentifier) -> Result<Vec<SectorSpeeds>, EcolapError> {
        sector_speeds(&*self.source, track, self.sectors.sectors())
    }

    /// Relay a selection made in the view `origin` to every other view
    pub fn select(&self, origin: Option<SubscriberId>, event: SelectionEvent) -> DispatchReport {
        self.bus.publish(origin, event)
    }

    /// Relay the events of one gesture, in order
    pub fn select_gesture(
        &self,
        origin: Option<SubscriberId>,
        events: Vec<SelectionEvent>,
    ) -> DispatchReport {
        self.bus.publish_gesture(origin, events)
    }
}

fn borrow_view(view: &AttachedView) -> Result<RefMut<'_, dyn ViewSink + 'static>, EcolapError> {
    view.sink
        .try_borrow_mut()
        .map_err(|_| EcolapError::ViewHandlerError {
            view: format!("{} {}", view.kind, view.subscriber),
            reason: "view is busy".to_string(),
        })
}

fn render_sectors<S: SampleSource + ?Sized>(
    source: &S,
    competition: &str,
    sectors: &[Sector],
    sink: &mut dyn ViewSink,
) -> Result<(), EcolapError> {
    for sector in sectors {
        let points: Vec<SectorPoint> = source
            .query_position_range(sector.start_pos, sector.end_pos)?
            .iter()
            .map(|p| SectorPoint {
                index: p.id,
                point: project(p.longitude, p.latitude),
            })
            .collect();
        sink.add_sector(competition, sector.num, &points);
    }
    Ok(())
}
