use log::{debug, info, warn};

use super::store::{SectorStore, Transaction};
use super::types::{Sector, validate_sectors};
use crate::EcolapError;
use crate::telemetry::PositionIndex;

/// Gapless, 0-based ordering of the sectors of a competition.
///
/// Structural edits (insert, remove, merge, reset) renumber the neighbouring
/// sectors inside one store transaction. The in-memory mirror is only ever
/// replaced by a successful [`SectorTable::list`]; mutating calls leave it
/// untouched, so callers re-list after every edit.
pub struct SectorTable<S: SectorStore> {
    store: S,
    mirror: Vec<Sector>,
}

impl<S: SectorStore> SectorTable<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            mirror: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sectors as of the last successful `list`
    pub fn sectors(&self) -> &[Sector] {
        &self.mirror
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    /// Drop the mirror, e.g. when the active competition changes
    pub fn clear(&mut self) {
        self.mirror.clear();
    }

    /// Reload the sectors of `competition` ordered by number. Inconsistent
    /// stored sectors are reported but still listed so they can be edited.
    pub fn list(&mut self, competition: &str) -> Result<&[Sector], EcolapError> {
        let mut sectors = self.store.list_sectors(competition)?;
        sectors.sort_by_key(|s| s.num);
        if let Err(reason) = validate_sectors(&sectors) {
            warn!("Sectors of {} are inconsistent: {}", competition, reason);
        }
        self.mirror = sectors;
        Ok(&self.mirror)
    }

    /// Insert a sector at `num`, pushing every sector from `num` onwards up by one
    pub fn insert(
        &mut self,
        competition: &str,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        check_boundaries(start_pos, end_pos)?;

        let mut tx = Transaction::begin(&mut self.store)?;
        let count = tx.list_sectors(competition)?.len();
        if num as usize > count {
            return Err(EcolapError::InvalidSectorEdit {
                reason: format!(
                    "Cannot insert sector {} into {} sectors without leaving a gap",
                    num, count
                ),
            });
        }
        tx.update_sector_count(competition, num, 1)?;
        tx.insert_sector(&Sector::new(competition, num, start_pos, end_pos))?;
        tx.commit()?;

        info!("Inserted sector {} for {}", num, competition);
        Ok(())
    }

    /// Delete sector `num`, pulling every following sector down by one
    pub fn remove(&mut self, competition: &str, num: u32) -> Result<(), EcolapError> {
        let mut tx = Transaction::begin(&mut self.store)?;
        tx.delete_sector(competition, num)?;
        tx.update_sector_count(competition, num + 1, -1)?;
        tx.commit()?;

        info!("Removed sector {} for {}", num, competition);
        Ok(())
    }

    /// Move the boundaries of sector `num`. Ordering is unchanged, so this is a
    /// single write outside any transaction.
    pub fn update_boundaries(
        &mut self,
        competition: &str,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        check_boundaries(start_pos, end_pos)?;
        self.store
            .update_sector_boundaries(competition, num, start_pos, end_pos)?;
        debug!(
            "Sector {} of {} now spans {}..={}",
            num, competition, start_pos, end_pos
        );
        Ok(())
    }

    /// Fold sector `num` into sector `num - 1`
    pub fn merge(&mut self, competition: &str, num: u32) -> Result<(), EcolapError> {
        if num == 0 {
            return Err(EcolapError::InvalidSectorEdit {
                reason: "The first sector has no predecessor to merge into".to_string(),
            });
        }

        let mut tx = Transaction::begin(&mut self.store)?;
        let sectors = tx.list_sectors(competition)?;
        let find = |n: u32| {
            sectors
                .iter()
                .find(|s| s.num == n)
                .ok_or_else(|| EcolapError::SectorNotFound {
                    competition: competition.to_string(),
                    num: n,
                })
        };
        let previous = find(num - 1)?;
        let merged = find(num)?;
        let (start_pos, end_pos) = (previous.start_pos, merged.end_pos);

        tx.update_sector_boundaries(competition, num - 1, start_pos, end_pos)?;
        tx.delete_sector(competition, num)?;
        tx.update_sector_count(competition, num + 1, -1)?;
        tx.commit()?;

        info!("Merged sector {} into {} for {}", num, num - 1, competition);
        Ok(())
    }

    /// Replace every sector of `competition` with a single sector spanning the
    /// reference lap
    pub fn reset_from_reference_lap(
        &mut self,
        competition: &str,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        check_boundaries(start_pos, end_pos)?;

        let mut tx = Transaction::begin(&mut self.store)?;
        tx.delete_all_sectors(competition)?;
        tx.insert_sector(&Sector::new(competition, 0, start_pos, end_pos))?;
        tx.commit()?;

        info!(
            "Reset sectors of {} to reference lap {}..={}",
            competition, start_pos, end_pos
        );
        Ok(())
    }
}

fn check_boundaries(start_pos: PositionIndex, end_pos: PositionIndex) -> Result<(), EcolapError> {
    if start_pos > end_pos {
        return Err(EcolapError::InvalidSectorEdit {
            reason: format!("Sector start {} is after its end {}", start_pos, end_pos),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sectors::store::MemorySectorStore;

    const COMPET: &str = "Nogaro";

    fn table_with(ranges: &[(i64, i64)]) -> SectorTable<MemorySectorStore> {
        let mut table = SectorTable::new(MemorySectorStore::new());
        for (i, (start, end)) in ranges.iter().enumerate() {
            table.insert(COMPET, i as u32, *start, *end).unwrap();
        }
        table
    }

    /// Store whose shift step always fails
    #[derive(Default)]
    struct BrokenShiftStore {
        inner: MemorySectorStore,
    }

    impl SectorStore for BrokenShiftStore {
        fn list_sectors(&self, competition: &str) -> Result<Vec<Sector>, EcolapError> {
            self.inner.list_sectors(competition)
        }
        fn begin_transaction(&mut self) -> Result<(), EcolapError> {
            self.inner.begin_transaction()
        }
        fn commit_transaction(&mut self) -> Result<(), EcolapError> {
            self.inner.commit_transaction()
        }
        fn rollback_transaction(&mut self) -> Result<(), EcolapError> {
            self.inner.rollback_transaction()
        }
        fn insert_sector(&mut self, sector: &Sector) -> Result<(), EcolapError> {
            self.inner.insert_sector(sector)
        }
        fn delete_sector(&mut self, competition: &str, num: u32) -> Result<(), EcolapError> {
            self.inner.delete_sector(competition, num)
        }
        fn update_sector_count(&mut self, _: &str, _: u32, _: i32) -> Result<(), EcolapError> {
            Err(EcolapError::SectorStorageError {
                reason: "disk full".to_string(),
            })
        }
        fn update_sector_boundaries(
            &mut self,
            competition: &str,
            num: u32,
            start_pos: PositionIndex,
            end_pos: PositionIndex,
        ) -> Result<(), EcolapError> {
            self.inner
                .update_sector_boundaries(competition, num, start_pos, end_pos)
        }
        fn delete_all_sectors(&mut self, competition: &str) -> Result<(), EcolapError> {
            self.inner.delete_all_sectors(competition)
        }
    }

    #[test]
    fn test_insert_shifts_following_sectors() {
        let mut table = table_with(&[(0, 9), (20, 29)]);
        table.insert(COMPET, 1, 10, 19).unwrap();

        let sectors = table.list(COMPET).unwrap();
        assert_eq!(sectors.len(), 3);
        assert_eq!(sectors[1], Sector::new(COMPET, 1, 10, 19));
        assert_eq!(sectors[2], Sector::new(COMPET, 2, 20, 29));
        assert!(validate_sectors(sectors).is_ok());
    }

    #[test]
    fn test_insert_then_remove_restores_sequence() {
        let mut table = table_with(&[(0, 9), (10, 19), (20, 29)]);
        let before = table.list(COMPET).unwrap().to_vec();

        for k in 0..=3 {
            table.insert(COMPET, k, 100, 110).unwrap();
            table.remove(COMPET, k).unwrap();
            assert_eq!(table.list(COMPET).unwrap(), before.as_slice());
        }
    }

    #[test]
    fn test_remove_first_of_two_renumbers() {
        let mut table = table_with(&[(0, 9), (10, 19)]);
        table.remove(COMPET, 0).unwrap();

        let sectors = table.list(COMPET).unwrap();
        assert_eq!(sectors, &[Sector::new(COMPET, 0, 10, 19)]);
    }

    #[test]
    fn test_insert_past_the_end_is_rejected() {
        let mut table = table_with(&[(0, 9)]);
        assert!(matches!(
            table.insert(COMPET, 3, 10, 19),
            Err(EcolapError::InvalidSectorEdit { .. })
        ));
        assert_eq!(table.list(COMPET).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_shift_leaves_state_unchanged() {
        let mut store = BrokenShiftStore::default();
        store.insert_sector(&Sector::new(COMPET, 0, 0, 9)).unwrap();
        let mut table = SectorTable::new(store);
        let before = table.list(COMPET).unwrap().to_vec();

        assert!(table.insert(COMPET, 0, 100, 110).is_err());
        assert!(table.remove(COMPET, 0).is_err());
        assert!(!table.store().inner.in_transaction());
        assert_eq!(table.list(COMPET).unwrap(), before.as_slice());
    }

    #[test]
    fn test_remove_missing_sector_fails() {
        let mut table = table_with(&[(0, 9)]);
        assert!(matches!(
            table.remove(COMPET, 4),
            Err(EcolapError::SectorNotFound { num: 4, .. })
        ));
    }

    #[test]
    fn test_mirror_only_refreshed_by_list() {
        let mut table = table_with(&[(0, 9)]);
        table.list(COMPET).unwrap();
        table.insert(COMPET, 1, 10, 19).unwrap();
        assert_eq!(table.sectors().len(), 1);
        table.list(COMPET).unwrap();
        assert_eq!(table.sectors().len(), 2);
    }

    #[test]
    fn test_update_boundaries_in_place() {
        let mut table = table_with(&[(0, 9), (10, 19)]);
        table.update_boundaries(COMPET, 1, 12, 25).unwrap();
        let sectors = table.list(COMPET).unwrap();
        assert_eq!(sectors[1], Sector::new(COMPET, 1, 12, 25));
        assert!(table.update_boundaries(COMPET, 1, 30, 25).is_err());
    }

    #[test]
    fn test_merge_folds_into_predecessor() {
        let mut table = table_with(&[(0, 9), (10, 19), (20, 29)]);
        table.merge(COMPET, 1).unwrap();
        let sectors = table.list(COMPET).unwrap();
        assert_eq!(
            sectors,
            &[Sector::new(COMPET, 0, 0, 19), Sector::new(COMPET, 1, 20, 29)]
        );
        assert!(table.merge(COMPET, 0).is_err());
    }

    #[test]
    fn test_reset_from_reference_lap() {
        let mut table = table_with(&[(0, 9), (10, 19)]);
        table.reset_from_reference_lap(COMPET, 400, 900).unwrap();
        assert_eq!(
            table.list(COMPET).unwrap(),
            &[Sector::new(COMPET, 0, 400, 900)]
        );
    }

    #[test]
    fn test_empty_competition_lists_nothing() {
        let mut table = SectorTable::new(MemorySectorStore::new());
        assert!(table.list("Unknown").unwrap().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_inconsistent_sectors_are_still_listed() {
        let mut store = MemorySectorStore::new();
        store.insert_sector(&Sector::new(COMPET, 0, 0, 12)).unwrap();
        store.insert_sector(&Sector::new(COMPET, 1, 10, 19)).unwrap();
        let mut table = SectorTable::new(store);

        let sectors = table.list(COMPET).unwrap();
        assert_eq!(sectors.len(), 2);
        assert!(validate_sectors(sectors).is_err());
    }
}
