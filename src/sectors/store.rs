// Storage implementations for sector persistence

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::errors::EcolapError;
use crate::sectors::types::Sector;
use crate::telemetry::PositionIndex;

/// Trait defining the interface for sector storage operations
pub trait SectorStore {
    /// List the sectors of a competition ordered by number
    fn list_sectors(&self, competition: &str) -> Result<Vec<Sector>, EcolapError>;

    /// Start an all-or-nothing unit of work
    fn begin_transaction(&mut self) -> Result<(), EcolapError>;

    /// Make every write since `begin_transaction` durable
    fn commit_transaction(&mut self) -> Result<(), EcolapError>;

    /// Discard every write since `begin_transaction`
    fn rollback_transaction(&mut self) -> Result<(), EcolapError>;

    /// Insert a sector; its number must be free
    fn insert_sector(&mut self, sector: &Sector) -> Result<(), EcolapError>;

    /// Delete the sector with the given number
    fn delete_sector(&mut self, competition: &str, num: u32) -> Result<(), EcolapError>;

    /// Add `delta` to the number of every sector with `num >= from`
    fn update_sector_count(
        &mut self,
        competition: &str,
        from: u32,
        delta: i32,
    ) -> Result<(), EcolapError>;

    /// Replace the boundaries of a sector in place
    fn update_sector_boundaries(
        &mut self,
        competition: &str,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError>;

    /// Delete every sector of a competition
    fn delete_all_sectors(&mut self, competition: &str) -> Result<(), EcolapError>;
}

/// Scoped transaction over a [`SectorStore`].
///
/// The store is rolled back when the guard is dropped without a successful
/// [`Transaction::commit`], whether the scope is left through `?`, an early
/// return or a panic.
pub struct Transaction<'a, S: SectorStore + ?Sized> {
    store: &'a mut S,
    committed: bool,
}

impl<'a, S: SectorStore + ?Sized> Transaction<'a, S> {
    pub fn begin(store: &'a mut S) -> Result<Self, EcolapError> {
        store.begin_transaction()?;
        Ok(Self {
            store,
            committed: false,
        })
    }

    pub fn commit(mut self) -> Result<(), EcolapError> {
        let result = self.store.commit_transaction();
        if result.is_ok() {
            self.committed = true;
        }
        result
    }
}

impl<S: SectorStore + ?Sized> Deref for Transaction<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.store
    }
}

impl<S: SectorStore + ?Sized> DerefMut for Transaction<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.store
    }
}

impl<S: SectorStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.store.rollback_transaction() {
            Ok(()) => warn!("Sector transaction rolled back"),
            Err(e) => error!("Failed to roll back sector transaction: {}", e),
        }
    }
}

// Row level operations shared by the stores, on one competition's sectors kept
// sorted by number.

fn insert_row(rows: &mut Vec<Sector>, sector: &Sector) -> Result<(), EcolapError> {
    match rows.binary_search_by_key(&sector.num, |s| s.num) {
        Ok(_) => Err(EcolapError::SectorStorageError {
            reason: format!(
                "Sector {} already exists for competition {}",
                sector.num, sector.competition
            ),
        }),
        Err(at) => {
            rows.insert(at, sector.clone());
            Ok(())
        }
    }
}

fn delete_row(rows: &mut Vec<Sector>, competition: &str, num: u32) -> Result<(), EcolapError> {
    let at = rows
        .binary_search_by_key(&num, |s| s.num)
        .map_err(|_| EcolapError::SectorNotFound {
            competition: competition.to_string(),
            num,
        })?;
    rows.remove(at);
    Ok(())
}

fn shift_rows(rows: &mut [Sector], from: u32, delta: i32) -> Result<(), EcolapError> {
    for sector in rows.iter_mut().filter(|s| s.num >= from) {
        sector.num = sector
            .num
            .checked_add_signed(delta)
            .ok_or_else(|| EcolapError::SectorStorageError {
                reason: format!("Cannot shift sector {} by {}", sector.num, delta),
            })?;
    }
    rows.sort_by_key(|s| s.num);
    if rows.windows(2).any(|pair| pair[0].num == pair[1].num) {
        return Err(EcolapError::SectorStorageError {
            reason: format!("Shifting sectors from {} by {} collides", from, delta),
        });
    }
    Ok(())
}

fn update_row(
    rows: &mut [Sector],
    competition: &str,
    num: u32,
    start_pos: PositionIndex,
    end_pos: PositionIndex,
) -> Result<(), EcolapError> {
    let sector = rows
        .iter_mut()
        .find(|s| s.num == num)
        .ok_or_else(|| EcolapError::SectorNotFound {
            competition: competition.to_string(),
            num,
        })?;
    sector.start_pos = start_pos;
    sector.end_pos = end_pos;
    Ok(())
}

/// Volatile store, used by tests and as a scratch table
#[derive(Default, Debug, Clone)]
pub struct MemorySectorStore {
    sectors: HashMap<String, Vec<Sector>>,
    snapshot: Option<HashMap<String, Vec<Sector>>>,
}

impl MemorySectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl SectorStore for MemorySectorStore {
    fn list_sectors(&self, competition: &str) -> Result<Vec<Sector>, EcolapError> {
        Ok(self.sectors.get(competition).cloned().unwrap_or_default())
    }

    fn begin_transaction(&mut self) -> Result<(), EcolapError> {
        if self.snapshot.is_some() {
            return Err(EcolapError::TransactionError {
                reason: "A transaction is already in progress".to_string(),
            });
        }
        self.snapshot = Some(self.sectors.clone());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), EcolapError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| EcolapError::TransactionError {
                reason: "No transaction to commit".to_string(),
            })
    }

    fn rollback_transaction(&mut self) -> Result<(), EcolapError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| EcolapError::TransactionError {
                reason: "No transaction to roll back".to_string(),
            })?;
        self.sectors = snapshot;
        Ok(())
    }

    fn insert_sector(&mut self, sector: &Sector) -> Result<(), EcolapError> {
        insert_row(
            self.sectors.entry(sector.competition.clone()).or_default(),
            sector,
        )
    }

    fn delete_sector(&mut self, competition: &str, num: u32) -> Result<(), EcolapError> {
        delete_row(
            self.sectors.entry(competition.to_string()).or_default(),
            competition,
            num,
        )
    }

    fn update_sector_count(
        &mut self,
        competition: &str,
        from: u32,
        delta: i32,
    ) -> Result<(), EcolapError> {
        match self.sectors.get_mut(competition) {
            Some(rows) => shift_rows(rows, from, delta),
            None => Ok(()),
        }
    }

    fn update_sector_boundaries(
        &mut self,
        competition: &str,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        update_row(
            self.sectors.entry(competition.to_string()).or_default(),
            competition,
            num,
            start_pos,
            end_pos,
        )
    }

    fn delete_all_sectors(&mut self, competition: &str) -> Result<(), EcolapError> {
        self.sectors.remove(competition);
        Ok(())
    }
}

/// File-based store: one JSON file per competition.
///
/// Writes outside a transaction are flushed immediately. Inside a transaction
/// they go to a working copy of the touched competitions, written back on
/// commit.
pub struct FileBasedSectorStore {
    /// Base directory for storing sector files
    storage_path: PathBuf,
    /// Working copy of the competitions touched by the open transaction
    pending: Option<HashMap<String, Vec<Sector>>>,
}

impl FileBasedSectorStore {
    /// Create a new file-based storage instance
    pub fn new(storage_path: PathBuf) -> Result<Self, EcolapError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path).map_err(|e| EcolapError::SectorStorageError {
                reason: format!("Cannot create storage directory {:?}: {}", storage_path, e),
            })?;
        }

        Ok(Self {
            storage_path,
            pending: None,
        })
    }

    /// Create storage in the default application data directory
    pub fn new_default() -> Result<Self, EcolapError> {
        Self::new(Self::default_storage_path()?)
    }

    /// Get the default storage path for sector files
    pub fn default_storage_path() -> Result<PathBuf, EcolapError> {
        let app_data_dir = dirs::data_dir().ok_or(EcolapError::NoConfigDir)?;
        Ok(app_data_dir.join("ecolap").join("sectors"))
    }

    /// Get the storage directory path
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    fn file_path_for_competition(&self, competition: &str) -> PathBuf {
        let filename = format!("{}.json", Self::normalize_competition_name(competition));
        self.storage_path.join(filename)
    }

    /// Normalize competition name for consistent file naming
    fn normalize_competition_name(competition: &str) -> String {
        competition
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }

    fn load_from_file(&self, competition: &str) -> Result<Vec<Sector>, EcolapError> {
        let file_path = self.file_path_for_competition(competition);
        if !file_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&file_path).map_err(|e| {
            EcolapError::SectorStorageError {
                reason: format!("Failed to read {:?}: {}", file_path, e),
            }
        })?;
        let mut sectors: Vec<Sector> =
            serde_json::from_str(&content).map_err(|e| EcolapError::SectorStorageError {
                reason: format!("Failed to parse {:?}: {}", file_path, e),
            })?;
        sectors.sort_by_key(|s| s.num);
        Ok(sectors)
    }

    /// Write through a temporary file then rename it over the final location
    fn save_to_file(&self, competition: &str, sectors: &[Sector]) -> Result<(), EcolapError> {
        let staged = self.stage_file(competition, sectors)?;
        self.promote(competition, &staged)?;
        debug!("Saved {} sectors for {}", sectors.len(), competition);
        Ok(())
    }

    /// Write the sectors next to their final location, returning the temporary path
    fn stage_file(&self, competition: &str, sectors: &[Sector]) -> Result<PathBuf, EcolapError> {
        let temp_path = self
            .file_path_for_competition(competition)
            .with_extension("json.tmp");

        let content = serde_json::to_string_pretty(sectors).map_err(|e| {
            EcolapError::SectorStorageError {
                reason: format!("Failed to serialize sectors: {}", e),
            }
        })?;

        let mut temp_file =
            fs::File::create(&temp_path).map_err(|e| EcolapError::SectorStorageError {
                reason: format!("Failed to create temporary file {:?}: {}", temp_path, e),
            })?;
        temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.sync_all())
            .map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                EcolapError::SectorStorageError {
                    reason: format!("Failed to write temporary file {:?}: {}", temp_path, e),
                }
            })?;
        Ok(temp_path)
    }

    fn promote(&self, competition: &str, temp_path: &Path) -> Result<(), EcolapError> {
        let file_path = self.file_path_for_competition(competition);
        fs::rename(temp_path, &file_path).map_err(|e| {
            let _ = fs::remove_file(temp_path);
            EcolapError::SectorStorageError {
                reason: format!("Failed to move temporary file to {:?}: {}", file_path, e),
            }
        })
    }

    /// Apply `op` to a competition's rows, in the working copy when a
    /// transaction is open, otherwise straight to disk
    fn modify(
        &mut self,
        competition: &str,
        op: impl FnOnce(&mut Vec<Sector>) -> Result<(), EcolapError>,
    ) -> Result<(), EcolapError> {
        if self.pending.is_some() {
            let loaded = match self.pending.as_ref().and_then(|p| p.get(competition)) {
                Some(_) => None,
                None => Some(self.load_from_file(competition)?),
            };
            let Some(pending) = self.pending.as_mut() else {
                return Err(EcolapError::TransactionError {
                    reason: "Transaction vanished while writing".to_string(),
                });
            };
            let rows = pending
                .entry(competition.to_string())
                .or_insert_with(|| loaded.unwrap_or_default());
            op(rows)
        } else {
            let mut rows = self.load_from_file(competition)?;
            op(&mut rows)?;
            self.save_to_file(competition, &rows)
        }
    }
}

impl SectorStore for FileBasedSectorStore {
    fn list_sectors(&self, competition: &str) -> Result<Vec<Sector>, EcolapError> {
        if let Some(rows) = self.pending.as_ref().and_then(|p| p.get(competition)) {
            return Ok(rows.clone());
        }
        self.load_from_file(competition)
    }

    fn begin_transaction(&mut self) -> Result<(), EcolapError> {
        if self.pending.is_some() {
            return Err(EcolapError::TransactionError {
                reason: "A transaction is already in progress".to_string(),
            });
        }
        self.pending = Some(HashMap::new());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), EcolapError> {
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| EcolapError::TransactionError {
                reason: "No transaction to commit".to_string(),
            })?;
        // Every file is written before any is renamed, so a failed write leaves
        // the committed files untouched. A failing rename still leaves the
        // competitions renamed before it committed.
        let mut staged = Vec::with_capacity(pending.len());
        for (competition, rows) in pending {
            match self.stage_file(competition, rows) {
                Ok(temp_path) => staged.push((competition, temp_path)),
                Err(e) => {
                    for (_, temp_path) in &staged {
                        let _ = fs::remove_file(temp_path);
                    }
                    return Err(e);
                }
            }
        }
        for (i, (competition, temp_path)) in staged.iter().enumerate() {
            if let Err(e) = self.promote(competition, temp_path) {
                for (_, temp_path) in &staged[i + 1..] {
                    let _ = fs::remove_file(temp_path);
                }
                return Err(e);
            }
        }
        info!("Committed sector changes for {} competitions", pending.len());
        self.pending = None;
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), EcolapError> {
        self.pending
            .take()
            .map(|_| ())
            .ok_or_else(|| EcolapError::TransactionError {
                reason: "No transaction to roll back".to_string(),
            })
    }

    fn insert_sector(&mut self, sector: &Sector) -> Result<(), EcolapError> {
        let competition = sector.competition.clone();
        self.modify(&competition, |rows| insert_row(rows, sector))
    }

    fn delete_sector(&mut self, competition: &str, num: u32) -> Result<(), EcolapError> {
        self.modify(competition, |rows| delete_row(rows, competition, num))
    }

    fn update_sector_count(
        &mut self,
        competition: &str,
        from: u32,
        delta: i32,
    ) -> Result<(), EcolapError> {
        self.modify(competition, |rows| shift_rows(rows, from, delta))
    }

    fn update_sector_boundaries(
        &mut self,
        competition: &str,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Result<(), EcolapError> {
        self.modify(competition, |rows| {
            update_row(rows, competition, num, start_pos, end_pos)
        })
    }

    fn delete_all_sectors(&mut self, competition: &str) -> Result<(), EcolapError> {
        self.modify(competition, |rows| {
            rows.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(store: &mut impl SectorStore) {
        store.insert_sector(&Sector::new("Nogaro", 0, 0, 9)).unwrap();
        store.insert_sector(&Sector::new("Nogaro", 1, 10, 19)).unwrap();
    }

    #[test]
    fn test_competition_name_normalization() {
        assert_eq!(
            FileBasedSectorStore::normalize_competition_name("Shell Eco-marathon 2013"),
            "shell_eco_marathon_2013"
        );
    }

    #[test]
    fn test_memory_store_rejects_duplicate_numbers() {
        let mut store = MemorySectorStore::new();
        seeded(&mut store);
        assert!(store.insert_sector(&Sector::new("Nogaro", 1, 30, 40)).is_err());
    }

    #[test]
    fn test_memory_store_shift() {
        let mut store = MemorySectorStore::new();
        seeded(&mut store);
        store.update_sector_count("Nogaro", 1, 1).unwrap();
        let nums: Vec<u32> = store
            .list_sectors("Nogaro")
            .unwrap()
            .iter()
            .map(|s| s.num)
            .collect();
        assert_eq!(nums, vec![0, 2]);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut store = MemorySectorStore::new();
        seeded(&mut store);
        {
            let mut tx = Transaction::begin(&mut store).unwrap();
            tx.delete_all_sectors("Nogaro").unwrap();
            assert!(tx.list_sectors("Nogaro").unwrap().is_empty());
        }
        assert!(!store.in_transaction());
        assert_eq!(store.list_sectors("Nogaro").unwrap().len(), 2);
    }

    #[test]
    fn test_panic_inside_transaction_rolls_back() {
        let mut store = MemorySectorStore::new();
        seeded(&mut store);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut tx = Transaction::begin(&mut store).unwrap();
            tx.update_sector_count("Nogaro", 0, 1).unwrap();
            panic!("edit interrupted before commit");
        }));
        assert!(outcome.is_err());
        assert!(!store.in_transaction());
        let nums: Vec<u32> = store
            .list_sectors("Nogaro")
            .unwrap()
            .iter()
            .map(|s| s.num)
            .collect();
        assert_eq!(nums, vec![0, 1]);
    }

    #[test]
    fn test_committed_transaction_persists() {
        let mut store = MemorySectorStore::new();
        seeded(&mut store);
        let mut tx = Transaction::begin(&mut store).unwrap();
        tx.delete_sector("Nogaro", 0).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.list_sectors("Nogaro").unwrap().len(), 1);
    }

    #[test]
    fn test_nested_transaction_is_rejected() {
        let mut store = MemorySectorStore::new();
        store.begin_transaction().unwrap();
        assert!(matches!(
            store.begin_transaction(),
            Err(EcolapError::TransactionError { .. })
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(store.storage_path(), temp_dir.path());
        seeded(&mut store);

        let reopened = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        let sectors = reopened.list_sectors("Nogaro").unwrap();
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[1], Sector::new("Nogaro", 1, 10, 19));
    }

    #[test]
    fn test_file_store_transaction_is_invisible_until_commit() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        seeded(&mut store);

        store.begin_transaction().unwrap();
        store.delete_sector("Nogaro", 0).unwrap();
        store.update_sector_count("Nogaro", 1, -1).unwrap();
        assert_eq!(store.list_sectors("Nogaro").unwrap().len(), 1);

        let other = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(other.list_sectors("Nogaro").unwrap().len(), 2);

        store.commit_transaction().unwrap();
        let sectors = other.list_sectors("Nogaro").unwrap();
        assert_eq!(sectors, vec![Sector::new("Nogaro", 0, 10, 19)]);
    }

    #[test]
    fn test_file_store_rollback_discards_changes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        seeded(&mut store);

        store.begin_transaction().unwrap();
        store.delete_all_sectors("Nogaro").unwrap();
        store.rollback_transaction().unwrap();
        assert_eq!(store.list_sectors("Nogaro").unwrap().len(), 2);
    }

    #[test]
    fn test_failed_commit_writes_no_competition() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        seeded(&mut store);
        // a directory in the way of the temporary file makes that write fail
        fs::create_dir(temp_dir.path().join("ales.json.tmp")).unwrap();

        store.begin_transaction().unwrap();
        store.delete_all_sectors("Nogaro").unwrap();
        store.insert_sector(&Sector::new("Ales", 0, 0, 5)).unwrap();
        assert!(matches!(
            store.commit_transaction(),
            Err(EcolapError::SectorStorageError { .. })
        ));
        store.rollback_transaction().unwrap();

        let reopened = FileBasedSectorStore::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.list_sectors("Nogaro").unwrap().len(), 2);
        assert!(reopened.list_sectors("Ales").unwrap().is_empty());
        assert!(!temp_dir.path().join("nogaro.json.tmp").exists());
    }
}
