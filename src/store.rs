//! Highlight Store
//!
//! Persists the full highlight list as one JSON array under a single storage
//! slot. Every operation is a whole-collection read-modify-write, which is fine
//! for one user's notes. Callers that share a store between tasks serialize
//! writes themselves (see `handler::AppState::write_lock`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};

use crate::model::{HighlightRecord, UpdateHighlight};
use crate::sync::{SyncStats, merge_record};

pub const HIGHLIGHTS_KEY: &str = "highlights";
pub const ACTIVE_KEY: &str = "isActive";

/// A synchronous string key-value slot store.
pub trait Storage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        Ok(slots.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per slot (`<dir>/<key>.json`). Writes go through a temporary
/// file and a rename so a slot is always either the old or the new payload.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create storage directory {:?}", dir))?;
        Ok(FileStorage {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            anyhow::bail!("invalid storage key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key)?;
        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {:?}", path)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        fs::write(&tmp, value).with_context(|| format!("failed to write {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("failed to replace {:?}", path))?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct HighlightStore {
    storage: Arc<dyn Storage>,
}

impl HighlightStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Reads the list. A payload that is not a valid JSON array of records is
    /// treated as an empty collection.
    fn load(&self) -> Result<Vec<HighlightRecord>> {
        let Some(raw) = self.storage.read(HIGHLIGHTS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(error = %e, "highlight store payload is corrupt, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[HighlightRecord]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.storage.write(HIGHLIGHTS_KEY, &raw)
    }

    pub fn append(&self, record: HighlightRecord) -> Result<()> {
        let mut records = self.load()?;
        tracing::debug!(id = %record.id, url = %record.url, "appending highlight");
        records.push(record);
        self.save(&records)
    }

    pub fn list_all(&self) -> Result<Vec<HighlightRecord>> {
        self.load()
    }

    /// Records whose url equals `url` exactly. No normalization is applied.
    pub fn list_by_url(&self, url: &str) -> Result<Vec<HighlightRecord>> {
        Ok(self.load()?.into_iter().filter(|r| r.url == url).collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<HighlightRecord>> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// Merges `update` into the record with `id`. Returns `None`, without
    /// writing, when no such record exists.
    pub fn update(&self, id: &str, update: &UpdateHighlight) -> Result<Option<HighlightRecord>> {
        let mut records = self.load()?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.apply(update);
        let updated = record.clone();
        self.save(&records)?;
        Ok(Some(updated))
    }

    /// Removes the record with `id`. Returns whether a record was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }

    /// Merges externally exported records by id.
    pub fn import(&self, incoming: Vec<HighlightRecord>) -> Result<SyncStats> {
        let mut records = self.load()?;
        let mut stats = SyncStats::default();
        for record in incoming {
            merge_record(&mut records, record).record(&mut stats);
        }
        if stats.created > 0 || stats.updated > 0 {
            self.save(&records)?;
        }
        Ok(stats)
    }

    pub fn read_flag(&self, key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.storage.read(key)? else {
            return Ok(default);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "stored flag is corrupt, using default");
                Ok(default)
            }
        }
    }

    pub fn write_flag(&self, key: &str, value: bool) -> Result<()> {
        self.storage.write(key, &serde_json::to_string(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateHighlight;

    fn record(url: &str, note: &str) -> HighlightRecord {
        HighlightRecord::new(CreateHighlight {
            url: url.to_string(),
            text: "selected".to_string(),
            note: note.to_string(),
            start_offset: 2,
            end_offset: 10,
            xpath: "/html[1]/body[1]/p[1]".to_string(),
            color: None,
        })
    }


    #[test]
    fn test_list_by_url_is_exact() {
        let store = HighlightStore::in_memory();
        store.append(record("https://a.com/x", "")).unwrap();
        store.append(record("https://a.com/x/", "")).unwrap();
        store.append(record("https://b.com", "")).unwrap();

        assert_eq!(store.list_all().unwrap().len(), 3);
        let hits = store.list_by_url("https://a.com/x").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|r| r.url == "https://a.com/x"));
        assert!(store.list_by_url("https://nowhere.com").unwrap().is_empty());
    }

    #[test]
    fn test_remove_leaves_others_untouched() {
        let store = HighlightStore::in_memory();
        let keep_a = record("u", "a");
        let doomed = record("u", "b");
        let keep_c = record("v", "c");
        for r in [&keep_a, &doomed, &keep_c] {
            store.append(r.clone()).unwrap();
        }

        assert!(store.remove(&doomed.id).unwrap());
        assert!(!store.remove(&doomed.id).unwrap());
        assert_eq!(store.list_all().unwrap(), vec![keep_a, keep_c]);
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let store = HighlightStore::in_memory();
        let existing = record("u", "n");
        store.append(existing.clone()).unwrap();

        let update = UpdateHighlight {
            note: Some("changed".to_string()),
            color: None,
        };
        assert_eq!(store.update("missing", &update).unwrap(), None);
        assert_eq!(store.list_all().unwrap(), vec![existing.clone()]);

        let updated = store.update(&existing.id, &update).unwrap().unwrap();
        assert_eq!(updated.note, "changed");
        assert_eq!(store.get(&existing.id).unwrap(), Some(updated));
    }

    #[test]
    fn test_corrupt_payload_reads_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(HIGHLIGHTS_KEY, "{not json").unwrap();
        storage.write(ACTIVE_KEY, "maybe").unwrap();
        let store = HighlightStore::new(storage);

        assert!(store.list_all().unwrap().is_empty());
        assert!(store.read_flag(ACTIVE_KEY, true).unwrap());

        store.append(record("u", "")).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = HighlightStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));
        let saved = record("https://a.com", "kept");
        first.append(saved.clone()).unwrap();
        first.write_flag(ACTIVE_KEY, false).unwrap();

        let second = HighlightStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));
        assert_eq!(second.list_all().unwrap(), vec![saved]);
        assert!(!second.read_flag(ACTIVE_KEY, true).unwrap());
        assert!(dir.path().join("highlights.json").exists());
    }

    #[test]
    fn test_file_storage_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.write("../escape", "1").is_err());
        assert_eq!(storage.read("absent").unwrap(), None);
    }

    #[test]
    fn test_import_merges_by_id() {
        let store = HighlightStore::in_memory();
        let existing = record("u", "old");
        store.append(existing.clone()).unwrap();

        let mut edited = existing.clone();
        edited.note = "new".to_string();
        let stats = store.import(vec![edited, record("u", "fresh")]).unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 1);
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].note, "new");
    }
}
