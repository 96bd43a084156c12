//! The handle registry: logical ID -> [`Handle`] records, partitioned
//! across fixed-slot segment files by `hash(logical_id) mod P`.
//!
//! Each segment keeps an in-memory `logical_id -> slot` index rebuilt
//! by scanning the file on open, so `update` after the first write is
//! a single positioned write at a known offset rather than a linear
//! search. Per-sector locking serializes concurrent writers of the
//! same handle; readers never block on it.

use crate::segment::{partition_of, SegmentFile};
use dashmap::DashMap;
use ordb_core::error::{Error, Result};
use ordb_core::handle::Handle;
use ordb_core::ids::LogicalId;
use ordb_core::traits::{Cache, Registry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

struct Segment {
    file: Mutex<SegmentFile>,
    slots: Mutex<HashMap<LogicalId, u64>>,
}

impl Segment {
    fn open(path: PathBuf) -> Result<Self> {
        let mut file = SegmentFile::open(path)?;
        let mut slots = HashMap::new();
        for (slot, record) in file.scan::<Handle>()? {
            slots.insert(record.logical_id, slot);
        }
        Ok(Segment {
            file: Mutex::new(file),
            slots: Mutex::new(slots),
        })
    }

    fn get(&self, id: LogicalId) -> Result<Option<Handle>> {
        let slot = match self.slots.lock().get(&id).copied() {
            Some(slot) => slot,
            None => return Ok(None),
        };
        self.file.lock().read_at(slot)
    }

    fn put(&self, handle: &Handle) -> Result<()> {
        let existing_slot = self.slots.lock().get(&handle.logical_id).copied();
        let mut file = self.file.lock();
        let slot = match existing_slot {
            Some(slot) => {
                file.write_at(slot, handle)?;
                slot
            }
            None => file.append(handle)?,
        };
        self.slots.lock().insert(handle.logical_id, slot);
        Ok(())
    }

    fn remove(&self, id: LogicalId) -> Result<()> {
        let slot = self.slots.lock().remove(&id);
        if let Some(slot) = slot {
            self.file.lock().clear_at(slot)?;
        }
        Ok(())
    }
}

/// Per-sector lock scope, chosen at construction by
/// [`ordb_core::options::TransactionOptions::use_cache_for_file_region_locks`].
enum SectorLocks {
    /// OS-process-local lock table keyed by `(segment, logical_id)`.
    Local(DashMap<(u32, LogicalId), ()>),
    /// The shared L2 cache's named-lock primitive, for clustered mode
    /// where multiple processes write the same segment files.
    Cache(Arc<dyn Cache>),
}

impl SectorLocks {
    fn lock(&self, segment: u32, id: LogicalId) -> Result<SectorGuard<'_>> {
        match self {
            SectorLocks::Local(table) => {
                table.insert((segment, id), ());
                Ok(SectorGuard::Local(self, segment, id))
            }
            SectorLocks::Cache(cache) => {
                let key = cache.format_lock_key(&["registry", &segment.to_string(), &id.to_string()]);
                let mut acquired = cache.lock(&key, Duration::from_secs(30))?;
                let mut attempts = 0;
                while !acquired && attempts < 100 {
                    std::thread::sleep(Duration::from_millis(10));
                    acquired = cache.lock(&key, Duration::from_secs(30))?;
                    attempts += 1;
                }
                if !acquired {
                    return Err(Error::LockTimeout(key));
                }
                Ok(SectorGuard::Cache(cache.clone(), key))
            }
        }
    }
}

enum SectorGuard<'a> {
    Local(&'a SectorLocks, u32, LogicalId),
    Cache(Arc<dyn Cache>, String),
}

impl Drop for SectorGuard<'_> {
    fn drop(&mut self) {
        match self {
            SectorGuard::Local(locks, segment, id) => {
                if let SectorLocks::Local(table) = locks {
                    table.remove(&(*segment, *id));
                }
            }
            SectorGuard::Cache(cache, key) => {
                let _ = cache.unlock(key);
            }
        }
    }
}

/// File-backed [`Registry`] over `P` hash-partitioned segment files per
/// table.
pub struct FileRegistry {
    base_dir: PathBuf,
    partitions: u32,
    tables: DashMap<String, Arc<Vec<Segment>>>,
    locks: SectorLocks,
    replica: Option<Arc<FileRegistry>>,
}

impl FileRegistry {
    /// Open a registry rooted at `base_dir`, partitioning each table
    /// into `partitions` segment files.
    pub fn new(base_dir: impl Into<PathBuf>, partitions: u32) -> Self {
        FileRegistry {
            base_dir: base_dir.into(),
            partitions,
            tables: DashMap::new(),
            locks: SectorLocks::Local(DashMap::new()),
            replica: None,
        }
    }

    /// Use the shared L2 cache's lock primitive for per-sector locking
    /// instead of the in-process lock table.
    pub fn with_cache_locks(mut self, cache: Arc<dyn Cache>) -> Self {
        self.locks = SectorLocks::Cache(cache);
        self
    }

    /// Attach a passive replica registry that every successful local
    /// write is mirrored to.
    pub fn with_replica(mut self, replica: Arc<FileRegistry>) -> Self {
        self.replica = Some(replica);
        self
    }

    fn segments(&self, table: &str) -> Result<Arc<Vec<Segment>>> {
        if let Some(existing) = self.tables.get(table) {
            return Ok(existing.clone());
        }
        let dir = self.table_dir(table);
        let mut segments = Vec::with_capacity(self.partitions as usize);
        for n in 0..self.partitions {
            segments.push(Segment::open(dir.join(format!("{table}-{n}.reg")))?);
        }
        let segments = Arc::new(segments);
        self.tables.insert(table.to_string(), segments.clone());
        Ok(segments)
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.base_dir.join(table)
    }

    fn partition_for(&self, id: LogicalId) -> u32 {
        partition_of(id.as_uuid().as_bytes(), self.partitions)
    }
}

impl Registry for FileRegistry {
    fn add(&self, table: &str, handles: &[Handle]) -> Result<()> {
        let segments = self.segments(table)?;
        for handle in handles {
            let partition = self.partition_for(handle.logical_id);
            let _guard = self.locks.lock(partition, handle.logical_id)?;
            segments[partition as usize].put(handle)?;
        }
        Ok(())
    }

    fn update(&self, table: &str, handles: &[Handle]) -> Result<()> {
        let segments = self.segments(table)?;
        for handle in handles {
            let partition = self.partition_for(handle.logical_id);
            let _guard = self.locks.lock(partition, handle.logical_id)?;
            if let Some(current) = segments[partition as usize].get(handle.logical_id)? {
                if current.version != handle.version {
                    return Err(Error::Conflict(format!(
                        "handle {} expected version {} but found {}",
                        handle.logical_id, handle.version, current.version
                    )));
                }
            }
            segments[partition as usize].put(handle)?;
        }
        Ok(())
    }

    fn update_no_locks(&self, table: &str, handles: &[Handle]) -> Result<()> {
        let segments = self.segments(table)?;
        for handle in handles {
            let partition = self.partition_for(handle.logical_id);
            segments[partition as usize].put(handle)?;
        }
        Ok(())
    }

    fn get(&self, table: &str, logical_ids: &[LogicalId]) -> Result<Vec<Option<Handle>>> {
        let segments = self.segments(table)?;
        logical_ids
            .iter()
            .map(|id| segments[self.partition_for(*id) as usize].get(*id))
            .collect()
    }

    fn remove(&self, table: &str, logical_ids: &[LogicalId]) -> Result<()> {
        let segments = self.segments(table)?;
        for id in logical_ids {
            let partition = self.partition_for(*id);
            let _guard = self.locks.lock(partition, *id)?;
            segments[partition as usize].remove(*id)?;
        }
        Ok(())
    }

    fn replicate(&self, table: &str, handles: &[Handle]) -> Result<()> {
        match &self.replica {
            Some(replica) => replica.update_no_locks(table, handles),
            None => Ok(()),
        }
    }
}
