//! Content-addressed blob storage: a plain hash-sharded variant and an
//! erasure-coded variant that spreads each blob's shards across
//! several drive folders.

use crate::erasure;
use crate::segment::partition_of;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ordb_core::error::{Error, Result};
use ordb_core::ids::PhysicalId;
use ordb_core::options::ErasureConfig;
use ordb_core::traits::BlobStore;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of hash-sharded subdirectories a table's blobs are spread
/// across, to keep any one directory's entry count manageable.
const SHARD_COUNT: u32 = 256;

fn shard_path(base: &Path, table: &str, id: PhysicalId) -> PathBuf {
    let shard = partition_of(id.as_uuid().as_bytes(), SHARD_COUNT);
    base.join(table).join(format!("{shard:02x}")).join(id.to_string())
}

/// A plain, non-redundant blob store: one file per blob, sharded by
/// hash of the blob's physical ID.
pub struct PlainBlobStore {
    base_dir: PathBuf,
}

impl PlainBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        PlainBlobStore {
            base_dir: base_dir.into(),
        }
    }

    fn write_one(&self, table: &str, id: PhysicalId, bytes: &[u8]) -> Result<()> {
        let path = shard_path(&self.base_dir, table, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }
}

impl BlobStore for PlainBlobStore {
    fn add(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
        for (id, bytes) in items {
            self.write_one(table, *id, bytes)?;
        }
        Ok(())
    }

    fn update(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
        self.add(table, items)
    }

    fn get_one(&self, table: &str, id: PhysicalId) -> Result<Option<Vec<u8>>> {
        let path = shard_path(&self.base_dir, table, id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, table: &str, ids: &[PhysicalId]) -> Result<()> {
        for id in ids {
            let path = shard_path(&self.base_dir, table, *id);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// An erasure-coded blob store: each blob is split into `D` data
/// shards plus `P` parity shards, one shard per drive folder. A write
/// succeeds once at least `D` shards have landed; a read tolerates up
/// to `P` missing or unreadable shards.
///
/// Failures here are deliberately never promoted to
/// [`Error::FailoverQualified`]: losing shards is a blob-layer event
/// that rolls the transaction back, not a registry/store-repository
/// condition that should flip the replication toggler.
pub struct ErasureBlobStore {
    config: ErasureConfig,
}

impl ErasureBlobStore {
    pub fn new(config: ErasureConfig) -> Result<Self> {
        config.validate().map_err(Error::Unconfigured)?;
        Ok(ErasureBlobStore { config })
    }

    fn shard_path(&self, drive: usize, table: &str, id: PhysicalId) -> PathBuf {
        self.config.drive_paths[drive]
            .join(table)
            .join(format!("{}_{}", id, drive))
    }
}

impl BlobStore for ErasureBlobStore {
    fn add(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
        for (id, bytes) in items {
            // Prefix with the exact length so decode can trim the
            // shard-size padding back to the original byte count.
            let mut framed = Vec::with_capacity(4 + bytes.len());
            framed
                .write_u32::<LittleEndian>(bytes.len() as u32)
                .expect("write to Vec never fails");
            framed.extend_from_slice(bytes);

            let shards = erasure::encode(
                &framed,
                self.config.data_shards,
                self.config.parity_shards,
            );
            let mut written = 0;
            for (drive, shard) in shards.iter().enumerate() {
                let path = self.shard_path(drive, table, *id);
                if let Some(parent) = path.parent() {
                    if fs::create_dir_all(parent).is_err() {
                        continue;
                    }
                }
                if fs::write(&path, shard).is_ok() {
                    written += 1;
                }
            }
            if written < self.config.data_shards {
                return Err(Error::CorruptedStore(format!(
                    "erasure write for blob {id} landed only {written}/{} required shards",
                    self.config.data_shards
                )));
            }
        }
        Ok(())
    }

    fn update(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
        self.add(table, items)
    }

    fn get_one(&self, table: &str, id: PhysicalId) -> Result<Option<Vec<u8>>> {
        let total = self.config.total_shards();
        let mut surviving = Vec::with_capacity(total);
        let mut shard_len = 0;
        let mut any_found = false;
        for drive in 0..total {
            let path = self.shard_path(drive, table, id);
            match fs::read(&path) {
                Ok(bytes) => {
                    any_found = true;
                    shard_len = shard_len.max(bytes.len());
                    surviving.push((drive, bytes));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            if surviving.len() == self.config.data_shards {
                break;
            }
        }
        if !any_found {
            return Ok(None);
        }
        if surviving.len() < self.config.data_shards {
            return Err(Error::CorruptedStore(format!(
                "blob {id} has only {}/{} shards available",
                surviving.len(),
                self.config.data_shards
            )));
        }
        let padded_len = shard_len * self.config.data_shards;
        let framed = erasure::decode(
            &surviving,
            self.config.data_shards,
            self.config.parity_shards,
            padded_len,
        )?;
        let mut header = &framed[..4];
        let len = header.read_u32::<LittleEndian>()? as usize;
        if 4 + len > framed.len() {
            return Err(Error::CorruptedStore(format!(
                "blob {id} length prefix {len} exceeds decoded shard data"
            )));
        }
        Ok(Some(framed[4..4 + len].to_vec()))
    }

    fn remove(&self, table: &str, ids: &[PhysicalId]) -> Result<()> {
        for id in ids {
            for drive in 0..self.config.total_shards() {
                let path = self.shard_path(drive, table, *id);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_store_round_trips_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlainBlobStore::new(dir.path());
        let id = PhysicalId::new();
        store.add("nodes", &[(id, b"hello".to_vec())]).unwrap();
        assert_eq!(store.get_one("nodes", id).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn plain_store_missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlainBlobStore::new(dir.path());
        assert_eq!(store.get_one("nodes", PhysicalId::new()).unwrap(), None);
    }

    #[test]
    fn plain_store_remove_then_get_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlainBlobStore::new(dir.path());
        let id = PhysicalId::new();
        store.add("nodes", &[(id, b"hello".to_vec())]).unwrap();
        store.remove("nodes", &[id]).unwrap();
        assert_eq!(store.get_one("nodes", id).unwrap(), None);
    }

    fn erasure_store(base: &Path, data: usize, parity: usize) -> ErasureBlobStore {
        let drives: Vec<PathBuf> = (0..data + parity)
            .map(|i| base.join(format!("drive{i}")))
            .collect();
        ErasureBlobStore::new(ErasureConfig {
            data_shards: data,
            parity_shards: parity,
            drive_paths: drives,
            repair_on_read: false,
        })
        .unwrap()
    }

    #[test]
    fn erasure_store_round_trips_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = erasure_store(dir.path(), 3, 2);
        let id = PhysicalId::new();
        let payload = b"a somewhat longer payload to split across shards".to_vec();
        store.add("nodes", &[(id, payload.clone())]).unwrap();
        let back = store.get_one("nodes", id).unwrap().unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn erasure_store_survives_losing_a_parity_drive() {
        let dir = tempfile::tempdir().unwrap();
        let store = erasure_store(dir.path(), 3, 2);
        let id = PhysicalId::new();
        let payload = b"surviving a drive failure end to end".to_vec();
        store.add("nodes", &[(id, payload.clone())]).unwrap();

        // simulate losing one data drive
        let lost = store.shard_path(0, "nodes", id);
        fs::remove_file(&lost).unwrap();

        let back = store.get_one("nodes", id).unwrap().unwrap();
        assert_eq!(back, payload);
    }
}
