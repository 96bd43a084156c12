//! Fixed-slot segment file I/O shared by the handle registry.
//!
//! A segment stores one record per slot at `offset = slot_index *
//! SLOT_SIZE`, so updating a record already on disk is a single
//! positioned write rather than a rewrite of the whole file. Record
//! framing mirrors the write-ahead log's: a length prefix, the
//! bincode-serialized payload, and a CRC32 trailer so a torn or
//! bit-flipped slot is detected on read rather than silently
//! misread.
//!
//! ```text
//! [length: u32 LE][payload: bytes][crc32: u32 LE][zero padding to SLOT_SIZE]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use ordb_core::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Bytes reserved per slot. Large enough for a `Handle` record (two
/// `Option<Uuid>`, a version, two flags and an optional expiry) with
/// headroom for the length/crc framing.
pub const SLOT_SIZE: u64 = 256;

/// An open, append-and-seek segment file.
pub struct SegmentFile {
    file: File,
    slot_count: u64,
}

impl SegmentFile {
    /// Open (creating if absent) the segment file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(SegmentFile {
            file,
            slot_count: len / SLOT_SIZE,
        })
    }

    /// Number of slots currently allocated in the file (including ones
    /// holding tombstoned records; slots are never reclaimed, only
    /// overwritten).
    pub fn slot_count(&self) -> u64 {
        self.slot_count
    }

    /// Append a new record, returning the slot index it landed in.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<u64> {
        let slot = self.slot_count;
        self.write_at(slot, record)?;
        self.slot_count += 1;
        Ok(slot)
    }

    /// Overwrite the record at `slot` in place.
    pub fn write_at<T: Serialize>(&mut self, slot: u64, record: &T) -> Result<()> {
        let payload = bincode::serialize(record)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if payload.len() + 8 > SLOT_SIZE as usize {
            return Err(Error::CorruptedStore(format!(
                "record of {} bytes does not fit in a {}-byte slot",
                payload.len(),
                SLOT_SIZE
            )));
        }

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut buf = Vec::with_capacity(SLOT_SIZE as usize);
        buf.write_u32::<LittleEndian>(payload.len() as u32)
            .expect("write to Vec never fails");
        buf.extend_from_slice(&payload);
        buf.write_u32::<LittleEndian>(crc)
            .expect("write to Vec never fails");
        buf.resize(SLOT_SIZE as usize, 0);

        self.file.seek(SeekFrom::Start(slot * SLOT_SIZE))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read the record at `slot`, or `None` if the slot has never been
    /// written (all-zero length prefix).
    pub fn read_at<T: DeserializeOwned>(&mut self, slot: u64) -> Result<Option<T>> {
        if slot >= self.slot_count {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(slot * SLOT_SIZE))?;
        let mut buf = vec![0u8; SLOT_SIZE as usize];
        self.file.read_exact(&mut buf)?;

        let mut cursor = &buf[..];
        let len = cursor.read_u32::<LittleEndian>()? as usize;
        if len == 0 {
            return Ok(None);
        }
        if 8 + len > buf.len() {
            return Err(Error::CorruptedStore(format!(
                "slot {slot} declares length {len} larger than the slot"
            )));
        }
        let payload = &buf[4..4 + len];
        let mut crc_cursor = &buf[4 + len..8 + len];
        let expected_crc = crc_cursor.read_u32::<LittleEndian>()?;

        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != expected_crc {
            return Err(Error::CorruptedStore(format!(
                "slot {slot} failed its checksum"
            )));
        }

        let value = bincode::deserialize(payload)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Some(value))
    }

    /// Zero out a slot, marking it empty without reclaiming the space.
    pub fn clear_at(&mut self, slot: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(slot * SLOT_SIZE))?;
        self.file.write_all(&[0u8; SLOT_SIZE as usize])?;
        Ok(())
    }

    /// Scan every allocated slot, yielding `(slot, record)` for the
    /// non-empty ones. Used to rebuild the logical-id -> slot index on
    /// open.
    pub fn scan<T: DeserializeOwned>(&mut self) -> Result<Vec<(u64, T)>> {
        let mut out = Vec::new();
        for slot in 0..self.slot_count {
            if let Some(record) = self.read_at(slot)? {
                out.push((slot, record));
            }
        }
        Ok(out)
    }
}

/// `hash(id) mod partitions`, used to route a logical ID to its
/// registry segment file.
pub fn partition_of(id: &[u8], partitions: u32) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(id);
    (hasher.finalize() % partitions) as u32
}
