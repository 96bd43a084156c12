//! Record framing for transaction log files.
//!
//! Each record is `[length: u32 LE][step: u64 LE][payload][crc32: u32
//! LE]`, appended to a per-transaction file in commit order. Unlike the
//! registry's fixed-slot records, there is no padding: log files are
//! append-only and read back sequentially during recovery.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ordb_core::error::{Error, Result};
use std::io::{Cursor, Read, Write};

/// One decoded record: the monotone step within its transaction and
/// the raw payload bytes (an opaque, caller-defined blob at this
/// layer -- in practice a bincode-encoded commit log entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub step: u64,
    pub payload: Vec<u8>,
}

/// Append-encode one record to `out`.
pub fn encode_record(step: u64, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut body = Vec::with_capacity(8 + payload.len());
    body.write_u64::<LittleEndian>(step)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    body.extend_from_slice(payload);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    out.write_u32::<LittleEndian>(body.len() as u32)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    out.extend_from_slice(&body);
    out.write_u32::<LittleEndian>(crc)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(())
}

/// Decode every well-formed record from a whole file's bytes, in
/// order. Stops at the first truncated or checksum-mismatched record
/// rather than erroring, since a torn final write (a crash mid-append)
/// is an expected recovery scenario, not corruption.
pub fn decode_records(bytes: &[u8]) -> Vec<Record> {
    let mut cursor = Cursor::new(bytes);
    let mut records = Vec::new();

    loop {
        let len = match cursor.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(_) => break,
        };
        let mut body = vec![0u8; len];
        if cursor.read_exact(&mut body).is_err() {
            break;
        }
        let crc = match cursor.read_u32::<LittleEndian>() {
            Ok(crc) => crc,
            Err(_) => break,
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            break;
        }

        let mut body_cursor = Cursor::new(&body);
        let step = match body_cursor.read_u64::<LittleEndian>() {
            Ok(step) => step,
            Err(_) => break,
        };
        let mut payload = Vec::new();
        if body_cursor.read_to_end(&mut payload).is_err() {
            break;
        }
        records.push(Record { step, payload });
    }

    records
}

/// Encode a full sequence of records, as written to a fresh log file.
pub fn encode_all(records: &[(u64, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (step, payload) in records {
        encode_record(*step, payload, &mut out)?;
    }
    Ok(out)
}

/// Append one record's bytes directly to an open file handle.
pub fn append_record<W: Write>(w: &mut W, step: u64, payload: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    encode_record(step, payload, &mut buf)?;
    w.write_all(&buf)?;
    Ok(())
}
