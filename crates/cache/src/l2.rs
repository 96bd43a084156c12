//! An in-memory `Cache` implementation for standalone mode and tests.
//!
//! Every lock carries a TTL: a holder that crashes without calling
//! [`Cache::unlock`] stops blocking anyone once the lease elapses,
//! instead of wedging the store forever.

use dashmap::DashMap;
use ordb_core::error::{Error, Result};
use ordb_core::traits::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map(|at| Instant::now() < at).unwrap_or(true)
    }
}

/// A process-local `Cache`, backed by two `DashMap`s: one for values,
/// one for advisory locks.
#[derive(Default)]
pub struct InMemoryCache {
    values: DashMap<String, Entry>,
    locks: DashMap<String, Instant>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache {
            values: DashMap::new(),
            locks: DashMap::new(),
        }
    }
}

impl Cache for InMemoryCache {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.values.insert(
            key.to_string(),
            Entry {
                bytes: value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.values.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.bytes.clone())),
            Some(_) => {
                self.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn get_ex(&self, key: &str, ttl: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let value = self.get(key)?;
        if value.is_some() {
            if let Some(mut entry) = self.values.get_mut(key) {
                entry.expires_at = ttl.map(|d| Instant::now() + d);
            }
        }
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn set_struct<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.set(key, bytes, ttl)
    }

    fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let deadline = now + ttl;
        let mut acquired = false;
        self.locks
            .entry(key.to_string())
            .and_modify(|expires_at| {
                if *expires_at <= now {
                    *expires_at = deadline;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                deadline
            });
        Ok(acquired)
    }

    fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self
            .locks
            .get(key)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false))
    }

    fn unlock(&self, key: &str) -> Result<()> {
        self.locks.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values.clear();
        self.locks.clear();
        Ok(())
    }

    fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}
