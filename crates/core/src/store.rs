//! Store metadata
//!
//! A [`Store`] is a named ordered map. Its shape-defining attributes
//! (name, slot length, uniqueness) are immutable after creation;
//! everything else -- cache durations, item count, the root node's
//! logical ID -- can change over the store's lifetime.

use crate::ids::LogicalId;
use crate::limits::{validate_slot_length, validate_store_name, DEFAULT_SLOT_LENGTH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache TTLs for the different kinds of data a store touches: nodes,
/// handles, store metadata and (when stored out-of-line) value blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a fetched node stays in L2 before re-fetch.
    pub node_cache_duration: Duration,
    /// How long a fetched handle stays in L2.
    pub registry_cache_duration: Duration,
    /// How long store metadata stays in L2.
    pub store_info_cache_duration: Duration,
    /// How long a value blob stays in L2 (only relevant when values are
    /// stored out-of-line).
    pub value_data_cache_duration: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            node_cache_duration: Duration::from_secs(60),
            registry_cache_duration: Duration::from_secs(60),
            store_info_cache_duration: Duration::from_secs(300),
            value_data_cache_duration: Duration::from_secs(60),
        }
    }
}

/// Construction-time options for a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Unique name within the database, 1-128 bytes.
    pub name: String,
    /// Items per node, `2 <= slot_length <= 10000`.
    pub slot_length: usize,
    /// Reject inserts that would create a duplicate key.
    pub is_unique: bool,
    /// Store values inline in the node's blob rather than as a separate
    /// value blob.
    pub is_value_data_in_node_segment: bool,
    /// Persist the value blob before commit rather than lazily.
    pub is_value_data_actively_persisted: bool,
    /// Allow the value blob to be shared in the global L2 cache (as
    /// opposed to being transaction-local only).
    pub is_value_data_globally_cached: bool,
    /// Attempt to avoid a leaf split by shifting an item through the
    /// parent into a sibling first.
    pub leaf_load_balancing: bool,
    /// Free-form description, not interpreted by the engine.
    pub description: String,
    pub cache_config: CacheConfig,
    /// Base folder for this store's blob tables, if different from the
    /// database default.
    pub blob_store_base_folder_path: Option<String>,
    /// Whether keys are a primitive scalar type (affects the default
    /// comparator) rather than a composite/derived key.
    pub is_primitive_key: bool,
}

impl StoreOptions {
    /// Build options for a unique-key store with the default slot
    /// length.
    pub fn new(name: impl Into<String>) -> Self {
        StoreOptions {
            name: name.into(),
            slot_length: DEFAULT_SLOT_LENGTH,
            is_unique: true,
            is_value_data_in_node_segment: true,
            is_value_data_actively_persisted: false,
            is_value_data_globally_cached: false,
            leaf_load_balancing: false,
            description: String::new(),
            cache_config: CacheConfig::default(),
            blob_store_base_folder_path: None,
            is_primitive_key: true,
        }
    }

    /// Builder: set slot length.
    pub fn with_slot_length(mut self, slot_length: usize) -> Self {
        self.slot_length = slot_length;
        self
    }

    /// Builder: set uniqueness.
    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Builder: enable leaf load balancing.
    pub fn with_leaf_load_balancing(mut self, enabled: bool) -> Self {
        self.leaf_load_balancing = enabled;
        self
    }

    /// Validate the name and slot length invariants.
    pub fn validate(&self) -> Result<(), String> {
        validate_store_name(&self.name)?;
        validate_slot_length(self.slot_length)?;
        Ok(())
    }
}

/// Persisted store metadata record (`storeinfo.*`).
///
/// `name`, `slot_length` and `is_unique` are immutable after creation;
/// `count` and `root_logical_id` change on every structural commit.
/// `creation_version` is bumped by the store repository each time
/// `update` applies a count-delta, giving a cheap optimistic check for
/// concurrent composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub name: String,
    pub slot_length: usize,
    pub is_unique: bool,
    pub leaf_load_balancing: bool,
    pub is_value_data_in_node_segment: bool,
    pub is_value_data_actively_persisted: bool,
    /// Logical ID of the root node, or `None` for an empty store.
    pub root_logical_id: Option<LogicalId>,
    /// Number of live items in the store.
    pub count: i64,
    /// Bumped by the store repository on every metadata write; used as
    /// an optimistic retry guard for count-delta composition.
    pub creation_version: u64,
}

impl Store {
    /// A brand-new, empty store from its construction options.
    pub fn new(options: &StoreOptions) -> Self {
        Store {
            name: options.name.clone(),
            slot_length: options.slot_length,
            is_unique: options.is_unique,
            leaf_load_balancing: options.leaf_load_balancing,
            is_value_data_in_node_segment: options.is_value_data_in_node_segment,
            is_value_data_actively_persisted: options.is_value_data_actively_persisted,
            root_logical_id: None,
            count: 0,
            creation_version: 0,
        }
    }
}
