//! Top-level facade: opens a database directory and hands out
//! [`Session`]s, each bound to one named store.

use crate::config::RuntimeConfig;
use crate::idle_sweep;
use crate::node_repository::RegistryNodeRepository;
use ordb_btree::BTree;
use ordb_cache::InMemoryCache;
use ordb_concurrency::{ItemActionTracker, Transaction, TransactionManager, VersionOracle};
use ordb_core::comparator::Comparator;
use ordb_core::error::{Error, Result};
use ordb_core::ids::TxnId;
use ordb_core::options::{CacheType, Mode, TransactionOptions};
use ordb_core::store::{Store, StoreOptions};
use ordb_core::traits::{BlobStore, Cache, Registry, TransactionLog};
use ordb_durability::FileTransactionLog;
use ordb_replication::ReplicationTracker;
use ordb_storage::{FileRegistry, FileStoreRepository, PlainBlobStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// An open database directory: the registry, blob store, store
/// metadata repository, transaction log and replication tracker
/// backing every store in it.
pub struct Runtime {
    base_dir: PathBuf,
    config: RuntimeConfig,
    registry: Arc<dyn Registry>,
    blob_store: Arc<dyn BlobStore>,
    cache: Arc<dyn Cache>,
    store_repo: Arc<FileStoreRepository>,
    log: Arc<dyn TransactionLog>,
    translog: Arc<FileTransactionLog>,
    replication: Option<Arc<ReplicationTracker>>,
}

impl Runtime {
    /// Open (or initialize) a database rooted at `base_dir`, reading
    /// `ordb.toml` for configuration.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let config = RuntimeConfig::load_or_init(&base_dir)?;

        let registry: Arc<dyn Registry> = Arc::new(FileRegistry::new(
            base_dir.join("registry"),
            config.registry_partitions,
        ));
        let blob_store: Arc<dyn BlobStore> = Arc::new(PlainBlobStore::new(base_dir.join("blobs")));
        let cache: Arc<dyn Cache> = match config.cache_type {
            CacheType::NoCache | CacheType::InMemory => Arc::new(InMemoryCache::new()),
            CacheType::Networked => {
                return Err(Error::Unconfigured(
                    "networked cache requires a backend supplied via Runtime::with_cache".into(),
                ))
            }
        };
        let store_repo = Arc::new(FileStoreRepository::new(base_dir.join("stores")));
        let translog = Arc::new(FileTransactionLog::new(base_dir.clone(), config.transaction_lease()));
        let log: Arc<dyn TransactionLog> = translog.clone();

        let replication = match &config.passive_folder {
            Some(passive) => Some(Arc::new(ReplicationTracker::new(&base_dir, passive)?)),
            None => None,
        };

        info!(base_dir = %base_dir.display(), "runtime opened");
        Ok(Runtime {
            base_dir,
            config,
            registry,
            blob_store,
            cache,
            store_repo,
            log,
            translog,
            replication,
        })
    }

    /// This database's base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Current configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The shared L2 cache.
    pub fn cache(&self) -> Arc<dyn Cache> {
        self.cache.clone()
    }

    /// Allocate a fresh transaction ID.
    pub fn new_txn_id(&self) -> TxnId {
        self.log.new_uuid()
    }

    /// Run one idle-sweep pass, reclaiming at most one abandoned
    /// transaction's phase-1 leftovers. Returns `true` if one was
    /// found and cleaned up. Called automatically at the start of
    /// every [`Session::begin`]; exposed here for callers that want to
    /// drive it on their own schedule instead.
    pub fn sweep_once(&self) -> Result<bool> {
        idle_sweep::sweep_once(&self.translog, &self.blob_store)
    }

    /// Create a new, empty store with the given options.
    pub fn create_store(&self, options: StoreOptions) -> Result<()> {
        options
            .validate()
            .map_err(|e| Error::Unconfigured(format!("invalid store options: {e}")))?;
        self.store_repo.add(&[Store::new(&options)])
    }

    /// Fetch one store's persisted metadata.
    pub fn store_metadata(&self, name: &str) -> Result<Store> {
        self.store_repo
            .get(&[name.to_string()])?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| Error::NotFound(format!("store {name}")))
    }

    /// Open a typed session over store `name`, using `comparator` to
    /// order keys. Each store gets its own transaction manager, since
    /// the registry/blob store table a session's node repository reads
    /// from must match the table the manager commits against.
    pub fn session<K, V, C>(&self, name: &str, comparator: C) -> Result<Session<K, V, C>>
    where
        K: Serialize + DeserializeOwned + Clone + Send + Sync,
        V: Serialize + DeserializeOwned + Clone + Send + Sync,
        C: Comparator<K>,
    {
        // Ensures the store exists before handing out a session over it.
        self.store_metadata(name)?;
        let repo = Arc::new(RegistryNodeRepository::new(
            self.registry.clone(),
            self.blob_store.clone(),
            name.to_string(),
        ));
        let manager = TransactionManager::new(
            self.registry.clone(),
            self.blob_store.clone(),
            self.log.clone(),
            name.to_string(),
        );
        Ok(Session {
            store_name: name.to_string(),
            registry: self.registry.clone(),
            store_repo: self.store_repo.clone(),
            log: self.log.clone(),
            translog: self.translog.clone(),
            blob_store: self.blob_store.clone(),
            replication: self.replication.clone(),
            manager,
            repo,
            comparator,
            max_time: self.config.max_time(),
        })
    }
}

/// A store bound to a runtime: builds a fresh, tracked [`BTree`] for
/// every transaction and drives two-phase commit against the shared
/// registry/blob store/transaction log.
pub struct Session<K, V, C> {
    store_name: String,
    registry: Arc<dyn Registry>,
    store_repo: Arc<FileStoreRepository>,
    log: Arc<dyn TransactionLog>,
    translog: Arc<FileTransactionLog>,
    blob_store: Arc<dyn BlobStore>,
    replication: Option<Arc<ReplicationTracker>>,
    manager: TransactionManager,
    repo: Arc<RegistryNodeRepository<K, V>>,
    comparator: C,
    max_time: std::time::Duration,
}

/// The concrete, tracked repository a session's [`BTree`] is built
/// over: buffers one transaction's reads/writes atop the store's
/// registry-backed node repository.
pub type TrackedRepo<K, V, C> = Arc<ItemActionTracker<K, V, Arc<RegistryNodeRepository<K, V>>, C>>;

impl<K, V, C> Session<K, V, C>
where
    K: Serialize + DeserializeOwned + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
    C: Comparator<K> + Clone,
{
    /// Begin a transaction: triggers one idle-sweep pass to reclaim
    /// any abandoned transaction's leftovers, then snapshots the
    /// store's current root/count, returning a lifecycle handle, the
    /// read/write tracker, and a B-tree cursor over it.
    pub fn begin(&self, mode: Mode) -> Result<(Transaction, TrackedRepo<K, V, C>, BTree<K, V, TrackedRepo<K, V, C>, C>)> {
        idle_sweep::sweep_once(&self.translog, &self.blob_store)?;

        let store = self
            .store_repo
            .get(&[self.store_name.clone()])?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| Error::NotFound(format!("store {}", self.store_name)))?;

        let registry = self.registry.clone();
        let table = self.store_name.clone();
        let oracle: VersionOracle = Arc::new(move |id| {
            registry
                .get(&table, &[id])
                .ok()
                .and_then(|handles| handles.into_iter().next().flatten())
                .map(|h| h.version)
        });

        let tracker = Arc::new(ItemActionTracker::new(self.repo.clone(), oracle, self.comparator.clone()));

        let mut options = TransactionOptions::default();
        options.mode = mode;
        options.max_time = self.max_time;

        let mut txn = Transaction::new(self.log.new_uuid(), options);
        txn.begin()?;
        let tree = BTree::new(
            tracker.clone(),
            self.comparator.clone(),
            store.slot_length,
            store.is_unique,
            store.leaf_load_balancing,
            store.root_logical_id,
            store.count,
        );
        Ok((txn, tracker, tree))
    }

    /// Commit `txn`: runs two-phase commit against the shared registry
    /// and blob store, then persists the tree's (possibly new) root and
    /// item-count delta back to store metadata. On a failover-qualified
    /// error, flips the replication toggler before returning it.
    pub fn commit(
        &self,
        txn: &mut Transaction,
        tracker: &TrackedRepo<K, V, C>,
        tree: &BTree<K, V, TrackedRepo<K, V, C>, C>,
        count_before: i64,
    ) -> Result<()> {
        match self.manager.commit(txn, tracker) {
            Ok(()) => {
                let delta = tree.count() - count_before;
                let mut fields = self
                    .store_repo
                    .get(&[self.store_name.clone()])?
                    .into_iter()
                    .next()
                    .flatten()
                    .ok_or_else(|| Error::NotFound(format!("store {}", self.store_name)))?;
                fields.root_logical_id = tree.root_logical_id();
                self.store_repo
                    .update(&[(self.store_name.clone(), delta, fields)])?;
                Ok(())
            }
            Err(e) => {
                if let Some(replication) = &self.replication {
                    replication.on_possible_failover(&e)?;
                }
                Err(e)
            }
        }
    }
}
