//! End-to-end exercise of the registry, blob store and store
//! repository together, the way a committing transaction would use
//! them: stage a blob, register a handle pointing at it, and persist
//! the owning store's updated item count.

use ordb_core::handle::Handle;
use ordb_core::ids::{LogicalId, PhysicalId};
use ordb_core::store::{Store, StoreOptions};
use ordb_core::traits::{BlobStore, Registry};
use ordb_storage::{FileRegistry, FileStoreRepository, PlainBlobStore};

#[test]
fn a_commit_like_sequence_round_trips_through_all_three() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::new(dir.path().join("registry"), 4);
    let blobs = PlainBlobStore::new(dir.path().join("blobs"));
    let stores = FileStoreRepository::new(dir.path().join("stores"));

    let store = Store::new(&StoreOptions::new("people"));
    stores.add(&[store.clone()]).unwrap();

    let physical = PhysicalId::new();
    blobs.add("people-nodes", &[(physical, b"serialized root node".to_vec())]).unwrap();

    let mut handle = Handle::new(LogicalId::new());
    handle.stage(physical);
    handle.flip();
    registry.add("people-nodes", &[handle.clone()]).unwrap();

    stores
        .update(&[("people".to_string(), 1, store.clone())])
        .unwrap();

    let fetched_handle = registry
        .get("people-nodes", &[handle.logical_id])
        .unwrap()
        .remove(0)
        .unwrap();
    assert_eq!(fetched_handle.active_physical(), Some(physical));

    let fetched_blob = blobs.get_one("people-nodes", physical).unwrap().unwrap();
    assert_eq!(fetched_blob, b"serialized root node");

    let fetched_store = stores.get(&["people".to_string()]).unwrap().remove(0).unwrap();
    assert_eq!(fetched_store.count, 1);
    assert_eq!(fetched_store.creation_version, 1);
}

#[test]
fn registry_update_conflict_mirrors_an_aborted_commit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::new(dir.path().join("registry"), 2);

    let handle = Handle::new(LogicalId::new());
    registry.add("t", &[handle.clone()]).unwrap();

    let mut conflicting = handle.clone();
    conflicting.version = ordb_core::version::Version::INITIAL.next();
    let err = registry.update("t", &[conflicting]).unwrap_err();
    assert!(err.is_conflict());
}
