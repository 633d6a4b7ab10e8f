use serde_json::json;

use super::*;
use crate::store::memory::MemoryStore;
use crate::store::{DocumentStore, FieldOp, Query, StoreError, WriteFields};

fn seed_fields(name: &str) -> WriteFields {
    WriteFields::from([("name".to_string(), FieldOp::Set(json!(name)))])
}

#[tokio::test]
async fn forward_publishes_mapped_snapshots() {
    let store = MemoryStore::new();
    let handle = ListenerHandle::new();
    let (tx, mut listener) = Listener::<usize>::new(handle.clone());

    let live = store.subscribe(Query::collection("apoiados"));
    handle.attach(live.handle.clone());
    spawn_forward(live.snapshots, handle, tx, |docs| Some(docs.len()));

    assert_eq!(listener.recv().await.unwrap().unwrap(), 0);
    store.set("apoiados", "a1", seed_fields("Maria")).await.unwrap();
    assert_eq!(listener.recv().await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn map_returning_none_suppresses_snapshot() {
    let store = MemoryStore::new();
    let handle = ListenerHandle::new();
    let (tx, mut listener) = Listener::<usize>::new(handle.clone());

    let live = store.subscribe(Query::collection("apoiados"));
    handle.attach(live.handle.clone());
    spawn_forward(live.snapshots, handle, tx, |docs| {
        if docs.is_empty() { None } else { Some(docs.len()) }
    });

    store.set("apoiados", "a1", seed_fields("Maria")).await.unwrap();
    // The empty initial snapshot was suppressed; the first value is 1.
    assert_eq!(listener.recv().await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn store_error_is_forwarded_once_then_the_view_ends() {
    let handle = ListenerHandle::new();
    let (tx, mut listener) = Listener::<usize>::new(handle.clone());
    let (snap_tx, snap_rx) = mpsc::unbounded_channel::<Result<Vec<Document>, StoreError>>();
    spawn_forward(snap_rx, handle, tx, |docs| Some(docs.len()));

    snap_tx.send(Ok(Vec::new())).unwrap();
    snap_tx.send(Err(StoreError::Unavailable("backend offline".into()))).unwrap();
    // Queued after the error; must never surface.
    snap_tx.send(Ok(Vec::new())).unwrap();

    assert_eq!(listener.recv().await.unwrap().unwrap(), 0);
    let err = listener.recv().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "E_STORE");
    assert!(listener.recv().await.is_none());
}

#[tokio::test]
async fn cancel_is_idempotent_and_ends_recv() {
    let store = MemoryStore::new();
    let handle = ListenerHandle::new();
    let (tx, mut listener) = Listener::<usize>::new(handle.clone());

    let live = store.subscribe(Query::collection("apoiados"));
    handle.attach(live.handle.clone());
    spawn_forward(live.snapshots, handle.clone(), tx, |docs| Some(docs.len()));

    handle.cancel();
    handle.cancel();
    assert!(listener.recv().await.is_none());
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn cancel_discards_values_already_in_flight() {
    let store = MemoryStore::new();
    let handle = ListenerHandle::new();
    let (tx, mut listener) = Listener::<usize>::new(handle.clone());

    let live = store.subscribe(Query::collection("apoiados"));
    handle.attach(live.handle.clone());
    // Publish the initial snapshot directly, then cancel before recv.
    let _ = tx.send(Ok(99));
    drop(live);
    handle.cancel();

    assert!(listener.recv().await.is_none());
}

#[tokio::test]
async fn attach_after_cancel_releases_subscription_immediately() {
    let store = MemoryStore::new();
    let handle = ListenerHandle::new();
    handle.cancel();

    let mut live = store.subscribe(Query::collection("apoiados"));
    handle.attach(live.handle.clone());

    // The watcher was released on attach: only the initial snapshot exists.
    store.set("apoiados", "a1", seed_fields("Maria")).await.unwrap();
    assert!(live.snapshots.try_recv().unwrap().unwrap().is_empty());
    assert!(live.snapshots.try_recv().is_err());
}
