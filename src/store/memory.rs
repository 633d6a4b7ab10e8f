//! In-memory document store.
//!
//! DESIGN
//! ======
//! Reference implementation of [`DocumentStore`]: collections are nested
//! maps behind one `RwLock`, watchers are re-evaluated and notified after
//! every committed write that touches their collection. Server timestamps
//! resolve from the system clock with a strictly-monotonic guard so two
//! commits never observe a decreasing server time.
//!
//! Snapshot delivery is synchronous with the committing write (unbounded
//! channels), which gives each subscription the in-order, monotonically
//! advancing view the production database guarantees.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    cmp_values, now_ms, Direction, Document, DocumentStore, FieldOp, Fields, Filter, FilterOp,
    LiveQuery, Query, Snapshots, StoreError, SubscriptionHandle, Unsubscribe, WriteBatch,
    WriteFields, WriteOp,
};

// =============================================================================
// STORE
// =============================================================================

type SnapshotSender = mpsc::UnboundedSender<Result<Vec<Document>, StoreError>>;

struct Watcher {
    id: u64,
    query: Query,
    tx: SnapshotSender,
}

struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    watchers: Vec<Watcher>,
    next_watcher: u64,
}

/// In-memory [`DocumentStore`] with live subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    /// Last server timestamp handed out, for the monotonic guard.
    clock: Arc<Mutex<i64>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                collections: HashMap::new(),
                watchers: Vec::new(),
                next_watcher: 0,
            })),
            clock: Arc::new(Mutex::new(0)),
        }
    }

    fn server_now(&self) -> i64 {
        let mut last = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = now_ms().max(*last + 1);
        *last = now;
        now
    }

    /// Apply a list of writes atomically and notify watchers once.
    fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let server_ts = self.server_now();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        // Validate before mutating so a failing update rolls the whole
        // batch back. Updates may target documents set earlier in the batch.
        let mut created: HashSet<(String, String)> = HashSet::new();
        for op in &ops {
            match op {
                WriteOp::Set { collection, id, .. } => {
                    created.insert((collection.clone(), id.clone()));
                }
                WriteOp::Update { collection, id, .. } => {
                    let exists = inner
                        .collections
                        .get(collection)
                        .is_some_and(|c| c.contains_key(id))
                        || created.contains(&(collection.clone(), id.clone()));
                    if !exists {
                        return Err(StoreError::NotFound {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    }
                }
            }
        }

        let mut touched: HashSet<String> = HashSet::new();
        for op in ops {
            match op {
                WriteOp::Set { collection, id, fields } => {
                    let doc = inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .entry(id)
                        .or_default();
                    doc.clear();
                    apply_fields(doc, fields, server_ts);
                    touched.insert(collection);
                }
                WriteOp::Update { collection, id, fields } => {
                    if let Some(doc) =
                        inner.collections.get_mut(&collection).and_then(|c| c.get_mut(&id))
                    {
                        apply_fields(doc, fields, server_ts);
                    }
                    touched.insert(collection);
                }
            }
        }

        notify(&mut inner, &touched);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document { id: id.to_string(), fields: fields.clone() }))
    }

    async fn set(&self, collection: &str, id: &str, fields: WriteFields) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            fields,
        }])
    }

    async fn update(&self, collection: &str, id: &str, fields: WriteFields) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        }])
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.collections.get_mut(collection).and_then(|c| c.remove(id)).is_some();
        if removed {
            let touched = HashSet::from([collection.to_string()]);
            notify(&mut inner, &touched);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(evaluate(&inner.collections, query))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.apply(batch.into_ops())
    }

    fn subscribe(&self, query: Query) -> LiveQuery {
        let (tx, rx): (SnapshotSender, Snapshots) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_watcher;
        inner.next_watcher += 1;

        // Initial snapshot and registration happen under one lock, so no
        // committed write can fall between them.
        let snapshot = evaluate(&inner.collections, &query);
        let _ = tx.send(Ok(snapshot));
        inner.watchers.push(Watcher { id, query, tx });
        drop(inner);

        let handle = SubscriptionHandle::new(Arc::new(MemoryUnsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
            done: AtomicBool::new(false),
        }));
        LiveQuery { handle, snapshots: rx }
    }
}

// =============================================================================
// UNSUBSCRIBE
// =============================================================================

struct MemoryUnsubscribe {
    inner: Weak<RwLock<Inner>>,
    id: u64,
    done: AtomicBool,
}

impl Unsubscribe for MemoryUnsubscribe {
    fn unsubscribe(&self) {
        if self.done.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.watchers.retain(|w| w.id != self.id);
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

fn evaluate(collections: &HashMap<String, BTreeMap<String, Fields>>, query: &Query) -> Vec<Document> {
    let Some(collection) = collections.get(&query.collection) else {
        return Vec::new();
    };

    let mut docs: Vec<Document> = collection
        .iter()
        .filter(|(id, _)| query.key.as_deref().is_none_or(|key| key == id.as_str()))
        .map(|(id, fields)| Document { id: id.clone(), fields: fields.clone() })
        .filter(|doc| query.filters.iter().all(|filter| matches(doc, filter)))
        .collect();

    if let Some((field, direction)) = &query.order_by {
        // Ordering excludes documents missing the ordered field.
        docs.retain(|doc| doc.fields.get(field).is_some_and(|v| !v.is_null()));
        docs.sort_by(|a, b| {
            let ord = cmp_field(&a.fields, &b.fields, field);
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }
    docs
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    let Some(value) = doc.fields.get(&filter.field) else {
        return false;
    };
    let Some(ord) = cmp_values(value, &filter.value) else {
        // Non-comparable kinds (null, arrays, objects, mixed) only ever
        // satisfy exact equality.
        return filter.op == FilterOp::Eq && value == &filter.value;
    };
    match filter.op {
        FilterOp::Eq => ord == std::cmp::Ordering::Equal,
        FilterOp::Gt => ord == std::cmp::Ordering::Greater,
        FilterOp::Gte => ord != std::cmp::Ordering::Less,
        FilterOp::Lt => ord == std::cmp::Ordering::Less,
    }
}

fn cmp_field(a: &Fields, b: &Fields, field: &str) -> std::cmp::Ordering {
    match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => cmp_values(x, y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

// =============================================================================
// MUTATION
// =============================================================================

fn apply_fields(doc: &mut Fields, fields: WriteFields, server_ts: i64) {
    for (key, op) in fields {
        match op {
            FieldOp::Set(value) => {
                doc.insert(key, value);
            }
            FieldOp::ServerTimestamp => {
                doc.insert(key, Value::from(server_ts));
            }
            FieldOp::Increment(delta) => {
                let current = doc.get(&key).and_then(Value::as_i64).unwrap_or(0);
                doc.insert(key, Value::from(current + delta));
            }
        }
    }
}

/// Re-evaluate and notify every watcher whose collection was touched.
/// Watchers whose receiver is gone are dropped.
fn notify(inner: &mut Inner, touched: &HashSet<String>) {
    let Inner { collections, watchers, .. } = inner;
    watchers.retain(|watcher| {
        if !touched.contains(&watcher.query.collection) {
            return true;
        }
        let snapshot = evaluate(collections, &watcher.query);
        watcher.tx.send(Ok(snapshot)).is_ok()
    });
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
