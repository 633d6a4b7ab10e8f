//! Document store abstraction.
//!
//! DESIGN
//! ======
//! The Loja Social backend keeps all durable state in a managed document
//! database. This module models exactly the slice of that database the sync
//! components consume: point CRUD, one-shot queries, live query
//! subscriptions, atomic multi-document batches, server timestamps, and
//! atomic numeric increments. Everything behind [`DocumentStore`] is an
//! external collaborator; [`memory::MemoryStore`] provides the reference
//! semantics and the test substrate.
//!
//! Subscription contract: one snapshot immediately on subscribe, then one
//! snapshot per committed change touching the collection, delivered in
//! order for a given subscription. A batch produces at most one snapshot
//! per subscription.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub mod memory;

// =============================================================================
// DOCUMENT
// =============================================================================

/// Flat field map of a document. Alias to reduce noise in signatures.
pub type Fields = HashMap<String, Value>;

/// A document read back from the store: its key plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Read a string field, if present and a string.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Read an integer field, if present and numeric.
    #[must_use]
    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
}

/// A single field comparison. Documents missing the field never match.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Sort direction of a query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A declarative read against one collection.
///
/// Ordering excludes documents missing the ordered field, the same way the
/// production document database does.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    /// Restrict to a single document key (document listener).
    pub key: Option<String>,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    /// Query over a whole collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self { collection: name.into(), key: None, filters: Vec::new(), order_by: None, limit: None }
    }

    /// Query restricted to one document.
    pub fn doc(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: Some(id.into()),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Add a field filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into() });
        self
    }

    /// Order results by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Truncate results to the first `n` documents after ordering.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

// =============================================================================
// WRITES
// =============================================================================

/// A single field mutation inside a write.
///
/// `ServerTimestamp` and `Increment` are resolved atomically by the store at
/// commit time, so concurrent writers never lose an increment.
#[derive(Debug, Clone)]
pub enum FieldOp {
    Set(Value),
    ServerTimestamp,
    Increment(i64),
}

/// Field mutations of one write operation.
pub type WriteFields = HashMap<String, FieldOp>;

/// One operation inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Replace the whole document (creates it if absent).
    Set { collection: String, id: String, fields: WriteFields },
    /// Mutate fields of an existing document. Fails the batch with
    /// [`StoreError::NotFound`] when the document is absent.
    Update { collection: String, id: String, fields: WriteFields },
}

/// An ordered list of writes committed atomically (all-or-nothing).
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: &str, id: &str, fields: WriteFields) {
        self.ops.push(WriteOp::Set { collection: collection.into(), id: id.into(), fields });
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: WriteFields) {
        self.ops.push(WriteOp::Update { collection: collection.into(), id: id.into(), fields });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failure surfaced by the document store. Opaque to the sync components:
/// passed through unchanged, never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Receiver half of a live query: full result-set snapshots, newest last.
pub type Snapshots = mpsc::UnboundedReceiver<Result<Vec<Document>, StoreError>>;

/// Store-side release of one live query. Implementations must be idempotent.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self);
}

/// Cancellable handle of one live query. Cloneable; cancelling any clone
/// detaches the subscription. Safe to cancel at any point, including before
/// the first snapshot arrives.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<dyn Unsubscribe>,
}

impl SubscriptionHandle {
    pub fn new(inner: Arc<dyn Unsubscribe>) -> Self {
        Self { inner }
    }

    pub fn cancel(&self) {
        self.inner.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle").finish_non_exhaustive()
    }
}

/// A live query: snapshot stream plus its cancel handle.
#[derive(Debug)]
pub struct LiveQuery {
    pub handle: SubscriptionHandle,
    pub snapshots: Snapshots,
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// The external document database, reduced to the surface the sync
/// components consume.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Replace the whole document, creating it if absent.
    async fn set(&self, collection: &str, id: &str, fields: WriteFields) -> Result<(), StoreError>;

    /// Mutate fields of an existing document.
    async fn update(&self, collection: &str, id: &str, fields: WriteFields) -> Result<(), StoreError>;

    /// Remove a document. Removing an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// One-shot query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Commit a batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Open a live query. Returns immediately; the first snapshot reflects
    /// the state at subscribe time.
    fn subscribe(&self, query: Query) -> LiveQuery;
}

// =============================================================================
// HELPERS
// =============================================================================

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Compare two JSON values of the same scalar kind. `None` for mixed or
/// non-comparable kinds.
pub(crate) fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
