//! Chat thread synchronizer.
//!
//! DESIGN
//! ======
//! One conversation per beneficiary: the apoiado on one side, staff
//! (funcionário or admin) on the other. Messages live in the per-thread
//! collection `apoiados/{id}/mensagens`; the thread summary (last message
//! plus both unread counters) lives on the beneficiary document itself and
//! is maintained inside the same atomic batch as every message write, so
//! counters never drift under concurrent senders.
//!
//! Queries deliberately avoid compound filters (role + seen + ordering)
//! so the backing store never needs a composite index. Mark-as-seen scans
//! a bounded window of recent messages instead; a message older than the
//! window keeps its seen field unset even though the counter resets.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::SyncError;
use crate::listener::{spawn_forward, Listener, ListenerHandle};
use crate::model::{
    ChatMessage, ChatThreadSummary, Sender, SenderRole, FIELD_CLIENT_CREATED_AT, FIELD_CREATED_AT,
    FIELD_LAST_MESSAGE_AT, FIELD_LAST_MESSAGE_ROLE, FIELD_LAST_MESSAGE_TEXT,
    FIELD_SEEN_BY_APOIADO_AT, FIELD_SEEN_BY_FUNCIONARIO_AT, FIELD_SENDER_ID, FIELD_SENDER_NAME,
    FIELD_SENDER_ROLE, FIELD_TEXT, FIELD_UNREAD_FOR_APOIADO, FIELD_UNREAD_FOR_FUNCIONARIO,
};
use crate::notify::PushNotifier;
use crate::store::{
    now_ms, Direction, Document, DocumentStore, FieldOp, FilterOp, Query, WriteBatch, WriteFields,
};

/// Beneficiary records; document key is the apoiado id.
const APOIADOS: &str = "apoiados";

/// Per-thread message collection.
fn messages_collection(apoiado_id: &str) -> String {
    format!("{APOIADOS}/{apoiado_id}/mensagens")
}

/// How many recent messages a mark-as-seen scans. Bounds the batch size and
/// keeps the query free of compound filters.
const SEEN_SCAN_LIMIT: usize = 250;

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// Message delivery and read/unread state for beneficiary threads.
#[derive(Clone)]
pub struct ChatSync {
    store: Arc<dyn DocumentStore>,
    notifier: Option<Arc<dyn PushNotifier>>,
}

impl ChatSync {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, notifier: None }
    }

    /// Attach the push collaborator, invoked best-effort after each send.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn PushNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    // -------------------------------------------------------------------------
    // LISTENERS
    // -------------------------------------------------------------------------

    /// Live ordered view of one thread, ascending by client timestamp.
    ///
    /// The full list is redelivered on every change. A blank id yields an
    /// immediately-empty no-op listener, never an error and never a store
    /// round-trip.
    pub fn listen_messages(&self, apoiado_id: &str) -> Listener<Vec<ChatMessage>> {
        let handle = ListenerHandle::new();
        let (tx, listener) = Listener::new(handle.clone());

        let apoiado_id = apoiado_id.trim();
        if apoiado_id.is_empty() {
            let _ = tx.send(Ok(Vec::new()));
            return listener;
        }

        let query = Query::collection(messages_collection(apoiado_id))
            .order_by(FIELD_CLIENT_CREATED_AT, Direction::Ascending);
        let live = self.store.subscribe(query);
        handle.attach(live.handle.clone());
        spawn_forward(live.snapshots, handle, tx, |docs| Some(decode_messages(&docs)));
        listener
    }

    /// Live boolean: does this beneficiary have unread incoming messages?
    /// Consecutive duplicates are suppressed.
    pub fn listen_has_unread_for_apoiado(&self, apoiado_id: &str) -> Listener<bool> {
        let handle = ListenerHandle::new();
        let (tx, listener) = Listener::new(handle.clone());

        let apoiado_id = apoiado_id.trim();
        if apoiado_id.is_empty() {
            let _ = tx.send(Ok(false));
            return listener;
        }

        let live = self.store.subscribe(Query::doc(APOIADOS, apoiado_id));
        handle.attach(live.handle.clone());
        let mut last = None;
        spawn_forward(live.snapshots, handle, tx, move |docs| {
            let unread = docs
                .first()
                .and_then(|doc| doc.i64_field(FIELD_UNREAD_FOR_APOIADO))
                .unwrap_or(0);
            dedupe(&mut last, unread > 0)
        });
        listener
    }

    /// Live boolean for the global staff badge: does *any* beneficiary have
    /// unread messages for staff? Consecutive duplicates are suppressed.
    pub fn listen_has_unread_for_funcionario(&self) -> Listener<bool> {
        let handle = ListenerHandle::new();
        let (tx, listener) = Listener::new(handle.clone());

        let query =
            Query::collection(APOIADOS).filter(FIELD_UNREAD_FOR_FUNCIONARIO, FilterOp::Gt, 0);
        let live = self.store.subscribe(query);
        handle.attach(live.handle.clone());
        let mut last = None;
        spawn_forward(live.snapshots, handle, tx, move |docs| {
            dedupe(&mut last, !docs.is_empty())
        });
        listener
    }

    /// Live thread overview for the staff inbox: one summary per
    /// beneficiary, most recent message first, ties (and threads with no
    /// message yet, which sort last) broken by case-insensitive name.
    pub fn listen_threads_for_funcionario(&self) -> Listener<Vec<ChatThreadSummary>> {
        let handle = ListenerHandle::new();
        let (tx, listener) = Listener::new(handle.clone());

        let live = self.store.subscribe(Query::collection(APOIADOS));
        handle.attach(live.handle.clone());
        spawn_forward(live.snapshots, handle, tx, |docs| {
            let mut threads: Vec<ChatThreadSummary> = docs
                .iter()
                .filter_map(|doc| {
                    let summary = ChatThreadSummary::from_document(doc);
                    if summary.is_none() {
                        warn!(doc = %doc.id, "skipping undecodable beneficiary document");
                    }
                    summary
                })
                .collect();
            threads.sort_by_key(|thread| {
                (
                    std::cmp::Reverse(thread.last_message_at.unwrap_or(i64::MIN)),
                    thread.apoiado_name.to_lowercase(),
                )
            });
            Some(threads)
        });
        listener
    }

    // -------------------------------------------------------------------------
    // COMMANDS
    // -------------------------------------------------------------------------

    /// Append one message to a beneficiary's thread.
    ///
    /// One atomic batch creates the message document (server timestamp plus
    /// client timestamp, both seen fields explicitly null) and updates the
    /// beneficiary record: last-message summary plus an atomic increment of
    /// the *receiving* party's unread counter. No retry on failure.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the apoiado id or the text is blank after
    /// trimming; store failures pass through.
    pub async fn send_message(
        &self,
        apoiado_id: &str,
        text: &str,
        sender: &Sender,
    ) -> Result<(), SyncError> {
        let apoiado_id = apoiado_id.trim();
        if apoiado_id.is_empty() {
            return Err(SyncError::InvalidArgument("apoiado id must not be blank"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidArgument("message text must not be blank"));
        }

        let message_id = Uuid::new_v4().to_string();
        let client_ts = now_ms();
        let (counter_field, recipient) = if sender.role.is_staff() {
            (FIELD_UNREAD_FOR_APOIADO, SenderRole::Apoiado)
        } else {
            (FIELD_UNREAD_FOR_FUNCIONARIO, SenderRole::Funcionario)
        };

        let message: WriteFields = HashMap::from([
            (FIELD_TEXT.to_string(), FieldOp::Set(json!(text))),
            (FIELD_SENDER_ID.to_string(), FieldOp::Set(json!(sender.id))),
            (FIELD_SENDER_NAME.to_string(), FieldOp::Set(json!(sender.name))),
            (FIELD_SENDER_ROLE.to_string(), FieldOp::Set(json!(sender.role.as_str()))),
            (FIELD_CREATED_AT.to_string(), FieldOp::ServerTimestamp),
            (FIELD_CLIENT_CREATED_AT.to_string(), FieldOp::Set(json!(client_ts))),
            (FIELD_SEEN_BY_APOIADO_AT.to_string(), FieldOp::Set(Value::Null)),
            (FIELD_SEEN_BY_FUNCIONARIO_AT.to_string(), FieldOp::Set(Value::Null)),
        ]);
        let summary: WriteFields = HashMap::from([
            (FIELD_LAST_MESSAGE_TEXT.to_string(), FieldOp::Set(json!(text))),
            (FIELD_LAST_MESSAGE_AT.to_string(), FieldOp::Set(json!(client_ts))),
            (FIELD_LAST_MESSAGE_ROLE.to_string(), FieldOp::Set(json!(sender.role.as_str()))),
            (counter_field.to_string(), FieldOp::Increment(1)),
        ]);

        let mut batch = WriteBatch::new();
        batch.set(&messages_collection(apoiado_id), &message_id, message);
        batch.update(APOIADOS, apoiado_id, summary);
        self.store.commit(batch).await?;

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify_new_message(apoiado_id, recipient, text).await {
                warn!(error = %err, apoiado = apoiado_id, "push notification failed");
            }
        }
        Ok(())
    }

    /// Mark a thread as seen from one party's perspective.
    ///
    /// Scans the most recent 250 messages; each message from
    /// the other party whose seen field is unset gets the server timestamp.
    /// The viewer's unread counter resets to zero in the same atomic batch,
    /// unconditionally, so reopening a quiet thread stays idempotent.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a blank apoiado id; store failures pass through.
    pub async fn mark_thread_as_seen(
        &self,
        apoiado_id: &str,
        viewer_is_apoiado: bool,
    ) -> Result<(), SyncError> {
        let apoiado_id = apoiado_id.trim();
        if apoiado_id.is_empty() {
            return Err(SyncError::InvalidArgument("apoiado id must not be blank"));
        }

        let collection = messages_collection(apoiado_id);
        let query = Query::collection(collection.clone())
            .order_by(FIELD_CLIENT_CREATED_AT, Direction::Descending)
            .limit(SEEN_SCAN_LIMIT);
        let recent = self.store.query(&query).await?;

        let (seen_field, counter_field) = if viewer_is_apoiado {
            (FIELD_SEEN_BY_APOIADO_AT, FIELD_UNREAD_FOR_APOIADO)
        } else {
            (FIELD_SEEN_BY_FUNCIONARIO_AT, FIELD_UNREAD_FOR_FUNCIONARIO)
        };

        let mut batch = WriteBatch::new();
        for doc in &recent {
            if !from_other_party(doc, viewer_is_apoiado) {
                continue;
            }
            let already_seen = doc.fields.get(seen_field).is_some_and(|v| !v.is_null());
            if already_seen {
                continue;
            }
            batch.update(
                &collection,
                &doc.id,
                HashMap::from([(seen_field.to_string(), FieldOp::ServerTimestamp)]),
            );
        }
        batch.update(
            APOIADOS,
            apoiado_id,
            HashMap::from([(counter_field.to_string(), FieldOp::Set(json!(0)))]),
        );
        self.store.commit(batch).await?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn decode_messages(docs: &[Document]) -> Vec<ChatMessage> {
    docs.iter()
        .filter_map(|doc| {
            let message = ChatMessage::from_document(doc);
            if message.is_none() {
                warn!(doc = %doc.id, "skipping undecodable message document");
            }
            message
        })
        .collect()
}

/// Was this message sent by the opposite party of the given viewer?
/// Messages with an unknown role are never marked.
fn from_other_party(doc: &Document, viewer_is_apoiado: bool) -> bool {
    let Some(role) = doc.str_field(FIELD_SENDER_ROLE).and_then(SenderRole::parse) else {
        return false;
    };
    if viewer_is_apoiado { role.is_staff() } else { !role.is_staff() }
}

/// Publish only when the value changed since the last publication.
fn dedupe(last: &mut Option<bool>, value: bool) -> Option<bool> {
    if *last == Some(value) {
        None
    } else {
        *last = Some(value);
        Some(value)
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
