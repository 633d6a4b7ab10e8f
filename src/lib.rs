//! Synchronization core of the Loja Social donation-management system.
//!
//! ARCHITECTURE
//! ============
//! Two components sit between the managed document database and the
//! presentation layer:
//!
//! - [`chat::ChatSync`] — ordered message delivery, per-role unread
//!   counters, and seen timestamps for the two-party conversation each
//!   beneficiary ("apoiado") has with staff.
//! - [`calendar::CalendarAggregator`] — merges four independently-updating
//!   live event sources (campaign start/end, product expiry, basket
//!   delivery) into one sorted, continuously-updated list.
//!
//! Both are thin, callback-driven views over [`store::DocumentStore`]: the
//! store pushes full result-set snapshots, the components derive their view
//! and publish it through a cancellable [`Listener`]. Writes go back to the
//! store as atomic batches; the store stays the sole source of truth.

pub mod calendar;
pub mod chat;
pub mod error;
pub mod listener;
pub mod model;
pub mod notify;
pub mod store;

pub use calendar::CalendarAggregator;
pub use chat::ChatSync;
pub use error::SyncError;
pub use listener::{Listener, ListenerHandle};
pub use model::{CalendarEvent, ChatMessage, ChatThreadSummary, EventType, Sender, SenderRole};
