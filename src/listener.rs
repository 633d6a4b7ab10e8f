//! Live view plumbing shared by the sync components.
//!
//! DESIGN
//! ======
//! Every `listen_*` operation hands back a [`Listener`]: the consumer end
//! of a live view, backed by one or more store subscriptions plus a
//! forwarding task. The paired [`ListenerHandle`] owns the underlying
//! subscription handles; cancelling it releases them all, idempotently,
//! from any point in the consumer's lifecycle. After a cancel no further
//! value is observable through `recv`, even if snapshots were already in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::store::{Document, Snapshots, SubscriptionHandle};

// =============================================================================
// HANDLE
// =============================================================================

struct HandleInner {
    cancelled: AtomicBool,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

/// Cloneable cancel handle of a live view.
#[derive(Clone)]
pub struct ListenerHandle {
    inner: Arc<HandleInner>,
}

impl ListenerHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cancelled: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register an underlying store subscription. If the view was already
    /// cancelled the subscription is released on the spot, so a cancel that
    /// races subscription setup never leaks a watcher.
    pub(crate) fn attach(&self, subscription: SubscriptionHandle) {
        let mut subs = self.inner.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.cancelled.load(Ordering::SeqCst) {
            drop(subs);
            subscription.cancel();
        } else {
            subs.push(subscription);
        }
    }

    /// Cancel the view and release every underlying subscription.
    /// Idempotent; every subscription is attempted even if one was already
    /// released elsewhere.
    pub fn cancel(&self) {
        let mut subs = self.inner.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscription in subs.drain(..) {
            subscription.cancel();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// LISTENER
// =============================================================================

/// Consumer end of a live view published by a sync component.
pub struct Listener<T> {
    rx: mpsc::UnboundedReceiver<Result<T, SyncError>>,
    handle: ListenerHandle,
}

impl<T> Listener<T> {
    /// Create a listener plus the sender its forwarding tasks publish to.
    pub(crate) fn new(handle: ListenerHandle) -> (mpsc::UnboundedSender<Result<T, SyncError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, handle })
    }

    /// Await the next published value. `None` once the view has ended or
    /// was cancelled; values queued before a cancel are discarded.
    pub async fn recv(&mut self) -> Option<Result<T, SyncError>> {
        if self.handle.is_cancelled() {
            return None;
        }
        let value = self.rx.recv().await?;
        if self.handle.is_cancelled() {
            return None;
        }
        Some(value)
    }

    /// Cancel this view. Equivalent to `handle().cancel()`.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Detached cancel handle, usable from another task.
    #[must_use]
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }
}

// =============================================================================
// FORWARDING
// =============================================================================

/// Forward store snapshots to a listener through a mapping function.
///
/// `map` returning `None` suppresses that snapshot (used for duplicate
/// elimination). A store error is forwarded once and terminates this
/// subscription, per the error contract. When the consumer drops the
/// listener the task releases the subscriptions and exits.
pub(crate) fn spawn_forward<T, F>(
    mut snapshots: Snapshots,
    handle: ListenerHandle,
    tx: mpsc::UnboundedSender<Result<T, SyncError>>,
    mut map: F,
) where
    T: Send + 'static,
    F: FnMut(Vec<Document>) -> Option<T> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            if handle.is_cancelled() {
                break;
            }
            let out = match snapshot {
                Ok(docs) => match map(docs) {
                    Some(value) => Ok(value),
                    None => continue,
                },
                Err(err) => Err(SyncError::from(err)),
            };
            let is_err = out.is_err();
            if tx.send(out).is_err() {
                handle.cancel();
                break;
            }
            if is_err {
                break;
            }
        }
    });
}

#[cfg(test)]
#[path = "listener_test.rs"]
mod tests;
