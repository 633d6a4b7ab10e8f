//! Push notification seam.
//!
//! The full application fans new-message notifications out through a push
//! service. This crate only defines the seam and calls it best-effort after
//! a successful send; delivery is entirely the collaborator's problem.

use async_trait::async_trait;

use crate::model::SenderRole;

/// Failure reported by the push collaborator. Logged, never surfaced.
#[derive(Debug, Clone, thiserror::Error)]
#[error("push notification failed: {0}")]
pub struct NotifyError(pub String);

/// External push-notification service.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    /// Notify the receiving party of a new message in a thread.
    async fn notify_new_message(
        &self,
        apoiado_id: &str,
        recipient: SenderRole,
        preview: &str,
    ) -> Result<(), NotifyError>;
}
