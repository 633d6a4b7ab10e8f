//! Domain entities of the Loja Social sync core.
//!
//! All entities are owned by the document store; these types are transient
//! in-memory views decoded from [`Document`] snapshots. Decoding is lenient:
//! a document that fails to decode is skipped by the caller (with a warning),
//! never surfaced as an error to the consumer.

use serde::{Deserialize, Serialize};

use crate::store::Document;

// =============================================================================
// WIRE FIELD NAMES
// =============================================================================

pub(crate) const FIELD_TEXT: &str = "text";
pub(crate) const FIELD_SENDER_ID: &str = "senderId";
pub(crate) const FIELD_SENDER_NAME: &str = "senderName";
pub(crate) const FIELD_SENDER_ROLE: &str = "senderRole";
pub(crate) const FIELD_CREATED_AT: &str = "createdAt";
pub(crate) const FIELD_CLIENT_CREATED_AT: &str = "clientCreatedAt";
pub(crate) const FIELD_SEEN_BY_APOIADO_AT: &str = "seenByApoiadoAt";
pub(crate) const FIELD_SEEN_BY_FUNCIONARIO_AT: &str = "seenByFuncionarioAt";

pub(crate) const FIELD_LAST_MESSAGE_TEXT: &str = "lastMessageText";
pub(crate) const FIELD_LAST_MESSAGE_AT: &str = "lastMessageAt";
pub(crate) const FIELD_LAST_MESSAGE_ROLE: &str = "lastMessageRole";
pub(crate) const FIELD_UNREAD_FOR_APOIADO: &str = "unreadForApoiado";
pub(crate) const FIELD_UNREAD_FOR_FUNCIONARIO: &str = "unreadForFuncionario";

// =============================================================================
// ROLES
// =============================================================================

/// Who sent a message. `Funcionario` and `Admin` are both staff-side; a
/// conversation always has the apoiado on one side and staff on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderRole {
    Apoiado,
    Funcionario,
    Admin,
}

impl SenderRole {
    #[must_use]
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Funcionario | Self::Admin)
    }

    /// Wire representation, matching the serde rename.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apoiado => "APOIADO",
            Self::Funcionario => "FUNCIONARIO",
            Self::Admin => "ADMIN",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "APOIADO" => Some(Self::Apoiado),
            "FUNCIONARIO" => Some(Self::Funcionario),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Identity of the party issuing a `send_message`.
#[derive(Debug, Clone)]
pub struct Sender {
    pub id: String,
    pub name: String,
    pub role: SenderRole,
}

// =============================================================================
// CHAT MESSAGE
// =============================================================================

/// One message of a beneficiary's thread.
///
/// `client_created_at` is authoritative for ordering: the server timestamp
/// is not available synchronously at the moment of a local send, so client
/// time gives immediate, stable append ordering. Cross-device ordering is
/// only as precise as client clocks — a tolerated approximation.
///
/// Immutable except the two seen fields, which transition once from absent
/// to set, each by the opposite party's viewer only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: SenderRole,
    /// Server-assigned, authoritative; absent until the write resolves.
    #[serde(default)]
    pub created_at: Option<i64>,
    pub client_created_at: i64,
    #[serde(default)]
    pub seen_by_apoiado_at: Option<i64>,
    #[serde(default)]
    pub seen_by_funcionario_at: Option<i64>,
}

impl ChatMessage {
    /// Decode from a store document. `None` when required fields are
    /// missing or malformed.
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        let value = serde_json::to_value(&doc.fields).ok()?;
        let mut message: Self = serde_json::from_value(value).ok()?;
        message.id.clone_from(&doc.id);
        Some(message)
    }
}

// =============================================================================
// THREAD SUMMARY
// =============================================================================

/// Per-beneficiary thread aggregate, derived from the beneficiary document.
///
/// Created implicitly with the beneficiary record, updated on every new
/// message and every mark-as-seen, never explicitly deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThreadSummary {
    #[serde(skip)]
    pub apoiado_id: String,
    #[serde(rename = "name", default)]
    pub apoiado_name: String,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<i64>,
    #[serde(default)]
    pub last_message_role: Option<SenderRole>,
    #[serde(default)]
    pub unread_for_apoiado: i64,
    #[serde(default)]
    pub unread_for_funcionario: i64,
}

impl ChatThreadSummary {
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        let value = serde_json::to_value(&doc.fields).ok()?;
        let mut summary: Self = serde_json::from_value(value).ok()?;
        summary.apoiado_id.clone_from(&doc.id);
        Some(summary)
    }
}

// =============================================================================
// CALENDAR
// =============================================================================

/// Which source a calendar event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CampaignStart,
    CampaignEnd,
    ProductExpiry,
    BasketDelivery,
}

/// One entry of the aggregated calendar. Ephemeral: recomputed on every
/// underlying source change, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Source document id, suffixed to disambiguate the start and end
    /// events of the same campaign.
    pub id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub event_type: EventType,
    pub description: Option<String>,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
