// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Haggle workspace: identifiers, chat
//! messages, negotiation records, and quote snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// --- Identifiers ---

/// Unique identifier for a conversation (one per deal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Unique identifier for an account (a conversation participant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// Unique identifier for the quote attached to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

/// Server-assigned message identifier. Monotonic per conversation.
///
/// Absent (`Option::None` at the call sites that carry one) until the server
/// acknowledges the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// Identifier of a change proposal on a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId(pub i64);

/// Identifier of an acceptance handshake on a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcceptanceId(pub i64);

/// Client-generated dedup key, stable across send, acknowledgement, and push
/// echo of the same logical send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientKey(pub Uuid);

impl ClientKey {
    /// Generate a fresh random key for a new local send.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for AcceptanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// --- Messages ---

/// The kind of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    System,
}

/// Negotiation-relevant subtype carried by SYSTEM messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemSubtype {
    ChangeProposed,
    ChangeApplied,
    ChangeAccepted,
    ChangeRejected,
    AcceptanceRequest,
    AcceptanceConfirmed,
    AcceptanceRejected,
    QuoteRejected,
}

/// A single message in a conversation, from any of the three sources
/// (history page, send acknowledgement, push stream).
///
/// `server_id` is `None` until the server has acknowledged the message; at
/// least one of `server_id` / `client_key` is always usable to deduplicate
/// against another representation of the same logical event. Messages are
/// never mutated after admission except to resolve attachments, and never
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub server_id: Option<MessageId>,
    pub conversation: ConversationId,
    pub kind: MessageKind,
    pub system_subtype: Option<SystemSubtype>,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub client_key: Option<ClientKey>,
    pub created_by: AccountId,
    pub created_at: DateTime<Utc>,
    pub attached_change: Option<ChangeProposal>,
    pub attached_acceptance: Option<AcceptanceId>,
}

impl ChatMessage {
    /// The change id referenced by this message, if any.
    pub fn change_id(&self) -> Option<ChangeId> {
        self.attached_change.as_ref().map(|c| c.change_id)
    }
}

/// Content of an outbound send. Media is uploaded elsewhere; only the
/// resulting URL travels through the send path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundContent {
    Text { body: String },
    Image { media_url: String, caption: Option<String> },
}

// --- Negotiation ---

/// Lifecycle status of a change proposal.
///
/// `Applied` and `Rejected` are terminal. `Applied` is reachable either from
/// `Accepted` or directly (a unilateral edit needing no approval).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    Pending,
    Accepted,
    Rejected,
    Applied,
}

impl ChangeStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChangeStatus::Applied | ChangeStatus::Rejected)
    }
}

/// Which quote field a change item edits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeField {
    Quantity,
    ItemAdd,
    ItemRemove,
    TotalPrice,
}

/// One edited field within a change proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub field: ChangeField,
    /// Reference to the quote line the edit targets.
    pub target_ref: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A proposed (or applied) set of changes to the quote.
///
/// Decision messages may carry this with an empty `items` list; the id and
/// status alone are enough to resolve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub change_id: ChangeId,
    pub status: ChangeStatus,
    pub items: Vec<ChangeItem>,
}

/// Lifecycle status of an acceptance handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcceptanceStatus {
    Proposed,
    Confirmed,
    Rejected,
}

impl AcceptanceStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcceptanceStatus::Confirmed | AcceptanceStatus::Rejected)
    }
}

/// An acceptance handshake between the counterparties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceHandshake {
    pub acceptance_id: AcceptanceId,
    pub status: AcceptanceStatus,
}

/// A counterparty decision on a pending change proposal or acceptance
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Decision {
    Accept,
    Reject,
}

// --- Quote ---

/// Lifecycle state of the quote itself, owned by the quote service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStateCode {
    Pending,
    InDeal,
    Waiting,
    Accepted,
    Rejected,
    Closed,
    ClosedUnawarded,
}

impl QuoteStateCode {
    /// Binding states: a local edit requires counterparty approval.
    pub fn is_binding(&self) -> bool {
        matches!(self, QuoteStateCode::Accepted)
    }

    /// Negotiating states: a local edit applies immediately.
    pub fn is_negotiating(&self) -> bool {
        matches!(self, QuoteStateCode::Pending | QuoteStateCode::InDeal)
    }

    /// States in which the quote accepts no further mutations.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            QuoteStateCode::Rejected | QuoteStateCode::Closed | QuoteStateCode::ClosedUnawarded
        )
    }
}

/// Authoritative snapshot of the quote, fetched from the quote service.
///
/// System messages only signal that this should be refetched; the snapshot is
/// never derived locally from message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteState {
    pub state_code: QuoteStateCode,
    /// Optimistic-concurrency token; quote mutations carrying a stale value
    /// fail with a version conflict.
    pub version: u64,
    pub total_amount: f64,
}

// --- History and summaries ---

/// Result of a conversation history load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages in server order.
    pub messages: Vec<ChatMessage>,
    /// Newest message id the server has recorded as read for this account.
    pub last_read: Option<MessageId>,
}

/// Per-conversation summary row maintained by the list aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: ConversationId,
    pub last_message: Option<ChatMessage>,
    pub unread_count: u32,
    /// Timestamp the summary sorts by, descending.
    pub last_activity: DateTime<Utc>,
}
