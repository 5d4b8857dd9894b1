// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable event identity for messages arriving from any of the three
//! sources (history page, send acknowledgement, push stream).
//!
//! A message is registered under every key derivable from it; two
//! representations describe the same logical event when ANY of their keys
//! collide. This is what lets a push echo that raced ahead of its send
//! acknowledgement collapse onto the optimistic entry, and the late
//! acknowledgement collapse onto both.

use chrono::{DateTime, Utc};

use haggle_core::types::{
    AcceptanceId, AccountId, ChangeId, ChatMessage, ClientKey, ConversationId, MessageId,
    SystemSubtype,
};

/// One deduplication key of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Server-assigned id. Authoritative once present.
    Server(MessageId),
    /// Client dedup key, stable across send, ack, and push echo.
    Client(ClientKey),
    /// Content-derived fallback for events that carry neither id nor client
    /// key yet.
    Composite(CompositeKey),
}

/// Composite identity: what the acknowledgement of the same logical event
/// will eventually carry, computed from fields present in every
/// representation.
///
/// Two distinct real messages by the same author in the same conversation
/// with identical timestamp and content are indistinguishable under this
/// key. That collision is a known limitation of the identity scheme and is
/// deliberately preserved, not papered over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub conversation: ConversationId,
    pub created_at: DateTime<Utc>,
    pub author: AccountId,
    pub marker: CompositeMarker,
}

/// The content discriminator of a [`CompositeKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompositeMarker {
    /// System messages are discriminated by subtype and the negotiation ids
    /// they reference.
    System {
        subtype: SystemSubtype,
        change: Option<ChangeId>,
        acceptance: Option<AcceptanceId>,
    },
    /// Content messages are discriminated by body text (the caption, for
    /// images).
    Content { body: Option<String> },
}

/// Every key the message can be recognized under.
///
/// Order is most-authoritative first; callers treat the set as unordered.
pub fn keys_for(message: &ChatMessage) -> Vec<EventKey> {
    let mut keys = Vec::with_capacity(3);
    if let Some(id) = message.server_id {
        keys.push(EventKey::Server(id));
    }
    if let Some(client_key) = message.client_key {
        keys.push(EventKey::Client(client_key));
    }
    keys.push(EventKey::Composite(composite_key(message)));
    keys
}

fn composite_key(message: &ChatMessage) -> CompositeKey {
    let marker = match message.system_subtype {
        Some(subtype) => CompositeMarker::System {
            subtype,
            change: message.change_id(),
            acceptance: message.attached_acceptance,
        },
        None => CompositeMarker::Content {
            body: message.body.clone(),
        },
    };
    CompositeKey {
        conversation: message.conversation.clone(),
        created_at: message.created_at,
        author: message.created_by.clone(),
        marker,
    }
}
