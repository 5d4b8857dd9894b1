// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send service trait: request/response message delivery.

use async_trait::async_trait;

use crate::error::HaggleError;
use crate::types::{ChatMessage, ClientKey, ConversationId, OutboundContent};

/// Write-side service delivering a chat message to a conversation.
///
/// The returned acknowledgement carries the server-assigned message id and
/// echoes the `client_key` of the logical send, which is what lets the
/// engine collapse the acknowledgement onto its optimistic timeline entry.
#[async_trait]
pub trait SendService: Send + Sync + 'static {
    /// Sends a message and returns the acknowledged, id-bearing message.
    async fn send(
        &self,
        conversation: &ConversationId,
        content: OutboundContent,
        client_key: ClientKey,
    ) -> Result<ChatMessage, HaggleError>;
}
