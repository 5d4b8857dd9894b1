// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read marker trait: best-effort last-read reporting.

use async_trait::async_trait;

use crate::error::HaggleError;
use crate::types::{ConversationId, MessageId};

/// Reports the newest message an account has seen in a conversation.
///
/// Strictly fire-and-forget from the engine's point of view: failures are
/// logged and never surfaced.
#[async_trait]
pub trait ReadMarker: Send + Sync + 'static {
    /// Marks everything up to and including `newest` as read.
    async fn mark_read(
        &self,
        conversation: &ConversationId,
        newest: MessageId,
    ) -> Result<(), HaggleError>;
}
