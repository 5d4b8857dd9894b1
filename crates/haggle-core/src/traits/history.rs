// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History service trait: the initial paginated message fetch.

use async_trait::async_trait;

use crate::error::HaggleError;
use crate::types::{ConversationId, HistoryPage};

/// Read-side service returning the current history page of a conversation
/// together with the server-side last-read marker.
#[async_trait]
pub trait HistoryService: Send + Sync + 'static {
    /// Fetches the history page for a conversation.
    async fn history(&self, conversation: &ConversationId) -> Result<HistoryPage, HaggleError>;
}
