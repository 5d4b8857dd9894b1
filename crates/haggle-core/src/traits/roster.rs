// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Roster service trait: the account-wide conversation summary list.

use async_trait::async_trait;

use crate::error::HaggleError;
use crate::types::ConversationSummary;

/// Read-side service returning summary rows for every conversation the
/// account participates in. Backs the aggregator's initial load and its
/// full refresh when an unknown conversation shows up on the push stream.
#[async_trait]
pub trait RosterService: Send + Sync + 'static {
    /// Fetches the full summary list for the current account.
    async fn summaries(&self) -> Result<Vec<ConversationSummary>, HaggleError>;
}
