// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quote service trait: authoritative quote state and negotiation actions.
//!
//! Every mutating action materializes server-side as a SYSTEM message on the
//! conversation; the returned change/acceptance id correlates the action with
//! that message once it arrives through history or push. The engine never
//! transitions negotiation state from an action response alone.

use async_trait::async_trait;

use crate::error::HaggleError;
use crate::types::{AcceptanceId, ChangeId, ChangeItem, Decision, QuoteId, QuoteState};

/// Authoritative owner of the quote attached to a conversation.
///
/// Mutations taking a `version` fail with [`HaggleError::VersionConflict`]
/// when the token is stale; callers refetch the snapshot before retrying.
#[async_trait]
pub trait QuoteService: Send + Sync + 'static {
    /// Fetches the current authoritative quote snapshot.
    async fn snapshot(&self, quote: &QuoteId) -> Result<QuoteState, HaggleError>;

    /// Proposes a change that needs counterparty approval.
    async fn propose_change(
        &self,
        quote: &QuoteId,
        items: Vec<ChangeItem>,
        version: u64,
    ) -> Result<ChangeId, HaggleError>;

    /// Applies a change immediately, without approval.
    async fn apply_change(
        &self,
        quote: &QuoteId,
        items: Vec<ChangeItem>,
        version: u64,
    ) -> Result<ChangeId, HaggleError>;

    /// Accepts or rejects a pending change proposed by the counterparty.
    async fn decide_change(
        &self,
        quote: &QuoteId,
        change: ChangeId,
        decision: Decision,
    ) -> Result<ChangeId, HaggleError>;

    /// Opens an acceptance handshake on the quote.
    async fn propose_acceptance(
        &self,
        quote: &QuoteId,
        version: u64,
    ) -> Result<AcceptanceId, HaggleError>;

    /// Confirms a pending acceptance handshake.
    async fn confirm_acceptance(
        &self,
        quote: &QuoteId,
        acceptance: AcceptanceId,
    ) -> Result<AcceptanceId, HaggleError>;

    /// Rejects a pending acceptance handshake.
    async fn reject_acceptance(
        &self,
        quote: &QuoteId,
        acceptance: AcceptanceId,
    ) -> Result<AcceptanceId, HaggleError>;

    /// Rejects the quote outright, closing the negotiation.
    async fn reject_quote(&self, quote: &QuoteId) -> Result<(), HaggleError>;
}
