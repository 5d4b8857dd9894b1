// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock quote service with a scriptable snapshot and full call capture.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use haggle_core::error::HaggleError;
use haggle_core::traits::quote::QuoteService;
use haggle_core::types::{
    AcceptanceId, ChangeId, ChangeItem, Decision, QuoteId, QuoteState,
};

/// One mutating call made against the mock, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteCall {
    ProposeChange { items: Vec<ChangeItem>, version: u64 },
    ApplyChange { items: Vec<ChangeItem>, version: u64 },
    DecideChange { change: ChangeId, decision: Decision },
    ProposeAcceptance { version: u64 },
    ConfirmAcceptance { acceptance: AcceptanceId },
    RejectAcceptance { acceptance: AcceptanceId },
    RejectQuote,
}

/// A mock quote service.
///
/// `snapshot()` returns the current scripted state; the state only moves via
/// [`set_state`](Self::set_state), never as a side effect of a mutation, so
/// tests script server-side transitions explicitly. Mutations taking a
/// version fail with [`HaggleError::VersionConflict`] when it does not match
/// the scripted state, allocate ids from counters otherwise, and are all
/// recorded. Queued failures are consumed by the next mutating call.
pub struct MockQuoteService {
    state: Mutex<QuoteState>,
    snapshots: AtomicUsize,
    next_change: AtomicI64,
    next_acceptance: AtomicI64,
    failures: Mutex<VecDeque<HaggleError>>,
    snapshot_failures: Mutex<VecDeque<HaggleError>>,
    calls: Mutex<Vec<QuoteCall>>,
}

impl MockQuoteService {
    pub fn new(initial: QuoteState) -> Self {
        Self {
            state: Mutex::new(initial),
            snapshots: AtomicUsize::new(0),
            next_change: AtomicI64::new(500),
            next_acceptance: AtomicI64::new(800),
            failures: Mutex::new(VecDeque::new()),
            snapshot_failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the scripted snapshot, simulating a server-side transition.
    pub async fn set_state(&self, state: QuoteState) {
        *self.state.lock().await = state;
    }

    /// Make the next mutating call fail with `error`.
    pub async fn fail_next(&self, error: HaggleError) {
        self.failures.lock().await.push_back(error);
    }

    /// Make the next `snapshot()` call fail with `error`.
    pub async fn fail_next_snapshot(&self, error: HaggleError) {
        self.snapshot_failures.lock().await.push_back(error);
    }

    /// How many times `snapshot()` was called.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    /// All recorded mutating calls, in order.
    pub async fn calls(&self) -> Vec<QuoteCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: QuoteCall) -> Result<(), HaggleError> {
        self.calls.lock().await.push(call);
        match self.failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn check_version(&self, quote: &QuoteId, version: u64) -> Result<(), HaggleError> {
        let current = self.state.lock().await.version;
        if version != current {
            return Err(HaggleError::VersionConflict {
                quote: quote.0.clone(),
                stale: version,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteService for MockQuoteService {
    async fn snapshot(&self, _quote: &QuoteId) -> Result<QuoteState, HaggleError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.snapshot_failures.lock().await.pop_front() {
            return Err(error);
        }
        Ok(self.state.lock().await.clone())
    }

    async fn propose_change(
        &self,
        quote: &QuoteId,
        items: Vec<ChangeItem>,
        version: u64,
    ) -> Result<ChangeId, HaggleError> {
        self.record(QuoteCall::ProposeChange {
            items,
            version,
        })
        .await?;
        self.check_version(quote, version).await?;
        Ok(ChangeId(self.next_change.fetch_add(1, Ordering::SeqCst)))
    }

    async fn apply_change(
        &self,
        quote: &QuoteId,
        items: Vec<ChangeItem>,
        version: u64,
    ) -> Result<ChangeId, HaggleError> {
        self.record(QuoteCall::ApplyChange {
            items,
            version,
        })
        .await?;
        self.check_version(quote, version).await?;
        Ok(ChangeId(self.next_change.fetch_add(1, Ordering::SeqCst)))
    }

    async fn decide_change(
        &self,
        _quote: &QuoteId,
        change: ChangeId,
        decision: Decision,
    ) -> Result<ChangeId, HaggleError> {
        self.record(QuoteCall::DecideChange { change, decision }).await?;
        Ok(change)
    }

    async fn propose_acceptance(
        &self,
        quote: &QuoteId,
        version: u64,
    ) -> Result<AcceptanceId, HaggleError> {
        self.record(QuoteCall::ProposeAcceptance { version }).await?;
        self.check_version(quote, version).await?;
        Ok(AcceptanceId(
            self.next_acceptance.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn confirm_acceptance(
        &self,
        _quote: &QuoteId,
        acceptance: AcceptanceId,
    ) -> Result<AcceptanceId, HaggleError> {
        self.record(QuoteCall::ConfirmAcceptance { acceptance }).await?;
        Ok(acceptance)
    }

    async fn reject_acceptance(
        &self,
        _quote: &QuoteId,
        acceptance: AcceptanceId,
    ) -> Result<AcceptanceId, HaggleError> {
        self.record(QuoteCall::RejectAcceptance { acceptance }).await?;
        Ok(acceptance)
    }

    async fn reject_quote(&self, _quote: &QuoteId) -> Result<(), HaggleError> {
        self.record(QuoteCall::RejectQuote).await
    }
}
