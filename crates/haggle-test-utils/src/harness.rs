// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness wiring every mock service into a runnable engine.

use std::sync::Arc;

use tokio::sync::watch;

use haggle_config::HaggleConfig;
use haggle_core::types::{
    AccountId, ConversationId, ConversationSummary, HistoryPage, QuoteId, QuoteState,
    QuoteStateCode,
};
use haggle_sync::roster::{ConversationListAggregator, RosterServices};
use haggle_sync::session::{ConversationSession, SessionIdentity, SessionServices};
use haggle_sync::slot::SessionSlot;

use crate::mock_history::MockHistory;
use crate::mock_push::MockPushHub;
use crate::mock_quote::MockQuoteService;
use crate::mock_read::MockReadMarker;
use crate::mock_roster::MockRoster;
use crate::mock_send::MockSend;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    account: AccountId,
    quote_state: QuoteState,
    history_page: Option<HistoryPage>,
    roster_rows: Vec<ConversationSummary>,
    config: HaggleConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            account: AccountId("me".into()),
            quote_state: QuoteState {
                state_code: QuoteStateCode::Pending,
                version: 1,
                total_amount: 100.0,
            },
            history_page: None,
            roster_rows: Vec::new(),
            config: HaggleConfig::default(),
        }
    }

    /// Set the local account (default `"me"`).
    pub fn with_account(mut self, account: &str) -> Self {
        self.account = AccountId(account.into());
        self
    }

    /// Set the quote state served by the mock quote service (default a
    /// PENDING quote at version 1).
    pub fn with_quote_state(mut self, state: QuoteState) -> Self {
        self.quote_state = state;
        self
    }

    /// Script the first history response.
    pub fn with_history_page(mut self, page: HistoryPage) -> Self {
        self.history_page = Some(page);
        self
    }

    /// Set the standing summary rows served by the mock roster.
    pub fn with_roster_rows(mut self, rows: Vec<ConversationSummary>) -> Self {
        self.roster_rows = rows;
        self
    }

    /// Replace the whole engine config.
    pub fn with_config(mut self, config: HaggleConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorten the send acknowledgement timeout.
    pub fn with_send_timeout_secs(mut self, secs: u64) -> Self {
        self.config.session.send_timeout_secs = secs;
        self
    }

    /// Turn read reporting off.
    pub fn without_mark_read(mut self) -> Self {
        self.config.session.mark_read_enabled = false;
        self
    }

    pub fn build(self) -> TestHarness {
        let history = match self.history_page {
            Some(page) => Arc::new(MockHistory::with_page(page)),
            None => Arc::new(MockHistory::new()),
        };
        TestHarness {
            history,
            send: Arc::new(MockSend::new(self.account.clone())),
            push: Arc::new(MockPushHub::new()),
            quote: Arc::new(MockQuoteService::new(self.quote_state)),
            read: Arc::new(MockReadMarker::new()),
            roster: Arc::new(MockRoster::with_rows(self.roster_rows)),
            config: self.config,
            account: self.account,
        }
    }
}

/// A complete mock backend plus the config to run the engine against it.
///
/// The mocks are exposed directly so tests can script responses and assert
/// on captured calls while an engine built from
/// [`session_services`](Self::session_services) is running.
pub struct TestHarness {
    pub history: Arc<MockHistory>,
    pub send: Arc<MockSend>,
    pub push: Arc<MockPushHub>,
    pub quote: Arc<MockQuoteService>,
    pub read: Arc<MockReadMarker>,
    pub roster: Arc<MockRoster>,
    pub config: HaggleConfig,
    pub account: AccountId,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with all defaults.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn session_services(&self) -> SessionServices {
        SessionServices {
            history: self.history.clone(),
            send: self.send.clone(),
            push: self.push.clone(),
            quote: self.quote.clone(),
            read: self.read.clone(),
        }
    }

    pub fn roster_services(&self) -> RosterServices {
        RosterServices {
            roster: self.roster.clone(),
            push: self.push.clone(),
        }
    }

    pub fn identity(&self, conversation: &str, quote: &str) -> SessionIdentity {
        SessionIdentity {
            conversation: ConversationId(conversation.into()),
            quote: QuoteId(quote.into()),
            account: self.account.clone(),
        }
    }

    /// Spawn a session for `conversation` against the mocks.
    pub fn open_session(&self, conversation: &str, quote: &str) -> ConversationSession {
        ConversationSession::spawn(
            self.session_services(),
            &self.config,
            self.identity(conversation, quote),
        )
    }

    /// A single-session slot over the mocks.
    pub fn slot(&self) -> SessionSlot {
        SessionSlot::new(self.session_services(), self.config.clone(), self.account.clone())
    }

    /// Spawn the conversation list aggregator against the mocks.
    pub fn open_aggregator(&self) -> ConversationListAggregator {
        ConversationListAggregator::spawn(
            self.roster_services(),
            &self.config,
            self.account.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until `predicate` holds on a watch channel, returning the matching
/// value. Panics after two seconds; these channels settle in microseconds
/// when the engine is healthy.
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, mut predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let deadline = std::time::Duration::from_secs(2);
    let outcome = tokio::time::timeout(deadline, async {
        loop {
            {
                let current = rx.borrow();
                if predicate(&current) {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("watch sender dropped while waiting");
            }
        }
    })
    .await;
    match outcome {
        Ok(value) => value,
        Err(_) => panic!("condition not reached within {deadline:?}"),
    }
}
