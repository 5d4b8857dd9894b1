// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock roster service serving scripted summary lists.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use haggle_core::error::HaggleError;
use haggle_core::traits::roster::RosterService;
use haggle_core::types::ConversationSummary;

/// A mock roster service.
///
/// Scripted responses are consumed front-to-back; once the script is empty,
/// the standing row set (see [`set_rows`](Self::set_rows)) is served.
pub struct MockRoster {
    script: Mutex<VecDeque<Result<Vec<ConversationSummary>, HaggleError>>>,
    rows: Mutex<Vec<ConversationSummary>>,
    calls: AtomicUsize,
}

impl MockRoster {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            rows: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(rows: Vec<ConversationSummary>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            rows: Mutex::new(rows),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next response ahead of the standing rows.
    pub async fn respond_with(&self, result: Result<Vec<ConversationSummary>, HaggleError>) {
        self.script.lock().await.push_back(result);
    }

    /// Replace the standing row set served once the script is exhausted.
    pub async fn set_rows(&self, rows: Vec<ConversationSummary>) {
        *self.rows.lock().await = rows;
    }

    /// How many times `summaries()` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRoster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RosterService for MockRoster {
    async fn summaries(&self) -> Result<Vec<ConversationSummary>, HaggleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(self.rows.lock().await.clone()),
        }
    }
}
