// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock history service with scripted responses and a pause gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use haggle_core::error::HaggleError;
use haggle_core::traits::history::HistoryService;
use haggle_core::types::{ConversationId, HistoryPage};

/// A mock history service.
///
/// Responses are consumed front-to-back from a script; once the script is
/// empty, an empty page is returned. [`pause`](Self::pause) makes the next
/// fetch block until [`release`](Self::release), which is how tests put
/// push events in flight while history is still loading.
pub struct MockHistory {
    script: Mutex<VecDeque<Result<HistoryPage, HaggleError>>>,
    paused: Mutex<bool>,
    resume: Notify,
    calls: AtomicUsize,
}

impl MockHistory {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            paused: Mutex::new(false),
            resume: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock that serves one page and empty pages afterwards.
    pub fn with_page(page: HistoryPage) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Ok(page)])),
            paused: Mutex::new(false),
            resume: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next response.
    pub async fn respond_with(&self, result: Result<HistoryPage, HaggleError>) {
        self.script.lock().await.push_back(result);
    }

    /// Make the next `history()` call block until [`release`](Self::release).
    pub async fn pause(&self) {
        *self.paused.lock().await = true;
    }

    /// Release a paused `history()` call.
    pub async fn release(&self) {
        *self.paused.lock().await = false;
        self.resume.notify_one();
    }

    /// How many times `history()` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryService for MockHistory {
    async fn history(&self, _conversation: &ConversationId) -> Result<HistoryPage, HaggleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            if !*self.paused.lock().await {
                break;
            }
            self.resume.notified().await;
        }
        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(HistoryPage {
                messages: Vec::new(),
                last_read: None,
            }),
        }
    }
}
