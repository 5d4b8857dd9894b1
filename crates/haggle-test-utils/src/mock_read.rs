// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock read marker that records every report.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use haggle_core::error::HaggleError;
use haggle_core::traits::read::ReadMarker;
use haggle_core::types::{ConversationId, MessageId};

/// A mock read marker. Calls are recorded in order; queued failures are
/// consumed first, one per call (the call is still recorded).
pub struct MockReadMarker {
    marks: Mutex<Vec<(ConversationId, MessageId)>>,
    failures: Mutex<VecDeque<HaggleError>>,
}

impl MockReadMarker {
    pub fn new() -> Self {
        Self {
            marks: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Make the next report fail with `error`.
    pub async fn fail_next(&self, error: HaggleError) {
        self.failures.lock().await.push_back(error);
    }

    /// All recorded reports, in order.
    pub async fn marks(&self) -> Vec<(ConversationId, MessageId)> {
        self.marks.lock().await.clone()
    }

    pub async fn mark_count(&self) -> usize {
        self.marks.lock().await.len()
    }
}

impl Default for MockReadMarker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadMarker for MockReadMarker {
    async fn mark_read(
        &self,
        conversation: &ConversationId,
        newest: MessageId,
    ) -> Result<(), HaggleError> {
        self.marks.lock().await.push((conversation.clone(), newest));
        match self.failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
