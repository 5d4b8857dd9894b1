// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock send service that acknowledges with server-assigned ids.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use haggle_core::error::HaggleError;
use haggle_core::traits::send::SendService;
use haggle_core::types::{
    AccountId, ChatMessage, ClientKey, ConversationId, MessageId, MessageKind, OutboundContent,
};

/// One attempted delivery, recorded whether or not it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SendAttempt {
    pub conversation: ConversationId,
    pub content: OutboundContent,
    pub client_key: ClientKey,
}

/// A mock send service.
///
/// By default every send is acknowledged with the next id from a counter,
/// echoing the content and client key the way the server does. Queued
/// failures (see [`fail_next`](Self::fail_next)) are consumed first, one
/// per attempt. Every attempt is recorded, including failed ones.
pub struct MockSend {
    account: AccountId,
    next_id: AtomicI64,
    failures: Mutex<VecDeque<HaggleError>>,
    attempts: Mutex<Vec<SendAttempt>>,
    paused: Mutex<bool>,
    resume: Notify,
}

impl MockSend {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            next_id: AtomicI64::new(1000),
            failures: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            paused: Mutex::new(false),
            resume: Notify::new(),
        }
    }

    /// Start the id counter at `first` instead of the default 1000.
    pub fn starting_at(account: AccountId, first: i64) -> Self {
        let mock = Self::new(account);
        mock.next_id.store(first, Ordering::SeqCst);
        mock
    }

    /// Make the next attempt fail with `error`.
    pub async fn fail_next(&self, error: HaggleError) {
        self.failures.lock().await.push_back(error);
    }

    /// Hold every attempt after its recording, until [`release`](Self::release).
    /// Lets tests observe the in-flight (`Sending`) window or force the
    /// acknowledgement timeout.
    pub async fn pause(&self) {
        *self.paused.lock().await = true;
    }

    /// Release held attempts.
    pub async fn release(&self) {
        *self.paused.lock().await = false;
        self.resume.notify_waiters();
        self.resume.notify_one();
    }

    /// All recorded attempts, in order.
    pub async fn attempts(&self) -> Vec<SendAttempt> {
        self.attempts.lock().await.clone()
    }

    pub async fn attempt_count(&self) -> usize {
        self.attempts.lock().await.len()
    }

    pub async fn clear_attempts(&self) {
        self.attempts.lock().await.clear();
    }
}

#[async_trait]
impl SendService for MockSend {
    async fn send(
        &self,
        conversation: &ConversationId,
        content: OutboundContent,
        client_key: ClientKey,
    ) -> Result<ChatMessage, HaggleError> {
        self.attempts.lock().await.push(SendAttempt {
            conversation: conversation.clone(),
            content: content.clone(),
            client_key,
        });
        loop {
            if !*self.paused.lock().await {
                break;
            }
            self.resume.notified().await;
        }
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (kind, body, media_url) = match content {
            OutboundContent::Text { body } => (MessageKind::Text, Some(body), None),
            OutboundContent::Image { media_url, caption } => {
                (MessageKind::Image, caption, Some(media_url))
            }
        };
        Ok(ChatMessage {
            server_id: Some(MessageId(id)),
            conversation: conversation.clone(),
            kind,
            system_subtype: None,
            body,
            media_url,
            client_key: Some(client_key),
            created_by: self.account.clone(),
            created_at: Utc::now(),
            attached_change: None,
            attached_acceptance: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> OutboundContent {
        OutboundContent::Text { body: body.into() }
    }

    #[tokio::test]
    async fn acks_echo_key_and_assign_sequential_ids() {
        let mock = MockSend::new(AccountId("me".into()));
        let conv = ConversationId("c".into());
        let key = ClientKey::generate();

        let ack = mock.send(&conv, text("hi"), key).await.unwrap();
        assert_eq!(ack.server_id, Some(MessageId(1000)));
        assert_eq!(ack.client_key, Some(key));
        assert_eq!(ack.body.as_deref(), Some("hi"));

        let ack2 = mock.send(&conv, text("again"), ClientKey::generate()).await.unwrap();
        assert_eq!(ack2.server_id, Some(MessageId(1001)));
    }

    #[tokio::test]
    async fn queued_failure_consumed_then_acks_resume() {
        let mock = MockSend::new(AccountId("me".into()));
        let conv = ConversationId("c".into());
        mock.fail_next(HaggleError::Transport {
            message: "socket reset".into(),
            source: None,
        })
        .await;

        let key = ClientKey::generate();
        assert!(mock.send(&conv, text("lost"), key).await.is_err());
        assert!(mock.send(&conv, text("lost"), key).await.is_ok());

        let attempts = mock.attempts().await;
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].client_key, attempts[1].client_key);
    }

    #[tokio::test]
    async fn image_content_maps_to_media_fields() {
        let mock = MockSend::new(AccountId("me".into()));
        let ack = mock
            .send(
                &ConversationId("c".into()),
                OutboundContent::Image {
                    media_url: "https://cdn/x.jpg".into(),
                    caption: Some("the part".into()),
                },
                ClientKey::generate(),
            )
            .await
            .unwrap();
        assert_eq!(ack.kind, MessageKind::Image);
        assert_eq!(ack.media_url.as_deref(), Some("https://cdn/x.jpg"));
        assert_eq!(ack.body.as_deref(), Some("the part"));
    }
}
