// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock push hub: an in-process fanout standing in for the realtime gateway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use haggle_core::error::HaggleError;
use haggle_core::traits::push::{MessageStream, PushSource, PushSubscription, SubscriptionHandle};
use haggle_core::types::{AccountId, ChatMessage, ConversationId};

type EventSender = mpsc::Sender<Result<ChatMessage, HaggleError>>;

/// A mock push hub.
///
/// Subscriptions are backed by per-subscriber channels; tests inject events
/// with [`publish`](Self::publish) and [`publish_error`](Self::publish_error).
/// Conversation subscribers receive events for their conversation only;
/// account subscribers receive everything, which is how the real gateway
/// behaves for a participant-scope subscription in a single-account test.
/// Dropping the senders via [`disconnect`](Self::disconnect) ends the stream,
/// which subscribers observe as the subscription going away.
pub struct MockPushHub {
    conversations: DashMap<ConversationId, Vec<(SubscriptionHandle, EventSender)>>,
    accounts: DashMap<AccountId, Vec<(SubscriptionHandle, EventSender)>>,
    subscribe_failures: Mutex<VecDeque<HaggleError>>,
    next_handle: AtomicU64,
    unsubscribed: AtomicUsize,
}

impl MockPushHub {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            accounts: DashMap::new(),
            subscribe_failures: Mutex::new(VecDeque::new()),
            next_handle: AtomicU64::new(1),
            unsubscribed: AtomicUsize::new(0),
        }
    }

    /// Make the next subscribe call (either scope) fail with `error`.
    pub async fn fail_next_subscribe(&self, error: HaggleError) {
        self.subscribe_failures.lock().await.push_back(error);
    }

    /// Deliver `message` to subscribers of its conversation and to every
    /// account-scope subscriber.
    pub async fn publish(&self, message: ChatMessage) {
        debug!(conversation = %message.conversation, "hub delivering message");
        let conv_targets = self.senders_for_conversation(&message.conversation);
        let account_targets = self.account_senders();
        for sender in conv_targets.iter().chain(account_targets.iter()) {
            let _ = sender.send(Ok(message.clone())).await;
        }
    }

    /// Deliver a transport error to subscribers of `conversation`.
    pub async fn publish_error(&self, conversation: &ConversationId, message: &str) {
        for sender in self.senders_for_conversation(conversation) {
            let _ = sender
                .send(Err(HaggleError::Transport {
                    message: message.to_string(),
                    source: None,
                }))
                .await;
        }
    }

    /// Drop the server side of every subscription on `conversation`, ending
    /// the streams.
    pub fn disconnect(&self, conversation: &ConversationId) {
        self.conversations.remove(conversation);
    }

    /// Live subscriber count for `conversation`.
    pub fn subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.conversations
            .get(conversation)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// How many unsubscribe calls have been made.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    fn senders_for_conversation(&self, conversation: &ConversationId) -> Vec<EventSender> {
        self.conversations
            .get(conversation)
            .map(|entry| entry.iter().map(|(_, tx)| tx.clone()).collect())
            .unwrap_or_default()
    }

    fn account_senders(&self) -> Vec<EventSender> {
        self.accounts
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|(_, tx)| tx.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn open_channel(&self) -> (SubscriptionHandle, EventSender, MessageStream) {
        let (tx, rx) = mpsc::channel(64);
        let handle =
            SubscriptionHandle(format!("sub-{}", self.next_handle.fetch_add(1, Ordering::SeqCst)));
        let stream: MessageStream = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        (handle, tx, stream)
    }

    async fn take_subscribe_failure(&self) -> Option<HaggleError> {
        self.subscribe_failures.lock().await.pop_front()
    }
}

impl Default for MockPushHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushSource for MockPushHub {
    async fn subscribe(
        &self,
        conversation: &ConversationId,
    ) -> Result<PushSubscription, HaggleError> {
        if let Some(error) = self.take_subscribe_failure().await {
            return Err(error);
        }
        let (handle, tx, stream) = self.open_channel();
        debug!(%conversation, %handle, "hub subscribed");
        self.conversations
            .entry(conversation.clone())
            .or_default()
            .push((handle.clone(), tx));
        Ok(PushSubscription { handle, stream })
    }

    async fn subscribe_account(&self, account: &AccountId) -> Result<PushSubscription, HaggleError> {
        if let Some(error) = self.take_subscribe_failure().await {
            return Err(error);
        }
        let (handle, tx, stream) = self.open_channel();
        debug!(%account, %handle, "hub subscribed account scope");
        self.accounts
            .entry(account.clone())
            .or_default()
            .push((handle.clone(), tx));
        Ok(PushSubscription { handle, stream })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), HaggleError> {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        for mut entry in self.conversations.iter_mut() {
            entry.value_mut().retain(|(h, _)| h != &handle);
        }
        for mut entry in self.accounts.iter_mut() {
            entry.value_mut().retain(|(h, _)| h != &handle);
        }
        debug!(%handle, "hub unsubscribed");
        Ok(())
    }
}
