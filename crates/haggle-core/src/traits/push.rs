// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push source trait: the live subscription channel.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::HaggleError;
use crate::types::{AccountId, ChatMessage, ConversationId};

/// Live event stream of a subscription. `Err` items are transport hiccups;
/// the stream ending means the subscription is gone.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<ChatMessage, HaggleError>> + Send>>;

/// Opaque server-side handle identifying one live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub String);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A live subscription: the handle to release it plus its event stream.
pub struct PushSubscription {
    pub handle: SubscriptionHandle,
    pub stream: MessageStream,
}

/// The push/subscribe side of the transport.
#[async_trait]
pub trait PushSource: Send + Sync + 'static {
    /// Subscribes to live events of one conversation.
    async fn subscribe(
        &self,
        conversation: &ConversationId,
    ) -> Result<PushSubscription, HaggleError>;

    /// Subscribes to live events across every conversation the account
    /// participates in. Consumed by the list aggregator.
    async fn subscribe_account(
        &self,
        account: &AccountId,
    ) -> Result<PushSubscription, HaggleError>;

    /// Releases a subscription. Events may still be in flight while this
    /// runs; dropping them is the caller's job.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), HaggleError>;
}
