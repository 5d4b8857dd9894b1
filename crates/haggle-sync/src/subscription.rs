// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push subscription lifecycle owned by a session or roster actor.
//!
//! At most one live subscription per owner. Stream items are forwarded to
//! the owner's mailbox tagged with an epoch; the owner drops envelopes
//! whose epoch no longer matches, which is what guarantees that nothing is
//! delivered after a close returns.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use haggle_core::error::HaggleError;
use haggle_core::traits::push::{MessageStream, PushSource, PushSubscription, SubscriptionHandle};
use haggle_core::types::{AccountId, ChatMessage, ConversationId};

/// Connection health of a session or roster, as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    /// Initial open is still in flight.
    Connecting,
    /// Subscribed and receiving events.
    Live,
    /// The stream failed or ended; history and sends still work, and a
    /// retry must be explicit.
    Degraded,
    Closed,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiveStatus::Connecting => "connecting",
            LiveStatus::Live => "live",
            LiveStatus::Degraded => "degraded",
            LiveStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a subscription is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionTarget {
    Conversation(ConversationId),
    Account(AccountId),
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTarget::Conversation(id) => write!(f, "conversation {id}"),
            SubscriptionTarget::Account(id) => write!(f, "account {id}"),
        }
    }
}

/// One item forwarded from the push stream to the owning actor.
#[derive(Debug)]
pub(crate) struct PushEnvelope {
    pub epoch: u64,
    pub event: PushEvent,
}

#[derive(Debug)]
pub(crate) enum PushEvent {
    Message(ChatMessage),
    /// The stream yielded a transport error but may keep producing.
    Error(HaggleError),
    /// The stream finished on its own.
    Ended,
}

enum SubscriptionState {
    Closed,
    Open {
        target: SubscriptionTarget,
        handle: SubscriptionHandle,
        cancel: CancellationToken,
        forwarder: JoinHandle<()>,
    },
}

pub(crate) struct ConversationSubscription {
    push: Arc<dyn PushSource>,
    forward: mpsc::Sender<PushEnvelope>,
    epoch: u64,
    state: SubscriptionState,
}

impl ConversationSubscription {
    pub(crate) fn new(push: Arc<dyn PushSource>, forward: mpsc::Sender<PushEnvelope>) -> Self {
        Self {
            push,
            forward,
            epoch: 0,
            state: SubscriptionState::Closed,
        }
    }

    /// Subscribe to one conversation's events. An existing subscription to
    /// a different target is closed first; re-opening the current target is
    /// a no-op.
    pub(crate) async fn open(&mut self, conversation: &ConversationId) -> Result<(), HaggleError> {
        let target = SubscriptionTarget::Conversation(conversation.clone());
        if self.is_open_to(&target) {
            return Ok(());
        }
        self.close().await;
        let sub = self.push.subscribe(conversation).await?;
        self.install(target, sub);
        Ok(())
    }

    /// Subscribe to all conversations visible to an account.
    pub(crate) async fn open_account(&mut self, account: &AccountId) -> Result<(), HaggleError> {
        let target = SubscriptionTarget::Account(account.clone());
        if self.is_open_to(&target) {
            return Ok(());
        }
        self.close().await;
        let sub = self.push.subscribe_account(account).await?;
        self.install(target, sub);
        Ok(())
    }

    /// Tear down the live subscription, if any. The forwarder task is
    /// joined before the server-side unsubscribe, so once this returns no
    /// further envelope of the closed epoch will be produced, and
    /// [`accepts`](Self::accepts) rejects any that were already queued.
    pub(crate) async fn close(&mut self) {
        if let SubscriptionState::Open {
            target,
            handle,
            cancel,
            forwarder,
        } = std::mem::replace(&mut self.state, SubscriptionState::Closed)
        {
            cancel.cancel();
            if let Err(error) = forwarder.await {
                debug!(%error, "push forwarder ended abnormally");
            }
            if let Err(error) = self.push.unsubscribe(handle).await {
                warn!(%error, %target, "unsubscribe failed");
            }
            debug!(%target, "subscription closed");
        }
    }

    /// Whether an envelope with this epoch belongs to the live
    /// subscription.
    pub(crate) fn accepts(&self, epoch: u64) -> bool {
        matches!(self.state, SubscriptionState::Open { .. }) && epoch == self.epoch
    }

    fn is_open_to(&self, target: &SubscriptionTarget) -> bool {
        matches!(&self.state, SubscriptionState::Open { target: current, .. } if current == target)
    }

    fn install(&mut self, target: SubscriptionTarget, sub: PushSubscription) {
        self.epoch += 1;
        let cancel = CancellationToken::new();
        let forwarder = tokio::spawn(forward_stream(
            sub.stream,
            self.forward.clone(),
            self.epoch,
            cancel.clone(),
        ));
        debug!(%target, epoch = self.epoch, "subscription open");
        self.state = SubscriptionState::Open {
            target,
            handle: sub.handle,
            cancel,
            forwarder,
        };
    }
}

/// Pump one push stream into the owner's mailbox until cancelled, the
/// stream ends, or the owner goes away. Reserves mailbox capacity before
/// sending so cancellation is never blocked behind a full channel.
async fn forward_stream(
    mut stream: MessageStream,
    tx: mpsc::Sender<PushEnvelope>,
    epoch: u64,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        let event = match item {
            Some(Ok(message)) => PushEvent::Message(message),
            Some(Err(error)) => PushEvent::Error(error),
            None => PushEvent::Ended,
        };
        let last = matches!(event, PushEvent::Ended);
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = tx.reserve() => permit,
        };
        match permit {
            Ok(permit) => permit.send(PushEnvelope { epoch, event }),
            // Owner dropped its receiver; nothing left to forward to.
            Err(_) => return,
        }
        if last {
            return;
        }
    }
}
