// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account-wide conversation list.
//!
//! One actor maintains summary rows for every conversation the account
//! participates in, fed by a full fetch plus the account-level push
//! stream. Events for a known conversation are spliced into its row;
//! events for an unknown one trigger a full refresh rather than a
//! fabricated row.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use haggle_config::HaggleConfig;
use haggle_core::error::HaggleError;
use haggle_core::traits::push::PushSource;
use haggle_core::traits::roster::RosterService;
use haggle_core::types::{AccountId, ChatMessage, ConversationId, ConversationSummary};

use crate::subscription::{ConversationSubscription, LiveStatus, PushEnvelope, PushEvent};

/// The services the aggregator runs against.
#[derive(Clone)]
pub struct RosterServices {
    pub roster: Arc<dyn RosterService>,
    pub push: Arc<dyn PushSource>,
}

/// Where the summary load currently stands. A failed refresh keeps the
/// last known rows visible.
#[derive(Debug, Clone)]
pub enum RosterPhase {
    Loading,
    Ready,
    Failed(Arc<HaggleError>),
}

/// Immutable view of the conversation list published to observers.
#[derive(Clone)]
pub struct RosterSnapshot {
    /// Rows sorted by last activity, newest first.
    pub summaries: Arc<Vec<ConversationSummary>>,
    pub phase: RosterPhase,
}

/// Handle to the running aggregator actor. Cheap to clone.
#[derive(Clone)]
pub struct ConversationListAggregator {
    commands: mpsc::Sender<RosterCommand>,
    snapshot_rx: watch::Receiver<RosterSnapshot>,
    live_rx: watch::Receiver<LiveStatus>,
    cancel: CancellationToken,
}

impl ConversationListAggregator {
    pub fn spawn(services: RosterServices, config: &HaggleConfig, account: AccountId) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.roster.mailbox_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.roster.mailbox_capacity);
        let (push_tx, push_rx) = mpsc::channel(config.push.stream_buffer);

        let (snapshot_tx, snapshot_rx) = watch::channel(RosterSnapshot {
            summaries: Arc::new(Vec::new()),
            phase: RosterPhase::Loading,
        });
        let (live_tx, live_rx) = watch::channel(LiveStatus::Connecting);

        let cancel = CancellationToken::new();
        let subscription = ConversationSubscription::new(services.push.clone(), push_tx);

        let actor = RosterActor {
            account,
            services,
            summaries: Vec::new(),
            phase: RosterPhase::Loading,
            load_in_flight: false,
            subscription,
            commands: commands_rx,
            events_tx,
            events_rx,
            push_rx,
            snapshot_tx,
            live_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            snapshot_rx,
            live_rx,
            cancel,
        }
    }

    /// Conversation list, re-published on every change.
    pub fn snapshot(&self) -> watch::Receiver<RosterSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn live_status(&self) -> watch::Receiver<LiveStatus> {
        self.live_rx.clone()
    }

    /// Schedule a full summary refresh. Coalesced with one already in
    /// flight.
    pub async fn refresh(&self) -> Result<(), HaggleError> {
        self.commands
            .send(RosterCommand::Refresh)
            .await
            .map_err(|_| HaggleError::Internal("aggregator closed".into()))
    }

    /// Zero the unread count of a conversation the user just opened. The
    /// session's read marker makes it stick server-side.
    pub async fn note_opened(&self, conversation: ConversationId) {
        let _ = self
            .commands
            .send(RosterCommand::NoteOpened(conversation))
            .await;
    }

    /// Shut the aggregator down. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(RosterCommand::Close { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

enum RosterCommand {
    Refresh,
    NoteOpened(ConversationId),
    Close { reply: oneshot::Sender<()> },
}

enum RosterEvent {
    Loaded(Result<Vec<ConversationSummary>, HaggleError>),
}

struct RosterActor {
    account: AccountId,
    services: RosterServices,
    summaries: Vec<ConversationSummary>,
    phase: RosterPhase,
    load_in_flight: bool,
    subscription: ConversationSubscription,
    commands: mpsc::Receiver<RosterCommand>,
    events_tx: mpsc::Sender<RosterEvent>,
    events_rx: mpsc::Receiver<RosterEvent>,
    push_rx: mpsc::Receiver<PushEnvelope>,
    snapshot_tx: watch::Sender<RosterSnapshot>,
    live_tx: watch::Sender<LiveStatus>,
    cancel: CancellationToken,
}

impl RosterActor {
    async fn run(mut self) {
        info!(account = %self.account, "conversation list opening");
        self.spawn_load();
        self.open_subscription().await;

        let mut close_reply = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle_command(command) {
                            close_reply = Some(reply);
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(envelope) = self.push_rx.recv() => self.handle_push(envelope),
                _ = self.cancel.cancelled() => break,
            }
        }

        self.cancel.cancel();
        self.subscription.close().await;
        self.set_live(LiveStatus::Closed);
        info!(account = %self.account, "conversation list closed");
        if let Some(reply) = close_reply {
            let _ = reply.send(());
        }
    }

    async fn open_subscription(&mut self) {
        let cancel = self.cancel.clone();
        let account = self.account.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.subscription.open_account(&account) => result,
        };
        match result {
            Ok(()) => self.set_live(LiveStatus::Live),
            Err(error) => {
                warn!(%error, account = %account, "account subscription failed");
                self.set_live(LiveStatus::Degraded);
            }
        }
    }

    /// Handle one command. Returns the acknowledger of a `Close` command,
    /// which tells the run loop to tear down.
    fn handle_command(&mut self, command: RosterCommand) -> Option<oneshot::Sender<()>> {
        match command {
            RosterCommand::Close { reply } => return Some(reply),
            RosterCommand::Refresh => {
                self.phase = RosterPhase::Loading;
                self.spawn_load();
                self.publish();
            }
            RosterCommand::NoteOpened(conversation) => {
                match self
                    .summaries
                    .iter_mut()
                    .find(|s| s.conversation == conversation)
                {
                    Some(summary) => {
                        summary.unread_count = 0;
                        self.publish();
                    }
                    None => debug!(conversation = %conversation, "note_opened for unknown conversation"),
                }
            }
        }
        None
    }

    fn handle_event(&mut self, event: RosterEvent) {
        match event {
            RosterEvent::Loaded(result) => {
                self.load_in_flight = false;
                match result {
                    Ok(mut summaries) => {
                        sort_summaries(&mut summaries);
                        debug!(rows = summaries.len(), "summary list loaded");
                        self.summaries = summaries;
                        self.phase = RosterPhase::Ready;
                    }
                    Err(error) => {
                        warn!(%error, "summary load failed");
                        self.phase = RosterPhase::Failed(Arc::new(error));
                    }
                }
                self.publish();
            }
        }
    }

    fn handle_push(&mut self, envelope: PushEnvelope) {
        if !self.subscription.accepts(envelope.epoch) {
            debug!(epoch = envelope.epoch, "dropping event from a closed subscription");
            return;
        }
        match envelope.event {
            PushEvent::Message(message) => {
                self.set_live(LiveStatus::Live);
                if splice_summary(&mut self.summaries, &message, &self.account) {
                    sort_summaries(&mut self.summaries);
                } else {
                    debug!(
                        conversation = %message.conversation,
                        "push for unknown conversation, refreshing list"
                    );
                    self.spawn_load();
                }
                self.publish();
            }
            PushEvent::Error(error) => {
                warn!(%error, "account push stream error");
                self.set_live(LiveStatus::Degraded);
            }
            PushEvent::Ended => {
                warn!("account push stream ended unexpectedly");
                self.set_live(LiveStatus::Degraded);
            }
        }
    }

    fn spawn_load(&mut self) {
        if self.load_in_flight {
            debug!("summary refresh already in flight");
            return;
        }
        self.load_in_flight = true;
        let roster = self.services.roster.clone();
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = roster.summaries() => result,
            };
            let _ = tx.send(RosterEvent::Loaded(result)).await;
        });
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(RosterSnapshot {
            summaries: Arc::new(self.summaries.clone()),
            phase: self.phase.clone(),
        });
    }

    fn set_live(&self, status: LiveStatus) {
        if *self.live_tx.borrow() != status {
            debug!(status = %status, account = %self.account, "live status");
            self.live_tx.send_replace(status);
        }
    }
}

/// Fold one push event into the summary row of its conversation. Returns
/// false when the conversation has no row yet.
fn splice_summary(
    summaries: &mut [ConversationSummary],
    message: &ChatMessage,
    me: &AccountId,
) -> bool {
    let Some(summary) = summaries
        .iter_mut()
        .find(|s| s.conversation == message.conversation)
    else {
        return false;
    };
    summary.last_message = Some(message.clone());
    summary.last_activity = message.created_at;
    if &message.created_by != me {
        summary.unread_count += 1;
    }
    true
}

/// Newest activity first. Stable, so rows with equal timestamps keep
/// their relative order.
fn sort_summaries(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
}
