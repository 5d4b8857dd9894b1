// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation session actor.
//!
//! One actor owns everything mutable about an open conversation: the
//! merged timeline, the negotiation engine, and the push subscription.
//! The public [`ConversationSession`] handle talks to it over a command
//! mailbox and observes it through watch channels, so callers never share
//! state with the actor directly.
//!
//! On open, the history fetch and the subscription are started
//! concurrently; push events that race ahead of the history page are
//! buffered by the merger. Sends are optimistic: the draft is visible
//! immediately and upgraded in place when the acknowledgement or its push
//! echo arrives, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use haggle_config::HaggleConfig;
use haggle_core::error::HaggleError;
use haggle_core::traits::history::HistoryService;
use haggle_core::traits::push::PushSource;
use haggle_core::traits::quote::QuoteService;
use haggle_core::traits::read::ReadMarker;
use haggle_core::traits::send::SendService;
use haggle_core::types::{
    AcceptanceId, AccountId, ChangeId, ChangeItem, ChatMessage, ClientKey, ConversationId,
    Decision, HistoryPage, MessageId, MessageKind, OutboundContent, QuoteId, QuoteState,
};

use crate::negotiation::{self, EditRoute, NegotiationEngine, NegotiationSnapshot};
use crate::subscription::{ConversationSubscription, LiveStatus, PushEnvelope, PushEvent};
use crate::timeline::{Admission, TimelineMerger, TimelineSnapshot};

/// Who and what a session is for.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub conversation: ConversationId,
    /// The quote negotiated over this conversation.
    pub quote: QuoteId,
    /// The local account, used for send attribution and response
    /// permission checks.
    pub account: AccountId,
}

/// The service implementations a session runs against.
#[derive(Clone)]
pub struct SessionServices {
    pub history: Arc<dyn HistoryService>,
    pub send: Arc<dyn SendService>,
    pub push: Arc<dyn PushSource>,
    pub quote: Arc<dyn QuoteService>,
    pub read: Arc<dyn ReadMarker>,
}

/// Handle to a running session actor.
///
/// Cheap to clone; the actor lives until [`close`](Self::close) is called
/// or every handle is dropped.
#[derive(Clone)]
pub struct ConversationSession {
    conversation: ConversationId,
    commands: mpsc::Sender<SessionCommand>,
    timeline_rx: watch::Receiver<TimelineSnapshot>,
    negotiation_rx: watch::Receiver<NegotiationSnapshot>,
    live_rx: watch::Receiver<LiveStatus>,
    cancel: CancellationToken,
}

impl ConversationSession {
    /// Spawn the actor and kick off the open sequence: history fetch and
    /// push subscription start concurrently.
    pub fn spawn(
        services: SessionServices,
        config: &HaggleConfig,
        identity: SessionIdentity,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.session.mailbox_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.session.mailbox_capacity);
        let (push_tx, push_rx) = mpsc::channel(config.push.stream_buffer);

        let merger = TimelineMerger::new();
        let engine = NegotiationEngine::new(identity.account.clone());
        let (timeline_tx, timeline_rx) = watch::channel(merger.snapshot());
        let (negotiation_tx, negotiation_rx) = watch::channel(engine.snapshot());
        let (live_tx, live_rx) = watch::channel(LiveStatus::Connecting);

        let cancel = CancellationToken::new();
        let subscription = ConversationSubscription::new(services.push.clone(), push_tx);
        let conversation = identity.conversation.clone();

        let actor = SessionActor {
            identity,
            services,
            send_timeout: Duration::from_secs(config.session.send_timeout_secs),
            mark_read_enabled: config.session.mark_read_enabled,
            merger,
            engine,
            subscription,
            commands: commands_rx,
            events_tx,
            events_rx,
            push_rx,
            timeline_tx,
            negotiation_tx,
            live_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            conversation,
            commands: commands_tx,
            timeline_rx,
            negotiation_rx,
            live_rx,
            cancel,
        }
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Merged timeline, updated on every admission.
    pub fn timeline(&self) -> watch::Receiver<TimelineSnapshot> {
        self.timeline_rx.clone()
    }

    /// Negotiation state, updated when an admitted system message moves it
    /// or a quote refresh lands.
    pub fn negotiation(&self) -> watch::Receiver<NegotiationSnapshot> {
        self.negotiation_rx.clone()
    }

    pub fn live_status(&self) -> watch::Receiver<LiveStatus> {
        self.live_rx.clone()
    }

    /// Send a text message. Resolves once the server acknowledges it; the
    /// optimistic entry is visible on the timeline long before that.
    pub async fn send_text(&self, body: String) -> Result<MessageId, HaggleError> {
        self.send(OutboundContent::Text { body }).await
    }

    /// Send an image by its uploaded media url, with an optional caption.
    pub async fn send_image(
        &self,
        media_url: String,
        caption: Option<String>,
    ) -> Result<MessageId, HaggleError> {
        self.send(OutboundContent::Image { media_url, caption }).await
    }

    pub async fn send(&self, content: OutboundContent) -> Result<MessageId, HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Send { content, reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Re-issue a failed send under its original client key. The server
    /// deduplicates if the first attempt actually landed.
    pub async fn retry_send(&self, key: ClientKey) -> Result<MessageId, HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::RetrySend { key, reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Re-issue the history fetch after a failure. The outcome lands in
    /// the timeline phase.
    pub async fn retry_history(&self) -> Result<(), HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::RetryHistory { reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Edit the quote. Routed to a proposal or a direct application based
    /// on a fresh snapshot of the quote state.
    pub async fn edit_quote(&self, items: Vec<ChangeItem>) -> Result<ChangeId, HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::EditQuote { items, reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Accept or reject a change the counterparty proposed.
    pub async fn decide_change(
        &self,
        change: ChangeId,
        decision: Decision,
    ) -> Result<(), HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::DecideChange {
            change,
            decision,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Open an acceptance handshake on the quote.
    pub async fn request_acceptance(&self) -> Result<AcceptanceId, HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::RequestAcceptance { reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Confirm or reject an acceptance handshake the counterparty
    /// requested.
    pub async fn decide_acceptance(
        &self,
        acceptance: AcceptanceId,
        decision: Decision,
    ) -> Result<(), HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::DecideAcceptance {
            acceptance,
            decision,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Walk away from the quote entirely.
    pub async fn reject_quote(&self) -> Result<(), HaggleError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::RejectQuote { reply: tx }).await?;
        rx.await.map_err(|_| closed_error())?
    }

    /// Close the session. Cancels in-flight work, tears the subscription
    /// down, and returns only once no further event can reach the
    /// timeline. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Close { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn command(&self, command: SessionCommand) -> Result<(), HaggleError> {
        self.commands.send(command).await.map_err(|_| closed_error())
    }
}

fn closed_error() -> HaggleError {
    HaggleError::Internal("session closed".into())
}

enum SessionCommand {
    Send {
        content: OutboundContent,
        reply: oneshot::Sender<Result<MessageId, HaggleError>>,
    },
    RetrySend {
        key: ClientKey,
        reply: oneshot::Sender<Result<MessageId, HaggleError>>,
    },
    RetryHistory {
        reply: oneshot::Sender<Result<(), HaggleError>>,
    },
    EditQuote {
        items: Vec<ChangeItem>,
        reply: oneshot::Sender<Result<ChangeId, HaggleError>>,
    },
    DecideChange {
        change: ChangeId,
        decision: Decision,
        reply: oneshot::Sender<Result<(), HaggleError>>,
    },
    RequestAcceptance {
        reply: oneshot::Sender<Result<AcceptanceId, HaggleError>>,
    },
    DecideAcceptance {
        acceptance: AcceptanceId,
        decision: Decision,
        reply: oneshot::Sender<Result<(), HaggleError>>,
    },
    RejectQuote {
        reply: oneshot::Sender<Result<(), HaggleError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

enum SessionEvent {
    HistoryLoaded(Result<HistoryPage, HaggleError>),
    SendSettled {
        key: ClientKey,
        result: Result<ChatMessage, HaggleError>,
        reply: oneshot::Sender<Result<MessageId, HaggleError>>,
    },
    QuoteRefreshed(Result<QuoteState, HaggleError>),
}

struct SessionActor {
    identity: SessionIdentity,
    services: SessionServices,
    send_timeout: Duration,
    mark_read_enabled: bool,
    merger: TimelineMerger,
    engine: NegotiationEngine,
    subscription: ConversationSubscription,
    commands: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    push_rx: mpsc::Receiver<PushEnvelope>,
    timeline_tx: watch::Sender<TimelineSnapshot>,
    negotiation_tx: watch::Sender<NegotiationSnapshot>,
    live_tx: watch::Sender<LiveStatus>,
    cancel: CancellationToken,
}

impl SessionActor {
    async fn run(mut self) {
        info!(conversation = %self.identity.conversation, "session opening");
        self.spawn_history();
        self.open_subscription().await;

        let mut close_reply = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle_command(command).await {
                            close_reply = Some(reply);
                            break;
                        }
                    }
                    // Every handle dropped: shut down as if closed.
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
        info!(conversation = %self.identity.conversation, "session closed");
        if let Some(reply) = close_reply {
            let _ = reply.send(());
        }
    }

    /// Open the push subscription, unless the session was cancelled while
    /// it was still in flight.
    async fn open_subscription(&mut self) {
        let cancel = self.cancel.clone();
        let conversation = self.identity.conversation.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.subscription.open(&conversation) => result,
        };
        match result {
            Ok(()) => self.set_live(LiveStatus::Live),
            Err(error) => {
                warn!(%error, conversation = %conversation, "subscription open failed");
                self.set_live(LiveStatus::Degraded);
            }
        }
    }

    /// Handle one command. Returns the acknowledger of a `Close` command,
    /// which tells the run loop to tear down.
    async fn handle_command(&mut self, command: SessionCommand) -> Option<oneshot::Sender<()>> {
        match command {
            SessionCommand::Close { reply } => return Some(reply),
            SessionCommand::Send { content, reply } => {
                let key = ClientKey::generate();
                let draft = draft_message(&self.identity, &content, key);
                self.merger.insert_optimistic(draft);
                self.publish_timeline();
                debug!(client_key = %key, "optimistic entry inserted");
                self.spawn_send(content, key, reply);
            }
            SessionCommand::RetrySend { key, reply } => {
                let Some(message) = self.merger.message_for(key) else {
                    let _ = reply.send(Err(HaggleError::NotFound {
                        what: "failed send".into(),
                        id: key.to_string(),
                    }));
                    return None;
                };
                let Some(content) = outbound_of(message) else {
                    let _ = reply.send(Err(HaggleError::InvalidPayload {
                        message: format!("entry {key} cannot be re-sent"),
                    }));
                    return None;
                };
                if !self.merger.mark_sending(key) {
                    let _ = reply.send(Err(HaggleError::InvalidPayload {
                        message: format!("send {key} is not in a failed state"),
                    }));
                    return None;
                }
                self.publish_timeline();
                debug!(client_key = %key, "retrying send");
                self.spawn_send(content, key, reply);
            }
            SessionCommand::RetryHistory { reply } => {
                if self.merger.phase().is_failed() {
                    self.merger.set_loading();
                    self.publish_timeline();
                    self.spawn_history();
                }
                let _ = reply.send(Ok(()));
            }
            SessionCommand::EditQuote { items, reply } => {
                let result = self.edit_quote(items).await;
                let _ = reply.send(result);
            }
            SessionCommand::DecideChange {
                change,
                decision,
                reply,
            } => {
                let result = match self.engine.check_change_response(change) {
                    Ok(()) => self
                        .services
                        .quote
                        .decide_change(&self.identity.quote, change, decision)
                        .await
                        .map(|_| ()),
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            SessionCommand::RequestAcceptance { reply } => {
                let result = self.request_acceptance().await;
                let _ = reply.send(result);
            }
            SessionCommand::DecideAcceptance {
                acceptance,
                decision,
                reply,
            } => {
                let result = match self.engine.check_acceptance_response(acceptance) {
                    Ok(()) => {
                        let call = match decision {
                            Decision::Accept => {
                                self.services
                                    .quote
                                    .confirm_acceptance(&self.identity.quote, acceptance)
                                    .await
                            }
                            Decision::Reject => {
                                self.services
                                    .quote
                                    .reject_acceptance(&self.identity.quote, acceptance)
                                    .await
                            }
                        };
                        call.map(|_| ())
                    }
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            SessionCommand::RejectQuote { reply } => {
                let result = self.services.quote.reject_quote(&self.identity.quote).await;
                let _ = reply.send(result);
            }
        }
        None
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::HistoryLoaded(result) => {
                let appended = match result {
                    Ok(page) => {
                        debug!(messages = page.messages.len(), "history page applied");
                        self.merger.admit_history(page)
                    }
                    Err(error) => {
                        warn!(%error, "history load failed");
                        self.merger.history_failed(error)
                    }
                };
                self.observe_admitted(&appended);
                self.maybe_mark_read();
                self.publish_timeline();
            }
            SessionEvent::SendSettled { key, result, reply } => {
                let outcome = self.settle_send(key, result);
                self.publish_timeline();
                let _ = reply.send(outcome);
            }
            SessionEvent::QuoteRefreshed(result) => match result {
                Ok(snapshot) => {
                    debug!(
                        state = %snapshot.state_code,
                        version = snapshot.version,
                        "quote snapshot refreshed"
                    );
                    self.engine.store_quote(snapshot);
                    self.publish_negotiation();
                }
                // The next trigger refetches; the stale snapshot stays.
                Err(error) => warn!(%error, "quote refresh failed"),
            },
        }
    }

    fn settle_send(
        &mut self,
        key: ClientKey,
        result: Result<ChatMessage, HaggleError>,
    ) -> Result<MessageId, HaggleError> {
        match result {
            Ok(ack) => match ack.server_id {
                Some(id) => {
                    if self.merger.admit_send(ack.clone()) == Admission::Inserted {
                        self.observe_admitted(std::slice::from_ref(&ack));
                    }
                    Ok(id)
                }
                None => {
                    warn!(client_key = %key, "acknowledgement missing server id");
                    self.merger.mark_send_failed(key);
                    Err(HaggleError::InvalidPayload {
                        message: "acknowledgement carried no message id".into(),
                    })
                }
            },
            Err(error) => {
                warn!(%error, client_key = %key, "send failed");
                self.merger.mark_send_failed(key);
                Err(error)
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
                match self.merger.admit_push(message.clone()) {
                    Admission::Inserted => {
                        self.observe_admitted(std::slice::from_ref(&message));
                        self.publish_timeline();
                    }
                    Admission::Upgraded => self.publish_timeline(),
                    Admission::Duplicate | Admission::Buffered => {}
                }
            }
            PushEvent::Error(error) => {
                warn!(%error, "push stream error");
                self.set_live(LiveStatus::Degraded);
            }
            PushEvent::Ended => {
                warn!("push stream ended unexpectedly");
                self.set_live(LiveStatus::Degraded);
            }
        }
    }

    /// Run newly inserted messages past the negotiation engine. Refresh
    /// triggers within one batch coalesce into a single refetch.
    fn observe_admitted(&mut self, appended: &[ChatMessage]) {
        let mut changed = false;
        let mut refresh = false;
        for message in appended {
            let outcome = self.engine.observe(message);
            changed |= outcome.changed;
            refresh |= outcome.refresh;
        }
        if refresh {
            self.spawn_quote_refresh();
        }
        if changed {
            self.publish_negotiation();
        }
    }

    /// Report the read marker if the server thinks we are behind. Failures
    /// are logged and swallowed; the marker is advanced locally first so
    /// the report fires at most once per history load.
    fn maybe_mark_read(&mut self) {
        if !self.mark_read_enabled || !self.merger.phase().is_ready() {
            return;
        }
        let Some(newest) = self.merger.newest_server_id() else {
            return;
        };
        if self.merger.last_read().is_some_and(|last| last >= newest) {
            return;
        }
        self.merger.note_read(newest);
        debug!(newest = %newest, "reporting read marker");
        let read = self.services.read.clone();
        let conversation = self.identity.conversation.clone();
        tokio::spawn(async move {
            if let Err(error) = read.mark_read(&conversation, newest).await {
                warn!(%error, conversation = %conversation, "mark-read failed");
            }
        });
    }

    fn spawn_history(&self) {
        let history = self.services.history.clone();
        let conversation = self.identity.conversation.clone();
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = history.history(&conversation) => result,
            };
            let _ = tx.send(SessionEvent::HistoryLoaded(result)).await;
        });
    }

    fn spawn_send(
        &self,
        content: OutboundContent,
        key: ClientKey,
        reply: oneshot::Sender<Result<MessageId, HaggleError>>,
    ) {
        let send = self.services.send.clone();
        let conversation = self.identity.conversation.clone();
        let timeout = self.send_timeout;
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(timeout, send.send(&conversation, content, key)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(HaggleError::Timeout { duration: timeout }),
                    }
                }
            };
            let _ = tx.send(SessionEvent::SendSettled { key, result, reply }).await;
        });
    }

    fn spawn_quote_refresh(&self) {
        let quote_service = self.services.quote.clone();
        let quote = self.identity.quote.clone();
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = quote_service.snapshot(&quote) => result,
            };
            let _ = tx.send(SessionEvent::QuoteRefreshed(result)).await;
        });
    }

    async fn edit_quote(&mut self, items: Vec<ChangeItem>) -> Result<ChangeId, HaggleError> {
        let quote_id = self.identity.quote.clone();
        let snapshot = self.services.quote.snapshot(&quote_id).await?;
        self.engine.store_quote(snapshot.clone());
        self.publish_negotiation();
        let route = negotiation::edit_route(&snapshot)?;
        debug!(route = ?route, version = snapshot.version, "quote edit routed");
        match route {
            EditRoute::Propose => {
                self.services
                    .quote
                    .propose_change(&quote_id, items, snapshot.version)
                    .await
            }
            EditRoute::Apply => {
                self.services
                    .quote
                    .apply_change(&quote_id, items, snapshot.version)
                    .await
            }
        }
    }

    async fn request_acceptance(&mut self) -> Result<AcceptanceId, HaggleError> {
        let quote_id = self.identity.quote.clone();
        let snapshot = self.services.quote.snapshot(&quote_id).await?;
        self.engine.store_quote(snapshot.clone());
        self.publish_negotiation();
        if snapshot.state_code.is_closed() {
            return Err(HaggleError::InvalidPayload {
                message: format!(
                    "quote is {}, acceptance cannot be requested",
                    snapshot.state_code
                ),
            });
        }
        self.services
            .quote
            .propose_acceptance(&quote_id, snapshot.version)
            .await
    }

    fn publish_timeline(&self) {
        self.timeline_tx.send_replace(self.merger.snapshot());
    }

    fn publish_negotiation(&self) {
        self.negotiation_tx.send_replace(self.engine.snapshot());
    }

    fn set_live(&self, status: LiveStatus) {
        if *self.live_tx.borrow() != status {
            debug!(status = %status, conversation = %self.identity.conversation, "live status");
            self.live_tx.send_replace(status);
        }
    }
}

/// Build the optimistic form of an outbound message: no server id yet,
/// attributed to the local account, timestamped now.
fn draft_message(
    identity: &SessionIdentity,
    content: &OutboundContent,
    key: ClientKey,
) -> ChatMessage {
    let (kind, body, media_url) = match content {
        OutboundContent::Text { body } => (MessageKind::Text, Some(body.clone()), None),
        OutboundContent::Image { media_url, caption } => {
            (MessageKind::Image, caption.clone(), Some(media_url.clone()))
        }
    };
    ChatMessage {
        server_id: None,
        conversation: identity.conversation.clone(),
        kind,
        system_subtype: None,
        body,
        media_url,
        client_key: Some(key),
        created_by: identity.account.clone(),
        created_at: chrono::Utc::now(),
        attached_change: None,
        attached_acceptance: None,
    }
}

/// Reconstruct the outbound content of a timeline entry for a retry.
/// System messages are never ours to send.
fn outbound_of(message: &ChatMessage) -> Option<OutboundContent> {
    match message.kind {
        MessageKind::Text => Some(OutboundContent::Text {
            body: message.body.clone().unwrap_or_default(),
        }),
        MessageKind::Image => message.media_url.clone().map(|media_url| OutboundContent::Image {
            media_url,
            caption: message.body.clone(),
        }),
        MessageKind::System => None,
    }
}
