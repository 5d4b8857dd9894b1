// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merged message timeline for one conversation.
//!
//! Three sources feed the same ordered list:
//!
//! - the history page fetched at open,
//! - acknowledgements of our own sends,
//! - live push events.
//!
//! The merger deduplicates across all of them via [`identity`] keys, keeps
//! the list in a total order, and buffers push events that arrive before
//! the history page has been applied.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use haggle_core::error::HaggleError;
use haggle_core::types::{ChatMessage, ClientKey, HistoryPage, MessageId};

use crate::identity::{self, EventKey};

/// Delivery state of a timeline entry, from the local client's point of
/// view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Acknowledged by the server, or not ours to begin with.
    Sent,
    /// Our optimistic send, acknowledgement still outstanding.
    Sending,
    /// The send failed with a retriable error; the entry stays visible
    /// until retried or the session closes.
    Failed,
}

/// Where the history load currently stands.
#[derive(Debug, Clone)]
pub enum HistoryPhase {
    Loading,
    Ready,
    Failed(Arc<HaggleError>),
}

impl HistoryPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, HistoryPhase::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HistoryPhase::Failed(_))
    }
}

/// One message in the merged timeline.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub message: ChatMessage,
    pub send_state: SendState,
    seq: u64,
}

impl TimelineEntry {
    /// Arrival sequence number, assigned once at first admission and kept
    /// across upgrades.
    pub fn arrival_seq(&self) -> u64 {
        self.seq
    }
}

/// Immutable view of the timeline published to observers.
#[derive(Clone)]
pub struct TimelineSnapshot {
    pub entries: Arc<Vec<TimelineEntry>>,
    pub phase: HistoryPhase,
    /// Newest message id the local account has read, as far as we know.
    pub last_read: Option<MessageId>,
}

/// What happened when a message was offered to the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new logical event entered the timeline.
    Inserted,
    /// An existing unacknowledged entry was replaced wholesale by its
    /// server-acknowledged form.
    Upgraded,
    /// Already known under at least one key; dropped.
    Duplicate,
    /// Held back until the history page is applied.
    Buffered,
}

pub struct TimelineMerger {
    entries: Vec<TimelineEntry>,
    keys: HashMap<EventKey, u64>,
    next_seq: u64,
    history_applied: bool,
    pending_push: Vec<ChatMessage>,
    last_read: Option<MessageId>,
    phase: HistoryPhase,
}

impl TimelineMerger {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            keys: HashMap::new(),
            next_seq: 0,
            history_applied: false,
            pending_push: Vec::new(),
            last_read: None,
            phase: HistoryPhase::Loading,
        }
    }

    /// Apply the history page, then drain any push events buffered while it
    /// was in flight. Returns the messages newly inserted, in admission
    /// order, so the caller can drive side effects off them.
    pub fn admit_history(&mut self, page: HistoryPage) -> Vec<ChatMessage> {
        let mut appended = Vec::new();
        self.last_read = page.last_read;
        for message in page.messages {
            if self.admit(message.clone(), SendState::Sent) == Admission::Inserted {
                appended.push(message);
            }
        }
        self.phase = HistoryPhase::Ready;
        self.history_applied = true;
        self.drain_pending(&mut appended);
        appended
    }

    /// Record a failed history load. Live events buffered so far are
    /// released: an empty timeline that fills from pushes alone is a legal
    /// state.
    pub fn history_failed(&mut self, error: HaggleError) -> Vec<ChatMessage> {
        self.phase = HistoryPhase::Failed(Arc::new(error));
        self.history_applied = true;
        let mut appended = Vec::new();
        self.drain_pending(&mut appended);
        appended
    }

    /// A history retry is in flight again.
    pub fn set_loading(&mut self) {
        self.phase = HistoryPhase::Loading;
    }

    /// Admit a send acknowledgement. Normally upgrades the optimistic entry
    /// in place.
    pub fn admit_send(&mut self, ack: ChatMessage) -> Admission {
        self.admit(ack, SendState::Sent)
    }

    /// Admit a live push event, or buffer it if history has not been
    /// applied yet.
    pub fn admit_push(&mut self, event: ChatMessage) -> Admission {
        if !self.history_applied {
            self.pending_push.push(event);
            return Admission::Buffered;
        }
        self.admit(event, SendState::Sent)
    }

    /// Insert our own optimistic send before the transport has confirmed
    /// it.
    pub fn insert_optimistic(&mut self, message: ChatMessage) -> Admission {
        self.admit(message, SendState::Sending)
    }

    /// Flag an optimistic entry as failed. Returns false when no entry is
    /// awaiting acknowledgement under this key (for example because a push
    /// echo already upgraded it).
    pub fn mark_send_failed(&mut self, key: ClientKey) -> bool {
        self.set_send_state(key, SendState::Sending, SendState::Failed)
    }

    /// Put a failed entry back into the sending state for a retry. Returns
    /// false when no failed entry exists under this key.
    pub fn mark_sending(&mut self, key: ClientKey) -> bool {
        self.set_send_state(key, SendState::Failed, SendState::Sending)
    }

    /// The failed entry's original content, reconstructed for a retry.
    pub fn message_for(&self, key: ClientKey) -> Option<&ChatMessage> {
        let seq = *self.keys.get(&EventKey::Client(key))?;
        self.entries
            .iter()
            .find(|e| e.seq == seq)
            .map(|e| &e.message)
    }

    /// Move the local read marker forward. Never moves it backwards.
    pub fn note_read(&mut self, newest: MessageId) {
        if self.last_read.is_none_or(|lr| lr < newest) {
            self.last_read = Some(newest);
        }
    }

    pub fn last_read(&self) -> Option<MessageId> {
        self.last_read
    }

    /// Highest server-assigned id currently in the timeline.
    pub fn newest_server_id(&self) -> Option<MessageId> {
        self.entries
            .iter()
            .filter_map(|e| e.message.server_id)
            .max()
    }

    pub fn phase(&self) -> &HistoryPhase {
        &self.phase
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            entries: Arc::new(self.entries.clone()),
            phase: self.phase.clone(),
            last_read: self.last_read,
        }
    }

    fn drain_pending(&mut self, appended: &mut Vec<ChatMessage>) {
        for message in std::mem::take(&mut self.pending_push) {
            if self.admit(message.clone(), SendState::Sent) == Admission::Inserted {
                appended.push(message);
            }
        }
    }

    fn admit(&mut self, message: ChatMessage, state: SendState) -> Admission {
        let keys = identity::keys_for(&message);
        let existing = keys.iter().find_map(|k| self.keys.get(k).copied());
        match existing {
            Some(seq) => self.merge_into(seq, message, keys),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let entry = TimelineEntry {
                    message,
                    send_state: state,
                    seq,
                };
                let at = self.insertion_point(&entry);
                self.entries.insert(at, entry);
                for key in keys {
                    self.keys.insert(key, seq);
                }
                Admission::Inserted
            }
        }
    }

    /// A representation of an already-known event arrived. If the known
    /// entry has no server id and the new one does, the new representation
    /// wins wholesale; old keys stay registered so yet another copy still
    /// deduplicates.
    fn merge_into(&mut self, seq: u64, message: ChatMessage, keys: Vec<EventKey>) -> Admission {
        let Some(pos) = self.entries.iter().position(|e| e.seq == seq) else {
            return Admission::Duplicate;
        };
        let upgrade = self.entries[pos].message.server_id.is_none() && message.server_id.is_some();
        if !upgrade {
            return Admission::Duplicate;
        }
        let mut entry = self.entries.remove(pos);
        entry.message = message;
        entry.send_state = SendState::Sent;
        let at = self.insertion_point(&entry);
        self.entries.insert(at, entry);
        for key in keys {
            self.keys.insert(key, seq);
        }
        Admission::Upgraded
    }

    fn insertion_point(&self, entry: &TimelineEntry) -> usize {
        let key = sort_key(entry);
        self.entries.partition_point(|e| sort_key(e) <= key)
    }

    /// Current send state under a client key, if the entry exists.
    pub fn send_state_for(&self, key: ClientKey) -> Option<SendState> {
        let seq = *self.keys.get(&EventKey::Client(key))?;
        self.entries
            .iter()
            .find(|e| e.seq == seq)
            .map(|e| e.send_state)
    }

    fn set_send_state(&mut self, key: ClientKey, from: SendState, to: SendState) -> bool {
        let Some(seq) = self.keys.get(&EventKey::Client(key)).copied() else {
            return false;
        };
        match self.entries.iter_mut().find(|e| e.seq == seq) {
            Some(entry) if entry.send_state == from => {
                entry.send_state = to;
                true
            }
            _ => false,
        }
    }
}

impl Default for TimelineMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Total order over entries: creation time, then server id, then arrival.
///
/// Entries without a server id sort after acknowledged ones within the same
/// timestamp, so an upgrade can only move an entry left, never past a later
/// timestamp.
fn sort_key(entry: &TimelineEntry) -> (DateTime<Utc>, i64, u64) {
    let id = entry.message.server_id.map_or(i64::MAX, |m| m.0);
    (entry.message.created_at, id, entry.seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use haggle_core::types::{AccountId, ConversationId, MessageKind};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
    }

    fn message(body: &str, minute: u32) -> ChatMessage {
        ChatMessage {
            server_id: None,
            conversation: ConversationId("conv-1".into()),
            kind: MessageKind::Text,
            system_subtype: None,
            body: Some(body.into()),
            media_url: None,
            client_key: None,
            created_by: AccountId("bob".into()),
            created_at: at(minute),
            attached_change: None,
            attached_acceptance: None,
        }
    }

    fn with_id(mut msg: ChatMessage, id: i64) -> ChatMessage {
        msg.server_id = Some(MessageId(id));
        msg
    }

    fn ids(merger: &TimelineMerger) -> Vec<Option<i64>> {
        merger
            .entries
            .iter()
            .map(|e| e.message.server_id.map(|m| m.0))
            .collect()
    }

    #[test]
    fn push_before_history_is_buffered_then_drained() {
        let mut merger = TimelineMerger::new();
        assert_eq!(
            merger.admit_push(with_id(message("live", 5), 42)),
            Admission::Buffered
        );
        assert!(merger.is_empty());

        let appended = merger.admit_history(HistoryPage {
            messages: vec![with_id(message("old", 1), 10)],
            last_read: None,
        });
        assert_eq!(appended.len(), 2);
        assert_eq!(ids(&merger), vec![Some(10), Some(42)]);
        assert!(merger.phase().is_ready());
    }

    #[test]
    fn history_failure_releases_buffered_events() {
        let mut merger = TimelineMerger::new();
        merger.admit_push(with_id(message("live", 5), 42));
        let appended = merger.history_failed(HaggleError::Transport {
            message: "socket reset".into(),
            source: None,
        });
        assert_eq!(appended.len(), 1);
        assert_eq!(ids(&merger), vec![Some(42)]);
        assert!(merger.phase().is_failed());
    }

    #[test]
    fn duplicate_push_is_dropped() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });
        let event = with_id(message("once", 3), 7);
        assert_eq!(merger.admit_push(event.clone()), Admission::Inserted);
        assert_eq!(merger.admit_push(event), Admission::Duplicate);
        assert_eq!(merger.len(), 1);
    }

    #[test]
    fn ack_upgrades_optimistic_entry_in_place() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });

        let key = ClientKey::generate();
        let mut draft = message("hi", 4);
        draft.client_key = Some(key);
        merger.insert_optimistic(draft.clone());
        assert_eq!(merger.entries[0].send_state, SendState::Sending);

        let ack = with_id(draft, 42);
        assert_eq!(merger.admit_send(ack), Admission::Upgraded);
        assert_eq!(merger.len(), 1);
        assert_eq!(ids(&merger), vec![Some(42)]);
        assert_eq!(merger.entries[0].send_state, SendState::Sent);
    }

    #[test]
    fn push_echo_after_upgrade_still_deduplicates() {
        // Old keys must survive the upgrade: the echo carries no client
        // key, only the server id and the composite.
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });

        let key = ClientKey::generate();
        let mut draft = message("hi", 4);
        draft.client_key = Some(key);
        merger.insert_optimistic(draft.clone());
        merger.admit_send(with_id(draft.clone(), 42));

        let mut echo = with_id(draft, 42);
        echo.client_key = None;
        assert_eq!(merger.admit_push(echo), Admission::Duplicate);
        assert_eq!(merger.len(), 1);
    }

    #[test]
    fn echo_ahead_of_ack_upgrades_then_ack_deduplicates() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });

        let key = ClientKey::generate();
        let mut draft = message("hi", 4);
        draft.client_key = Some(key);
        merger.insert_optimistic(draft.clone());

        // Echo lacks the client key but matches on the composite.
        let mut echo = with_id(draft.clone(), 42);
        echo.client_key = None;
        assert_eq!(merger.admit_push(echo), Admission::Upgraded);

        assert_eq!(merger.admit_send(with_id(draft, 42)), Admission::Duplicate);
        assert_eq!(merger.len(), 1);
    }

    #[test]
    fn order_is_time_then_id_then_arrival() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });
        merger.admit_push(with_id(message("b", 2), 20));
        merger.admit_push(with_id(message("a", 2), 10));
        merger.admit_push(with_id(message("c", 1), 30));
        assert_eq!(ids(&merger), vec![Some(30), Some(10), Some(20)]);
    }

    #[test]
    fn unacked_entry_sorts_after_acked_at_same_instant() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![],
            last_read: None,
        });
        let mut draft = message("draft", 2);
        draft.client_key = Some(ClientKey::generate());
        merger.insert_optimistic(draft);
        merger.admit_push(with_id(message("acked", 2), 5));
        assert_eq!(ids(&merger), vec![Some(5), None]);
    }

    #[test]
    fn failed_send_stays_visible_and_is_retriable() {
        let mut merger = TimelineMerger::new();
        let key = ClientKey::generate();
        let mut draft = message("hi", 4);
        draft.client_key = Some(key);
        merger.insert_optimistic(draft);

        assert!(merger.mark_send_failed(key));
        assert_eq!(merger.entries[0].send_state, SendState::Failed);
        assert_eq!(merger.len(), 1);

        assert!(merger.mark_sending(key));
        assert_eq!(merger.entries[0].send_state, SendState::Sending);
        // Unknown key changes nothing.
        assert!(!merger.mark_sending(ClientKey::generate()));
    }

    #[test]
    fn failed_flag_does_not_downgrade_an_upgraded_entry() {
        let mut merger = TimelineMerger::new();
        let key = ClientKey::generate();
        let mut draft = message("hi", 4);
        draft.client_key = Some(key);
        merger.insert_optimistic(draft.clone());

        merger.admit_send(with_id(draft, 42));
        assert!(!merger.mark_send_failed(key));
        assert_eq!(merger.entries[0].send_state, SendState::Sent);
    }

    #[test]
    fn read_marker_never_moves_backwards() {
        let mut merger = TimelineMerger::new();
        merger.note_read(MessageId(12));
        merger.note_read(MessageId(10));
        assert_eq!(merger.last_read(), Some(MessageId(12)));
    }

    #[test]
    fn newest_server_id_ignores_unacked_entries() {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: vec![with_id(message("a", 1), 10), with_id(message("b", 2), 12)],
            last_read: Some(MessageId(10)),
        });
        let mut draft = message("draft", 3);
        draft.client_key = Some(ClientKey::generate());
        merger.insert_optimistic(draft);
        assert_eq!(merger.newest_server_id(), Some(MessageId(12)));
        assert_eq!(merger.last_read(), Some(MessageId(10)));
    }
}
