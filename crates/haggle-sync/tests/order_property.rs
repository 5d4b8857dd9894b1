// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for timeline merging.
//!
//! Whatever interleaving the sources arrive in, the merged timeline must
//! present the same total order and exactly one entry per logical message.

use proptest::prelude::*;

use haggle_core::types::{
    AccountId, ChatMessage, ClientKey, ConversationId, HistoryPage, MessageId,
};
use haggle_sync::timeline::{SendState, TimelineMerger};
use haggle_test_utils::fixtures::{at_minute, text_message};

fn conv() -> ConversationId {
    ConversationId("conv-prop".into())
}

fn peer() -> AccountId {
    AccountId("peer".into())
}

/// `n` acknowledged messages with ids `1..=n` and repeated timestamps to
/// exercise creation-time ties.
fn build_messages(minutes: &[i64]) -> Vec<ChatMessage> {
    minutes
        .iter()
        .enumerate()
        .map(|(i, minute)| {
            let id = i as i64 + 1;
            text_message(&conv(), &peer(), id, &format!("m{id}"), at_minute(*minute))
        })
        .collect()
}

fn expected_order(messages: &[ChatMessage]) -> Vec<i64> {
    let mut sorted: Vec<&ChatMessage> = messages.iter().collect();
    sorted.sort_by_key(|m| (m.created_at, m.server_id.map_or(i64::MAX, |id| id.0)));
    sorted
        .iter()
        .filter_map(|m| m.server_id.map(|id| id.0))
        .collect()
}

/// Timestamps, the history/push split point, a delivery order for the push
/// subset, and how many pushes race ahead of the history page.
fn interleaving() -> impl Strategy<Value = (Vec<i64>, usize, Vec<usize>, usize)> {
    prop::collection::vec(0i64..4, 1..8).prop_flat_map(|minutes| {
        let n = minutes.len();
        (
            Just(minutes),
            0..=n,
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
            0..=n,
        )
    })
}

proptest! {
    #[test]
    fn merged_order_is_arrival_independent(
        (minutes, split, order, before) in interleaving()
    ) {
        let messages = build_messages(&minutes);
        let history: Vec<ChatMessage> = messages[..split].to_vec();
        let pushes: Vec<ChatMessage> = order
            .iter()
            .filter(|&&i| i >= split)
            .map(|&i| messages[i].clone())
            .collect();
        let before = before.min(pushes.len());

        let mut merger = TimelineMerger::new();
        for message in &pushes[..before] {
            merger.admit_push(message.clone());
        }
        merger.admit_history(HistoryPage {
            messages: history,
            last_read: None,
        });
        for message in &pushes[before..] {
            merger.admit_push(message.clone());
        }

        let snapshot = merger.snapshot();
        let ids: Vec<i64> = snapshot
            .entries
            .iter()
            .filter_map(|e| e.message.server_id.map(|id| id.0))
            .collect();
        prop_assert_eq!(ids, expected_order(&messages));
    }

    #[test]
    fn duplicate_deliveries_collapse(
        minutes in prop::collection::vec(0i64..4, 1..8)
    ) {
        let messages = build_messages(&minutes);
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: messages.clone(),
            last_read: None,
        });
        // Every event also arrives over the push stream.
        for message in &messages {
            merger.admit_push(message.clone());
        }
        prop_assert_eq!(merger.snapshot().entries.len(), messages.len());
    }

    #[test]
    fn ack_and_echo_collapse_in_either_order(
        echo_first in any::<bool>(),
        minute in 0i64..4
    ) {
        let mut merger = TimelineMerger::new();
        merger.admit_history(HistoryPage {
            messages: Vec::new(),
            last_read: None,
        });

        let mut draft = text_message(&conv(), &peer(), 1, "same offer", at_minute(minute));
        draft.server_id = None;
        draft.client_key = Some(ClientKey::generate());
        merger.insert_optimistic(draft.clone());

        let mut acked = draft.clone();
        acked.server_id = Some(MessageId(9));
        if echo_first {
            merger.admit_push(acked.clone());
            merger.admit_send(acked);
        } else {
            merger.admit_send(acked.clone());
            merger.admit_push(acked);
        }

        let snapshot = merger.snapshot();
        prop_assert_eq!(snapshot.entries.len(), 1);
        prop_assert_eq!(snapshot.entries[0].message.server_id, Some(MessageId(9)));
        prop_assert_eq!(snapshot.entries[0].send_state, SendState::Sent);
    }
}
