// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for the messages and summary rows tests feed through the mocks.

use chrono::{DateTime, Utc};

use haggle_core::types::{
    AccountId, AcceptanceId, ChangeId, ChangeItem, ChangeProposal, ChangeStatus, ChatMessage,
    ConversationId, ConversationSummary, MessageId, MessageKind, SystemSubtype,
};

/// A deterministic timestamp `offset` minutes past a fixed base instant.
///
/// Keeps ordering assertions independent of the wall clock.
pub fn at_minute(offset: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_768_471_200 + offset * 60, 0).expect("fixture timestamp in range")
}

/// A server-acknowledged text message authored by `from`.
pub fn text_message(
    conversation: &ConversationId,
    from: &AccountId,
    id: i64,
    body: &str,
    at: DateTime<Utc>,
) -> ChatMessage {
    ChatMessage {
        server_id: Some(MessageId(id)),
        conversation: conversation.clone(),
        kind: MessageKind::Text,
        system_subtype: None,
        body: Some(body.to_string()),
        media_url: None,
        client_key: None,
        created_by: from.clone(),
        created_at: at,
        attached_change: None,
        attached_acceptance: None,
    }
}

/// A SYSTEM message narrating a change-proposal event.
///
/// The attached proposal's status mirrors the subtype, the way the server
/// writes these records. Panics if `subtype` is not a change subtype.
pub fn change_message(
    conversation: &ConversationId,
    from: &AccountId,
    id: i64,
    subtype: SystemSubtype,
    change_id: i64,
    items: Vec<ChangeItem>,
    at: DateTime<Utc>,
) -> ChatMessage {
    let status = match subtype {
        SystemSubtype::ChangeProposed => ChangeStatus::Pending,
        SystemSubtype::ChangeAccepted => ChangeStatus::Accepted,
        SystemSubtype::ChangeRejected => ChangeStatus::Rejected,
        SystemSubtype::ChangeApplied => ChangeStatus::Applied,
        other => panic!("{other} is not a change subtype"),
    };
    ChatMessage {
        server_id: Some(MessageId(id)),
        conversation: conversation.clone(),
        kind: MessageKind::System,
        system_subtype: Some(subtype),
        body: None,
        media_url: None,
        client_key: None,
        created_by: from.clone(),
        created_at: at,
        attached_change: Some(ChangeProposal {
            change_id: ChangeId(change_id),
            status,
            items,
        }),
        attached_acceptance: None,
    }
}

/// A SYSTEM message narrating an acceptance-handshake event. Panics if
/// `subtype` is not an acceptance subtype.
pub fn acceptance_message(
    conversation: &ConversationId,
    from: &AccountId,
    id: i64,
    subtype: SystemSubtype,
    acceptance_id: i64,
    at: DateTime<Utc>,
) -> ChatMessage {
    assert!(
        matches!(
            subtype,
            SystemSubtype::AcceptanceRequest
                | SystemSubtype::AcceptanceConfirmed
                | SystemSubtype::AcceptanceRejected
        ),
        "{subtype} is not an acceptance subtype"
    );
    ChatMessage {
        server_id: Some(MessageId(id)),
        conversation: conversation.clone(),
        kind: MessageKind::System,
        system_subtype: Some(subtype),
        body: None,
        media_url: None,
        client_key: None,
        created_by: from.clone(),
        created_at: at,
        attached_change: None,
        attached_acceptance: Some(AcceptanceId(acceptance_id)),
    }
}

/// A SYSTEM message narrating an outright quote rejection.
pub fn quote_rejected_message(
    conversation: &ConversationId,
    from: &AccountId,
    id: i64,
    at: DateTime<Utc>,
) -> ChatMessage {
    ChatMessage {
        server_id: Some(MessageId(id)),
        conversation: conversation.clone(),
        kind: MessageKind::System,
        system_subtype: Some(SystemSubtype::QuoteRejected),
        body: None,
        media_url: None,
        client_key: None,
        created_by: from.clone(),
        created_at: at,
        attached_change: None,
        attached_acceptance: None,
    }
}

/// A summary row with no last message.
pub fn summary_row(
    conversation: &str,
    unread: u32,
    last_activity: DateTime<Utc>,
) -> ConversationSummary {
    ConversationSummary {
        conversation: ConversationId(conversation.into()),
        last_message: None,
        unread_count: unread,
        last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_order_by_offset() {
        assert!(at_minute(0) < at_minute(1));
        assert_eq!(at_minute(1) - at_minute(0), chrono::Duration::minutes(1));
    }

    #[test]
    fn change_payload_status_mirrors_subtype() {
        let conv = ConversationId("c".into());
        let from = AccountId("peer".into());
        let msg = change_message(
            &conv,
            &from,
            1,
            SystemSubtype::ChangeAccepted,
            7,
            Vec::new(),
            at_minute(0),
        );
        assert_eq!(msg.kind, MessageKind::System);
        assert_eq!(
            msg.attached_change.as_ref().map(|c| c.status),
            Some(ChangeStatus::Accepted)
        );
        assert_eq!(msg.change_id(), Some(ChangeId(7)));
    }

    #[test]
    #[should_panic(expected = "not a change subtype")]
    fn change_builder_rejects_acceptance_subtypes() {
        change_message(
            &ConversationId("c".into()),
            &AccountId("peer".into()),
            1,
            SystemSubtype::AcceptanceRequest,
            7,
            Vec::new(),
            at_minute(0),
        );
    }
}
