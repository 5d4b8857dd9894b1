// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Haggle sync engine.
//!
//! This crate provides the shared data types, the error type, and the
//! collaborator service traits the engine in `haggle-sync` is generic over.
//! Transport and storage implementations live outside this workspace and
//! plug in through the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HaggleError;
pub use types::{
    AcceptanceHandshake, AcceptanceId, AcceptanceStatus, AccountId, ChangeField, ChangeId,
    ChangeItem, ChangeProposal, ChangeStatus, ChatMessage, ClientKey, ConversationId,
    ConversationSummary, Decision, HistoryPage, MessageId, MessageKind, OutboundContent,
    QuoteId, QuoteState, QuoteStateCode, SystemSubtype,
};

// Re-export all collaborator traits at crate root.
pub use traits::{
    HistoryService, MessageStream, PushSource, PushSubscription, QuoteService, ReadMarker,
    RosterService, SendService, SubscriptionHandle,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haggle_error_has_all_variants() {
        // Verify all 9 error variants exist and can be constructed.
        let _config = HaggleError::Config("test".into());
        let _transport = HaggleError::Transport {
            message: "test".into(),
            source: Some(Box::new(std::io::Error::other("test"))),
        };
        let _timeout = HaggleError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _not_authorized = HaggleError::NotAuthorized {
            message: "test".into(),
        };
        let _not_participant = HaggleError::NotParticipant {
            conversation: "conv-1".into(),
        };
        let _not_found = HaggleError::NotFound {
            what: "quote".into(),
            id: "q-1".into(),
        };
        let _conflict = HaggleError::VersionConflict {
            quote: "q-1".into(),
            stale: 3,
        };
        let _payload = HaggleError::InvalidPayload {
            message: "test".into(),
        };
        let _internal = HaggleError::Internal("test".into());
    }

    #[test]
    fn only_transport_and_timeout_are_retriable() {
        assert!(HaggleError::Transport {
            message: "down".into(),
            source: None,
        }
        .is_retriable());
        assert!(HaggleError::Timeout {
            duration: std::time::Duration::from_secs(1),
        }
        .is_retriable());

        assert!(!HaggleError::Config("x".into()).is_retriable());
        assert!(!HaggleError::NotAuthorized { message: "x".into() }.is_retriable());
        assert!(!HaggleError::NotParticipant {
            conversation: "c".into(),
        }
        .is_retriable());
        assert!(!HaggleError::NotFound {
            what: "conversation".into(),
            id: "c".into(),
        }
        .is_retriable());
        assert!(!HaggleError::VersionConflict {
            quote: "q".into(),
            stale: 1,
        }
        .is_retriable());
        assert!(!HaggleError::InvalidPayload { message: "x".into() }.is_retriable());
        assert!(!HaggleError::Internal("x".into()).is_retriable());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        // Verifies the collaborator traits compile and are reachable through
        // the public API.
        fn _assert_history<T: HistoryService>() {}
        fn _assert_send<T: SendService>() {}
        fn _assert_push<T: PushSource>() {}
        fn _assert_quote<T: QuoteService>() {}
        fn _assert_read<T: ReadMarker>() {}
        fn _assert_roster<T: RosterService>() {}
    }
}
