// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Haggle sync engine.

use thiserror::Error;

/// The primary error type used across all collaborator traits and engine
/// operations.
///
/// Every error is scoped to the operation that produced it; a failed history
/// load, send, or negotiation action never invalidates the whole session.
#[derive(Debug, Error)]
pub enum HaggleError {
    /// Configuration errors (invalid TOML, failed validation).
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or connection failure. Retriable.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out. Retriable.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The account is not allowed to perform the operation.
    #[error("not authorized: {message}")]
    NotAuthorized { message: String },

    /// The account is not a participant of the conversation.
    #[error("not a participant of conversation {conversation}")]
    NotParticipant { conversation: String },

    /// A referenced conversation, quote, change, or handshake does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: String, id: String },

    /// A quote mutation carried a stale version token. The caller must
    /// refetch the quote snapshot before retrying.
    #[error("stale version {stale} for quote {quote}")]
    VersionConflict { quote: String, stale: u64 },

    /// Malformed or inapplicable change/proposal payload.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HaggleError {
    /// Whether re-issuing the exact same operation may succeed.
    ///
    /// Drives the caller-facing retry affordance. `VersionConflict` is
    /// deliberately excluded: the stale version must not be reused.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            HaggleError::Transport { .. } | HaggleError::Timeout { .. }
        )
    }
}
