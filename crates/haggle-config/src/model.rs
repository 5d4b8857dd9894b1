// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Haggle sync engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Haggle configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HaggleConfig {
    /// Per-conversation session tuning.
    #[serde(default)]
    pub session: SessionConfig,

    /// Push subscription tuning.
    #[serde(default)]
    pub push: PushConfig,

    /// Conversation list aggregator tuning.
    #[serde(default)]
    pub roster: RosterConfig,
}

/// Per-conversation session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds a send waits for its acknowledgement before failing as a
    /// timeout.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Capacity of the session actor mailbox (commands and internal events).
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Report the last-read marker after a history load. Disabling this
    /// turns off read receipts for the account.
    #[serde(default = "default_mark_read_enabled")]
    pub mark_read_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            mailbox_capacity: default_mailbox_capacity(),
            mark_read_enabled: default_mark_read_enabled(),
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_mark_read_enabled() -> bool {
    true
}

/// Push subscription configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// Capacity of the per-subscription forwarding channel between the push
    /// stream task and the owning actor.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            stream_buffer: default_stream_buffer(),
        }
    }
}

fn default_stream_buffer() -> usize {
    512
}

/// Conversation list aggregator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RosterConfig {
    /// Capacity of the aggregator actor mailbox.
    #[serde(default = "default_roster_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_roster_mailbox_capacity(),
        }
    }
}

fn default_roster_mailbox_capacity() -> usize {
    256
}
