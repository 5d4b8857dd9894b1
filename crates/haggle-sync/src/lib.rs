// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time synchronization core for per-deal negotiation chats.
//!
//! A conversation doubles as the transport for a quote negotiation: plain
//! chat messages and system messages share one channel, and the system
//! messages drive a negotiation state machine. This crate owns the client
//! side of that model:
//!
//! - [`ConversationSession`]: one actor per open conversation, merging
//!   history, send acknowledgements, and push events into a single
//!   deduplicated timeline and deriving negotiation state from it.
//! - [`SessionSlot`]: at-most-one live session, with full teardown before
//!   the next one opens.
//! - [`ConversationListAggregator`]: the account-wide conversation list
//!   with unread counts, spliced live from the push stream.
//!
//! The transport itself stays behind the service traits in
//! [`haggle_core::traits`]; this crate holds the synchronization logic
//! only.

pub mod identity;
pub mod negotiation;
pub mod roster;
pub mod session;
pub mod slot;
pub mod subscription;
pub mod timeline;

pub use negotiation::{
    AcceptanceRecord, AcceptanceView, ChangeRecord, ChangeView, EditRoute, NegotiationEngine,
    NegotiationSnapshot, ObserveOutcome,
};
pub use roster::{ConversationListAggregator, RosterPhase, RosterServices, RosterSnapshot};
pub use session::{ConversationSession, SessionIdentity, SessionServices};
pub use slot::SessionSlot;
pub use subscription::LiveStatus;
pub use timeline::{
    Admission, HistoryPhase, SendState, TimelineEntry, TimelineMerger, TimelineSnapshot,
};
