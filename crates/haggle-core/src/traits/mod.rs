// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator service traits consumed by the sync engine.
//!
//! These are abstract contracts over the deal platform's read/write API and
//! its push channel. All use `#[async_trait]` for dynamic dispatch; the
//! engine holds them as `Arc<dyn ...>`.

pub mod history;
pub mod push;
pub mod quote;
pub mod read;
pub mod roster;
pub mod send;

// Re-export all traits at the traits module level for convenience.
pub use history::HistoryService;
pub use push::{MessageStream, PushSource, PushSubscription, SubscriptionHandle};
pub use quote::QuoteService;
pub use read::ReadMarker;
pub use roster::RosterService;
pub use send::SendService;
