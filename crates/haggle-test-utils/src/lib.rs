// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test utilities for the Haggle workspace.
//!
//! # Components
//!
//! - [`MockHistory`]: scripted history pages with a pause gate
//! - [`MockSend`]: auto-acknowledging send service with failure injection
//! - [`MockPushHub`]: in-process push fanout with per-scope subscriptions
//! - [`MockQuoteService`]: scriptable quote snapshots and call capture
//! - [`MockReadMarker`]: records read reports
//! - [`MockRoster`]: scripted summary lists
//! - [`TestHarness`]: all of the above wired into engine service bundles
//! - [`fixtures`]: builders for test messages and summary rows
//!
//! Everything here is deterministic: mocks never sleep, never depend on the
//! wall clock for ordering, and capture their calls for assertion.

pub mod fixtures;
pub mod harness;
pub mod mock_history;
pub mod mock_push;
pub mod mock_quote;
pub mod mock_read;
pub mod mock_roster;
pub mod mock_send;

pub use harness::{wait_until, TestHarness, TestHarnessBuilder};
pub use mock_history::MockHistory;
pub use mock_push::MockPushHub;
pub use mock_quote::{MockQuoteService, QuoteCall};
pub use mock_read::MockReadMarker;
pub use mock_roster::MockRoster;
pub use mock_send::{MockSend, SendAttempt};
