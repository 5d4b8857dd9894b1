// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-most-one live session per client.
//!
//! The slot is what a conversation screen binds to: opening a
//! conversation closes whatever was open before, including one still in
//! its open sequence, and only then spawns the next session.

use tracing::{debug, info};

use haggle_config::HaggleConfig;
use haggle_core::types::{AccountId, ConversationId, QuoteId};

use crate::session::{ConversationSession, SessionIdentity, SessionServices};

pub struct SessionSlot {
    services: SessionServices,
    config: HaggleConfig,
    account: AccountId,
    current: Option<ConversationSession>,
}

impl SessionSlot {
    pub fn new(services: SessionServices, config: HaggleConfig, account: AccountId) -> Self {
        Self {
            services,
            config,
            account,
            current: None,
        }
    }

    /// Open a session on a conversation. Re-opening the active
    /// conversation returns the existing session; anything else closes the
    /// previous session fully before the new one spawns.
    pub async fn open(
        &mut self,
        conversation: ConversationId,
        quote: QuoteId,
    ) -> ConversationSession {
        if let Some(existing) = &self.current {
            if existing.conversation() == &conversation {
                debug!(conversation = %conversation, "session already open");
                return existing.clone();
            }
        }
        if let Some(previous) = self.current.take() {
            info!(
                previous = %previous.conversation(),
                next = %conversation,
                "switching conversations"
            );
            previous.close().await;
        }
        let identity = SessionIdentity {
            conversation,
            quote,
            account: self.account.clone(),
        };
        let session = ConversationSession::spawn(self.services.clone(), &self.config, identity);
        self.current = Some(session.clone());
        session
    }

    /// Close the active session, if any.
    pub async fn close(&mut self) {
        if let Some(session) = self.current.take() {
            session.close().await;
        }
    }

    pub fn active(&self) -> Option<&ConversationSession> {
        self.current.as_ref()
    }
}
