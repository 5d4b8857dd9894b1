// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Negotiation state derived from admitted system messages.
//!
//! The engine never transitions on the local user's own actions. A quote
//! action round-trips through the server, comes back as a system message
//! on the conversation, passes timeline deduplication, and only then is
//! observed here. That keeps every participant's view converging on the
//! same message stream.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use haggle_core::error::HaggleError;
use haggle_core::types::{
    AcceptanceHandshake, AcceptanceId, AcceptanceStatus, AccountId, ChangeId, ChangeProposal,
    ChangeStatus, ChatMessage, QuoteState, SystemSubtype,
};

/// A tracked change proposal plus who proposed it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub proposal: ChangeProposal,
    /// None for records synthesized from a decision that referenced an id
    /// we never saw proposed (history window split).
    pub proposed_by: Option<AccountId>,
}

impl ChangeRecord {
    /// Only the counterparty may answer an open proposal.
    pub fn respondable_by(&self, viewer: &AccountId) -> bool {
        self.proposal.status == ChangeStatus::Pending
            && self.proposed_by.as_ref().is_some_and(|p| p != viewer)
    }
}

/// A tracked acceptance handshake plus who requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceRecord {
    pub handshake: AcceptanceHandshake,
    pub requested_by: Option<AccountId>,
}

impl AcceptanceRecord {
    pub fn respondable_by(&self, viewer: &AccountId) -> bool {
        self.handshake.status == AcceptanceStatus::Proposed
            && self.requested_by.as_ref().is_some_and(|p| p != viewer)
    }
}

/// What observing one message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOutcome {
    /// Negotiation state visibly changed.
    pub changed: bool,
    /// The quote snapshot may be stale and should be refetched.
    pub refresh: bool,
}

impl ObserveOutcome {
    fn none() -> Self {
        Self {
            changed: false,
            refresh: false,
        }
    }
}

/// View of a change proposal published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeView {
    pub proposal: ChangeProposal,
    pub proposed_by: Option<AccountId>,
    /// Whether the local account may accept or reject it right now.
    pub respondable: bool,
}

/// View of an acceptance handshake published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceView {
    pub handshake: AcceptanceHandshake,
    pub requested_by: Option<AccountId>,
    pub respondable: bool,
}

/// Immutable negotiation view published to observers.
#[derive(Clone)]
pub struct NegotiationSnapshot {
    pub quote: Option<Arc<QuoteState>>,
    pub changes: Arc<Vec<ChangeView>>,
    pub handshakes: Arc<Vec<AcceptanceView>>,
}

/// Which quote-service operation a local edit maps to, given a fresh
/// snapshot of the quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditRoute {
    /// Quote is binding: the edit becomes a proposal the counterparty must
    /// answer.
    Propose,
    /// Quote is still being negotiated: the edit applies directly.
    Apply,
}

/// Decide how a local edit is routed, or reject it outright.
pub fn edit_route(snapshot: &QuoteState) -> Result<EditRoute, HaggleError> {
    if snapshot.state_code.is_binding() {
        Ok(EditRoute::Propose)
    } else if snapshot.state_code.is_negotiating() {
        Ok(EditRoute::Apply)
    } else {
        Err(HaggleError::InvalidPayload {
            message: format!("quote is {}, not editable", snapshot.state_code),
        })
    }
}

pub struct NegotiationEngine {
    me: AccountId,
    changes: BTreeMap<ChangeId, ChangeRecord>,
    handshakes: BTreeMap<AcceptanceId, AcceptanceRecord>,
    quote: Arc<ArcSwapOption<QuoteState>>,
}

impl NegotiationEngine {
    pub fn new(me: AccountId) -> Self {
        Self {
            me,
            changes: BTreeMap::new(),
            handshakes: BTreeMap::new(),
            quote: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Observe one admitted timeline message. Non-system messages are
    /// ignored.
    pub fn observe(&mut self, message: &ChatMessage) -> ObserveOutcome {
        let Some(subtype) = message.system_subtype else {
            return ObserveOutcome::none();
        };
        let changed = match subtype {
            SystemSubtype::ChangeProposed => self.upsert_change(message, ChangeStatus::Pending),
            SystemSubtype::ChangeApplied => self.upsert_change(message, ChangeStatus::Applied),
            SystemSubtype::ChangeAccepted => self.decide_change(message, ChangeStatus::Accepted),
            SystemSubtype::ChangeRejected => self.decide_change(message, ChangeStatus::Rejected),
            SystemSubtype::AcceptanceRequest => self.upsert_handshake(message),
            SystemSubtype::AcceptanceConfirmed => {
                self.decide_handshake(message, AcceptanceStatus::Confirmed)
            }
            SystemSubtype::AcceptanceRejected => {
                self.decide_handshake(message, AcceptanceStatus::Rejected)
            }
            // Carries no per-change state; only the quote itself moved.
            SystemSubtype::QuoteRejected => false,
        };
        ObserveOutcome {
            changed,
            refresh: refresh_trigger(subtype),
        }
    }

    /// Replace the cached quote snapshot. Completions are applied in the
    /// order they arrive; the newest write wins.
    pub fn store_quote(&self, snapshot: QuoteState) {
        self.quote.store(Some(Arc::new(snapshot)));
    }

    pub fn quote(&self) -> Option<Arc<QuoteState>> {
        self.quote.load_full()
    }

    /// Local pre-check before sending a decision on a change proposal.
    pub fn check_change_response(&self, change: ChangeId) -> Result<(), HaggleError> {
        match self.changes.get(&change) {
            None => Err(HaggleError::NotFound {
                what: "change proposal".into(),
                id: change.to_string(),
            }),
            Some(record) if record.proposal.status != ChangeStatus::Pending => {
                Err(HaggleError::InvalidPayload {
                    message: format!(
                        "change {change} is {}, not open for a decision",
                        record.proposal.status
                    ),
                })
            }
            Some(record) if record.proposed_by.as_ref() == Some(&self.me) => {
                Err(HaggleError::NotAuthorized {
                    message: format!("change {change} was proposed by this account"),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Local pre-check before sending a decision on an acceptance
    /// handshake.
    pub fn check_acceptance_response(&self, acceptance: AcceptanceId) -> Result<(), HaggleError> {
        match self.handshakes.get(&acceptance) {
            None => Err(HaggleError::NotFound {
                what: "acceptance request".into(),
                id: acceptance.to_string(),
            }),
            Some(record) if record.handshake.status != AcceptanceStatus::Proposed => {
                Err(HaggleError::InvalidPayload {
                    message: format!(
                        "acceptance {acceptance} is {}, not open for a decision",
                        record.handshake.status
                    ),
                })
            }
            Some(record) if record.requested_by.as_ref() == Some(&self.me) => {
                Err(HaggleError::NotAuthorized {
                    message: format!("acceptance {acceptance} was requested by this account"),
                })
            }
            Some(_) => Ok(()),
        }
    }

    pub fn change(&self, id: ChangeId) -> Option<&ChangeRecord> {
        self.changes.get(&id)
    }

    pub fn handshake(&self, id: AcceptanceId) -> Option<&AcceptanceRecord> {
        self.handshakes.get(&id)
    }

    pub fn snapshot(&self) -> NegotiationSnapshot {
        let changes = self
            .changes
            .values()
            .map(|record| ChangeView {
                proposal: record.proposal.clone(),
                proposed_by: record.proposed_by.clone(),
                respondable: record.respondable_by(&self.me),
            })
            .collect();
        let handshakes = self
            .handshakes
            .values()
            .map(|record| AcceptanceView {
                handshake: record.handshake.clone(),
                requested_by: record.requested_by.clone(),
                respondable: record.respondable_by(&self.me),
            })
            .collect();
        NegotiationSnapshot {
            quote: self.quote(),
            changes: Arc::new(changes),
            handshakes: Arc::new(handshakes),
        }
    }

    fn upsert_change(&mut self, message: &ChatMessage, status: ChangeStatus) -> bool {
        let Some(attached) = &message.attached_change else {
            warn!(
                subtype = ?message.system_subtype,
                "system message without change payload, ignoring"
            );
            return false;
        };
        let id = attached.change_id;
        match self.changes.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(ChangeRecord {
                    proposal: ChangeProposal {
                        change_id: id,
                        status,
                        items: attached.items.clone(),
                    },
                    proposed_by: Some(message.created_by.clone()),
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                let mut changed = false;
                if let Some(next) = advance_change(record.proposal.status, status) {
                    record.proposal.status = next;
                    changed = true;
                }
                // A later message may carry the full item list that the
                // first reference lacked.
                if record.proposal.items.is_empty() && !attached.items.is_empty() {
                    record.proposal.items = attached.items.clone();
                    changed = true;
                }
                if !changed {
                    debug!(change = %id, "redundant change message, state unchanged");
                }
                changed
            }
        }
    }

    fn decide_change(&mut self, message: &ChatMessage, status: ChangeStatus) -> bool {
        let Some(attached) = &message.attached_change else {
            warn!(
                subtype = ?message.system_subtype,
                "decision message without change payload, ignoring"
            );
            return false;
        };
        let id = attached.change_id;
        match self.changes.entry(id) {
            Entry::Vacant(slot) => {
                // Decision for a proposal outside our history window:
                // record it in its terminal state so the outcome is still
                // visible.
                slot.insert(ChangeRecord {
                    proposal: ChangeProposal {
                        change_id: id,
                        status,
                        items: attached.items.clone(),
                    },
                    proposed_by: None,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                let mut changed = false;
                if let Some(next) = advance_change(record.proposal.status, status) {
                    record.proposal.status = next;
                    changed = true;
                }
                if record.proposal.items.is_empty() && !attached.items.is_empty() {
                    record.proposal.items = attached.items.clone();
                    changed = true;
                }
                if !changed {
                    debug!(
                        change = %id,
                        current = %record.proposal.status,
                        "decision ignored, proposal already settled"
                    );
                }
                changed
            }
        }
    }

    fn upsert_handshake(&mut self, message: &ChatMessage) -> bool {
        let Some(id) = message.attached_acceptance else {
            warn!("acceptance request without handshake id, ignoring");
            return false;
        };
        match self.handshakes.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(AcceptanceRecord {
                    handshake: AcceptanceHandshake {
                        acceptance_id: id,
                        status: AcceptanceStatus::Proposed,
                    },
                    requested_by: Some(message.created_by.clone()),
                });
                true
            }
            Entry::Occupied(_) => {
                debug!(acceptance = %id, "handshake already known");
                false
            }
        }
    }

    fn decide_handshake(&mut self, message: &ChatMessage, status: AcceptanceStatus) -> bool {
        let Some(id) = message.attached_acceptance else {
            warn!("acceptance decision without handshake id, ignoring");
            return false;
        };
        match self.handshakes.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(AcceptanceRecord {
                    handshake: AcceptanceHandshake {
                        acceptance_id: id,
                        status,
                    },
                    requested_by: None,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.handshake.status == AcceptanceStatus::Proposed {
                    record.handshake.status = status;
                    true
                } else {
                    debug!(
                        acceptance = %id,
                        current = %record.handshake.status,
                        "decision ignored, handshake already settled"
                    );
                    false
                }
            }
        }
    }
}

/// Legal forward transitions of a change proposal. Terminal states never
/// move.
fn advance_change(current: ChangeStatus, incoming: ChangeStatus) -> Option<ChangeStatus> {
    use ChangeStatus::*;
    match (current, incoming) {
        (Pending, Accepted) => Some(Accepted),
        (Pending, Rejected) => Some(Rejected),
        (Pending, Applied) => Some(Applied),
        (Accepted, Applied) => Some(Applied),
        _ => None,
    }
}

/// Whether a system message of this subtype may have moved the quote
/// itself. A bare proposal leaves the quote state untouched until it is
/// answered, so it triggers no refetch.
fn refresh_trigger(subtype: SystemSubtype) -> bool {
    !matches!(subtype, SystemSubtype::ChangeProposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use haggle_core::types::{
        ChangeField, ChangeItem, ConversationId, MessageKind, QuoteStateCode,
    };

    fn me() -> AccountId {
        AccountId("me".into())
    }

    fn other() -> AccountId {
        AccountId("counterparty".into())
    }

    fn system(subtype: SystemSubtype, from: &AccountId) -> ChatMessage {
        ChatMessage {
            server_id: None,
            conversation: ConversationId("conv-1".into()),
            kind: MessageKind::System,
            system_subtype: Some(subtype),
            body: None,
            media_url: None,
            client_key: None,
            created_by: from.clone(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            attached_change: None,
            attached_acceptance: None,
        }
    }

    fn change_message(subtype: SystemSubtype, from: &AccountId, change: i64) -> ChatMessage {
        let mut msg = system(subtype, from);
        msg.attached_change = Some(ChangeProposal {
            change_id: ChangeId(change),
            status: ChangeStatus::Pending,
            items: vec![ChangeItem {
                field: ChangeField::Quantity,
                target_ref: "item-1".into(),
                old_value: Some("2".into()),
                new_value: Some("3".into()),
            }],
        });
        msg
    }

    fn acceptance_message(subtype: SystemSubtype, from: &AccountId, id: i64) -> ChatMessage {
        let mut msg = system(subtype, from);
        msg.attached_acceptance = Some(AcceptanceId(id));
        msg
    }

    fn quote(code: QuoteStateCode) -> QuoteState {
        QuoteState {
            state_code: code,
            version: 3,
            total_amount: 120.0,
        }
    }

    #[test]
    fn proposal_then_acceptance_transitions_and_refreshes_once() {
        let mut engine = NegotiationEngine::new(me());

        let proposed = engine.observe(&change_message(
            SystemSubtype::ChangeProposed,
            &other(),
            7,
        ));
        assert!(proposed.changed);
        assert!(!proposed.refresh);
        assert_eq!(
            engine.change(ChangeId(7)).unwrap().proposal.status,
            ChangeStatus::Pending
        );

        let accepted = engine.observe(&change_message(
            SystemSubtype::ChangeAccepted,
            &me(),
            7,
        ));
        assert!(accepted.changed);
        assert!(accepted.refresh);
        assert_eq!(
            engine.change(ChangeId(7)).unwrap().proposal.status,
            ChangeStatus::Accepted
        );
    }

    #[test]
    fn terminal_change_states_are_frozen() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&change_message(SystemSubtype::ChangeProposed, &other(), 7));
        engine.observe(&change_message(SystemSubtype::ChangeRejected, &me(), 7));

        let late = engine.observe(&change_message(SystemSubtype::ChangeAccepted, &me(), 7));
        assert!(!late.changed);
        assert_eq!(
            engine.change(ChangeId(7)).unwrap().proposal.status,
            ChangeStatus::Rejected
        );
    }

    #[test]
    fn applied_is_reachable_without_a_prior_proposal() {
        let mut engine = NegotiationEngine::new(me());
        let outcome = engine.observe(&change_message(SystemSubtype::ChangeApplied, &other(), 9));
        assert!(outcome.changed);
        assert!(outcome.refresh);
        assert_eq!(
            engine.change(ChangeId(9)).unwrap().proposal.status,
            ChangeStatus::Applied
        );
    }

    #[test]
    fn decision_for_unknown_change_synthesizes_terminal_record() {
        let mut engine = NegotiationEngine::new(me());
        let outcome = engine.observe(&change_message(SystemSubtype::ChangeAccepted, &other(), 3));
        assert!(outcome.changed);
        let record = engine.change(ChangeId(3)).unwrap();
        assert_eq!(record.proposal.status, ChangeStatus::Accepted);
        assert_eq!(record.proposed_by, None);
    }

    #[test]
    fn parallel_handshakes_are_independent() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&acceptance_message(
            SystemSubtype::AcceptanceRequest,
            &other(),
            5,
        ));
        engine.observe(&acceptance_message(
            SystemSubtype::AcceptanceRequest,
            &other(),
            6,
        ));
        engine.observe(&acceptance_message(
            SystemSubtype::AcceptanceRejected,
            &me(),
            6,
        ));

        assert_eq!(
            engine.handshake(AcceptanceId(5)).unwrap().handshake.status,
            AcceptanceStatus::Proposed
        );
        assert_eq!(
            engine.handshake(AcceptanceId(6)).unwrap().handshake.status,
            AcceptanceStatus::Rejected
        );
    }

    #[test]
    fn rejection_for_unknown_handshake_synthesizes_terminal_record() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&acceptance_message(
            SystemSubtype::AcceptanceRejected,
            &other(),
            11,
        ));
        let record = engine.handshake(AcceptanceId(11)).unwrap();
        assert_eq!(record.handshake.status, AcceptanceStatus::Rejected);
        assert_eq!(record.requested_by, None);
    }

    #[test]
    fn own_proposal_is_not_respondable() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&change_message(SystemSubtype::ChangeProposed, &me(), 7));

        assert!(matches!(
            engine.check_change_response(ChangeId(7)),
            Err(HaggleError::NotAuthorized { .. })
        ));
        let snap = engine.snapshot();
        assert!(!snap.changes[0].respondable);
    }

    #[test]
    fn counterparty_proposal_is_respondable_until_settled() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&change_message(SystemSubtype::ChangeProposed, &other(), 7));
        assert!(engine.check_change_response(ChangeId(7)).is_ok());
        assert!(engine.snapshot().changes[0].respondable);

        engine.observe(&change_message(SystemSubtype::ChangeAccepted, &me(), 7));
        assert!(matches!(
            engine.check_change_response(ChangeId(7)),
            Err(HaggleError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn unknown_change_response_is_not_found() {
        let engine = NegotiationEngine::new(me());
        assert!(matches!(
            engine.check_change_response(ChangeId(999)),
            Err(HaggleError::NotFound { .. })
        ));
    }

    #[test]
    fn own_acceptance_request_is_not_respondable() {
        let mut engine = NegotiationEngine::new(me());
        engine.observe(&acceptance_message(
            SystemSubtype::AcceptanceRequest,
            &me(),
            5,
        ));
        assert!(matches!(
            engine.check_acceptance_response(AcceptanceId(5)),
            Err(HaggleError::NotAuthorized { .. })
        ));
    }

    #[test]
    fn quote_rejection_refreshes_without_a_record() {
        let mut engine = NegotiationEngine::new(me());
        let outcome = engine.observe(&system(SystemSubtype::QuoteRejected, &other()));
        assert!(!outcome.changed);
        assert!(outcome.refresh);
        assert!(engine.snapshot().changes.is_empty());
    }

    #[test]
    fn plain_chat_messages_are_ignored() {
        let mut engine = NegotiationEngine::new(me());
        let mut msg = system(SystemSubtype::QuoteRejected, &other());
        msg.kind = MessageKind::Text;
        msg.system_subtype = None;
        msg.body = Some("hello".into());
        assert_eq!(engine.observe(&msg), ObserveOutcome::none());
    }

    #[test]
    fn stored_quote_is_visible_in_snapshot() {
        let engine = NegotiationEngine::new(me());
        assert!(engine.snapshot().quote.is_none());
        engine.store_quote(quote(QuoteStateCode::Pending));
        let snap = engine.snapshot();
        assert_eq!(
            snap.quote.as_deref().map(|q| q.state_code),
            Some(QuoteStateCode::Pending)
        );
    }

    #[test]
    fn edit_routes_by_quote_state() {
        assert_eq!(
            edit_route(&quote(QuoteStateCode::Accepted)).unwrap(),
            EditRoute::Propose
        );
        assert_eq!(
            edit_route(&quote(QuoteStateCode::Pending)).unwrap(),
            EditRoute::Apply
        );
        assert_eq!(
            edit_route(&quote(QuoteStateCode::InDeal)).unwrap(),
            EditRoute::Apply
        );
        assert!(matches!(
            edit_route(&quote(QuoteStateCode::Waiting)),
            Err(HaggleError::InvalidPayload { .. })
        ));
        assert!(matches!(
            edit_route(&quote(QuoteStateCode::Closed)),
            Err(HaggleError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn later_message_backfills_missing_items() {
        let mut engine = NegotiationEngine::new(me());
        let mut bare = change_message(SystemSubtype::ChangeProposed, &other(), 7);
        if let Some(attached) = &mut bare.attached_change {
            attached.items.clear();
        }
        engine.observe(&bare);
        assert!(engine.change(ChangeId(7)).unwrap().proposal.items.is_empty());

        engine.observe(&change_message(SystemSubtype::ChangeAccepted, &me(), 7));
        let record = engine.change(ChangeId(7)).unwrap();
        assert_eq!(record.proposal.status, ChangeStatus::Accepted);
        assert_eq!(record.proposal.items.len(), 1);
    }
}
