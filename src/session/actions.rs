//! Community action board.
//!
//! Viewers propose actions and back them with bets. An action moves through
//! a small state machine:
//!
//! ```text
//! Pending --(min_supporters reached)--> Active --verify(true)--> Completed
//!                                              \--verify(false)-> Failed
//! ```
//!
//! Payouts are the only external side effect and happen only on the
//! verified transition.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::payout::{send_with_retry, PayoutError, PayoutReceipt, PayoutSink};

/// Identifier of a proposed action (random v4 UUID).
pub type ActionId = Uuid;

/// Supporters an action needs before it activates.
pub const DEFAULT_MIN_SUPPORTERS: usize = 3;

/// Amount paid to each participant of a verified action.
pub const DEFAULT_PAYOUT: f64 = 10.0;

/// Attempts per payout before giving up.
pub const DEFAULT_PAYOUT_ATTEMPTS: usize = 3;

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for supporters.
    Pending,
    /// Enough supporters; waiting for verification.
    Active,
    /// Verified and paid out.
    Completed,
    /// Verification failed, or a payout could not be delivered.
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Active => "active",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A proposed action and its backers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Identifier.
    pub id: ActionId,
    /// Who proposed it.
    pub proposer: String,
    /// Free-form action type.
    pub kind: String,
    /// Proposer's bet.
    pub bet: f64,
    /// Supporters in order of arrival.
    pub supporters: Vec<String>,
    /// Proposer's bet plus every supporter's bet.
    pub total_bet: f64,
    /// Proposed by the streamer.
    pub is_streamer_action: bool,
    /// Lifecycle state.
    pub status: ActionStatus,
    /// Receipts of delivered payouts.
    pub receipts: Vec<PayoutReceipt>,
}

impl Action {
    /// Proposer followed by every supporter.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.proposer.as_str()).chain(self.supporters.iter().map(String::as_str))
    }
}

/// Rejected action-board operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    /// No action with this id.
    UnknownAction(ActionId),
    /// The operation is not allowed in the action's current state.
    InvalidTransition {
        /// Action id.
        id: ActionId,
        /// Current state.
        status: ActionStatus,
        /// Attempted operation.
        operation: &'static str,
    },
    /// Bet is negative or not finite.
    InvalidBet(f64),
    /// The supporter already backs this action.
    DuplicateSupporter {
        /// Action id.
        id: ActionId,
        /// Supporter name.
        supporter: String,
    },
    /// A payout failed after all retries; the action is marked failed.
    Payout {
        /// Action id.
        id: ActionId,
        /// Last payout error.
        error: PayoutError,
    },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::UnknownAction(id) => write!(f, "action {} not found", id),
            ActionError::InvalidTransition {
                id,
                status,
                operation,
            } => write!(f, "cannot {} action {} while {}", operation, id, status),
            ActionError::InvalidBet(bet) => {
                write!(f, "bet {} must be non-negative and finite", bet)
            }
            ActionError::DuplicateSupporter { id, supporter } => {
                write!(f, "{} already supports action {}", supporter, id)
            }
            ActionError::Payout { id, error } => write!(f, "action {}: {}", id, error),
        }
    }
}

impl std::error::Error for ActionError {}

/// Registry of proposed actions for one session.
#[derive(Debug, Clone)]
pub struct ActionBoard {
    streamer_id: Option<String>,
    min_supporters: usize,
    payout: f64,
    payout_attempts: usize,
    actions: FxHashMap<ActionId, Action>,
    order: Vec<ActionId>,
}

impl Default for ActionBoard {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ActionBoard {
    /// Empty board; actions proposed by `streamer_id` are flagged.
    pub fn new(streamer_id: Option<String>) -> Self {
        Self {
            streamer_id,
            min_supporters: DEFAULT_MIN_SUPPORTERS,
            payout: DEFAULT_PAYOUT,
            payout_attempts: DEFAULT_PAYOUT_ATTEMPTS,
            actions: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Builder method: set the activation threshold.
    pub fn with_min_supporters(mut self, count: usize) -> Self {
        self.min_supporters = count;
        self
    }

    /// Builder method: set the per-participant payout.
    pub fn with_payout(mut self, amount: f64) -> Self {
        self.payout = amount;
        self
    }

    /// Builder method: set the attempts per payout.
    pub fn with_payout_attempts(mut self, attempts: usize) -> Self {
        self.payout_attempts = attempts;
        self
    }

    /// Propose a new action.
    pub fn propose(&mut self, proposer: &str, kind: &str, bet: f64) -> Result<ActionId, ActionError> {
        check_bet(bet)?;

        let id = Uuid::new_v4();
        let is_streamer_action = self.streamer_id.as_deref() == Some(proposer);

        let mut action = Action {
            id,
            proposer: proposer.to_string(),
            kind: kind.to_string(),
            bet,
            supporters: Vec::new(),
            total_bet: bet,
            is_streamer_action,
            status: ActionStatus::Pending,
            receipts: Vec::new(),
        };
        if self.min_supporters == 0 {
            action.status = ActionStatus::Active;
        }
        log::info!("action {} proposed by {} ({})", id, proposer, kind);
        self.actions.insert(id, action);
        self.order.push(id);
        Ok(id)
    }

    /// Back a pending action. Returns its state afterwards.
    pub fn support(
        &mut self,
        id: ActionId,
        supporter: &str,
        bet: f64,
    ) -> Result<ActionStatus, ActionError> {
        check_bet(bet)?;
        let min_supporters = self.min_supporters;
        let action = self.actions.get_mut(&id).ok_or(ActionError::UnknownAction(id))?;

        if action.status != ActionStatus::Pending {
            return Err(ActionError::InvalidTransition {
                id,
                status: action.status,
                operation: "support",
            });
        }
        if action.supporters.iter().any(|s| s == supporter) {
            return Err(ActionError::DuplicateSupporter {
                id,
                supporter: supporter.to_string(),
            });
        }

        action.supporters.push(supporter.to_string());
        action.total_bet += bet;
        if action.supporters.len() >= min_supporters {
            action.status = ActionStatus::Active;
            log::info!("action {} activated with {} supporters", id, action.supporters.len());
        }
        Ok(action.status)
    }

    /// Resolve an active action.
    ///
    /// A verified action pays every participant through `sink`. If a payout
    /// still fails after retries the action is marked failed and the error is
    /// returned; receipts of payouts already delivered are kept.
    pub fn verify<S: PayoutSink + ?Sized>(
        &mut self,
        id: ActionId,
        verified: bool,
        sink: &mut S,
    ) -> Result<ActionStatus, ActionError> {
        let (payout, attempts) = (self.payout, self.payout_attempts);
        let action = self.actions.get_mut(&id).ok_or(ActionError::UnknownAction(id))?;

        if action.status != ActionStatus::Active {
            return Err(ActionError::InvalidTransition {
                id,
                status: action.status,
                operation: "verify",
            });
        }

        if !verified {
            action.status = ActionStatus::Failed;
            log::info!("action {} failed verification", id);
            return Ok(action.status);
        }

        let recipients: Vec<String> = action.participants().map(str::to_string).collect();
        for recipient in &recipients {
            match send_with_retry(sink, recipient, payout, attempts) {
                Ok(receipt) => action.receipts.push(receipt),
                Err(error) => {
                    action.status = ActionStatus::Failed;
                    log::warn!("action {}: payout to {} failed: {}", id, recipient, error);
                    return Err(ActionError::Payout { id, error });
                }
            }
        }

        action.status = ActionStatus::Completed;
        log::info!("action {} completed, paid {} participants", id, recipients.len());
        Ok(action.status)
    }

    /// Look up an action.
    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(&id)
    }

    /// Actions in a given state, in proposal order.
    pub fn with_status(&self, status: ActionStatus) -> Vec<&Action> {
        self.order
            .iter()
            .filter_map(|id| self.actions.get(id))
            .filter(|a| a.status == status)
            .collect()
    }

    /// Pending actions.
    pub fn pending(&self) -> Vec<&Action> {
        self.with_status(ActionStatus::Pending)
    }

    /// Active actions.
    pub fn active(&self) -> Vec<&Action> {
        self.with_status(ActionStatus::Active)
    }

    /// Completed actions.
    pub fn completed(&self) -> Vec<&Action> {
        self.with_status(ActionStatus::Completed)
    }

    /// Number of actions ever proposed.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing was proposed yet.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn check_bet(bet: f64) -> Result<(), ActionError> {
    if bet.is_finite() && bet >= 0.0 {
        Ok(())
    } else {
        Err(ActionError::InvalidBet(bet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::payout::LedgerSink;

    struct Refusing;

    impl PayoutSink for Refusing {
        fn send(&mut self, _recipient: &str, _amount: f64) -> Result<PayoutReceipt, PayoutError> {
            Err(PayoutError::Rejected("insufficient funds".to_string()))
        }
    }

    fn activated(board: &mut ActionBoard) -> ActionId {
        let id = board.propose("alice", "jump", 5.0).unwrap();
        for name in ["bob", "carol", "dave"] {
            board.support(id, name, 2.0).unwrap();
        }
        id
    }

    #[test]
    fn test_action_activates_at_threshold() {
        let mut board = ActionBoard::new(Some("streamer".to_string()));
        let id = board.propose("alice", "jump", 5.0).unwrap();

        assert_eq!(board.support(id, "bob", 1.0).unwrap(), ActionStatus::Pending);
        assert_eq!(board.support(id, "carol", 1.0).unwrap(), ActionStatus::Pending);
        assert_eq!(board.support(id, "dave", 1.0).unwrap(), ActionStatus::Active);

        let action = board.get(id).unwrap();
        assert_eq!(action.total_bet, 8.0);
        assert!(!action.is_streamer_action);
        assert_eq!(board.active().len(), 1);
        assert!(board.pending().is_empty());
    }

    #[test]
    fn test_verified_action_pays_every_participant() {
        let mut board = ActionBoard::default();
        let id = activated(&mut board);
        let mut ledger = LedgerSink::new();

        assert_eq!(board.verify(id, true, &mut ledger).unwrap(), ActionStatus::Completed);
        assert_eq!(ledger.entries().len(), 4);
        assert_eq!(ledger.balance("alice"), 10.0);
        assert_eq!(ledger.balance("dave"), 10.0);
        assert_eq!(board.get(id).unwrap().receipts.len(), 4);
        assert_eq!(board.completed().len(), 1);
    }

    #[test]
    fn test_unverified_action_fails_without_payouts() {
        let mut board = ActionBoard::default();
        let id = activated(&mut board);
        let mut ledger = LedgerSink::new();

        assert_eq!(board.verify(id, false, &mut ledger).unwrap(), ActionStatus::Failed);
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut board = ActionBoard::default();
        let mut ledger = LedgerSink::new();
        let id = board.propose("alice", "jump", 5.0).unwrap();

        assert!(matches!(
            board.verify(id, true, &mut ledger),
            Err(ActionError::InvalidTransition {
                status: ActionStatus::Pending,
                ..
            })
        ));
        let unknown = Uuid::new_v4();
        assert_eq!(
            board.support(unknown, "bob", 1.0),
            Err(ActionError::UnknownAction(unknown))
        );
        assert!(matches!(
            board.support(id, "alice", f64::NAN),
            Err(ActionError::InvalidBet(_))
        ));

        board.support(id, "bob", 1.0).unwrap();
        assert!(matches!(
            board.support(id, "bob", 1.0),
            Err(ActionError::DuplicateSupporter { .. })
        ));

        board.support(id, "carol", 1.0).unwrap();
        board.support(id, "dave", 1.0).unwrap();
        board.verify(id, true, &mut ledger).unwrap();
        assert!(matches!(
            board.verify(id, true, &mut ledger),
            Err(ActionError::InvalidTransition {
                status: ActionStatus::Completed,
                ..
            })
        ));
        assert!(board.support(id, "erin", 1.0).is_err());
    }

    #[test]
    fn test_failed_payout_marks_action_failed() {
        let mut board = ActionBoard::default().with_payout_attempts(2);
        let id = activated(&mut board);

        let result = board.verify(id, true, &mut Refusing);
        assert!(matches!(result, Err(ActionError::Payout { .. })));
        assert_eq!(board.get(id).unwrap().status, ActionStatus::Failed);
    }

    #[test]
    fn test_action_ids_are_unique_and_listed_in_proposal_order() {
        let mut board = ActionBoard::default();
        let ids: Vec<ActionId> = ["jump", "sing", "dance"]
            .iter()
            .map(|kind| board.propose("alice", kind, 1.0).unwrap())
            .collect();

        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(ids[0].get_version_num(), 4);

        let pending: Vec<ActionId> = board.pending().iter().map(|a| a.id).collect();
        assert_eq!(pending, ids);
        assert_eq!(board.get(ids[1]).map(|a| a.kind.as_str()), Some("sing"));
    }

    #[test]
    fn test_streamer_actions_are_flagged() {
        let mut board = ActionBoard::new(Some("streamer".to_string())).with_min_supporters(1);
        let id = board.propose("streamer", "dance", 0.0).unwrap();
        assert!(board.get(id).unwrap().is_streamer_action);
        assert_eq!(board.support(id, "bob", 3.0).unwrap(), ActionStatus::Active);
        assert_eq!(board.len(), 1);
    }
}
