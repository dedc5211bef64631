//! Per-player state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Initial reputation of every player.
pub const INITIAL_REPUTATION: f64 = 0.5;

/// Which layer of the game a player belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Layer 1: core bettors with a binary win/lose outcome.
    Base,
    /// Layer 2: predict the layer 1 outcome.
    Observer,
}

/// Role a player holds in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Layer 1 bettor.
    Base,
    /// Layer 2 player acting as the bank.
    Bank,
    /// Layer 2 player setting the odds.
    OddSetter,
    /// Layer 2 player validating the outcome.
    Validator,
    /// Layer 2 player without an assigned role yet.
    Observer,
}

impl Role {
    /// Roles dealt to layer 2 players each round.
    pub const LAYER2_ROLES: [Role; 3] = [Role::Bank, Role::OddSetter, Role::Validator];

    /// Bonus paid to this role when layer 2 predictions disagree.
    pub fn disagreement_bonus(self) -> f64 {
        match self {
            Role::Bank => 20.0,
            Role::OddSetter => 15.0,
            Role::Validator => 10.0,
            Role::Base | Role::Observer => 0.0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Base => "base",
            Role::Bank => "bank",
            Role::OddSetter => "odd_setter",
            Role::Validator => "validator",
            Role::Observer => "observer",
        };
        write!(f, "{}", name)
    }
}

/// A single player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Id, unique within the player's layer.
    pub id: usize,
    /// Layer the player belongs to.
    pub layer: Layer,
    /// Current role.
    pub role: Role,
    /// Idiosyncratic risk/information parameter (always > 0).
    pub sigma: f64,
    /// Current bet in `[0, max_bet]`.
    pub bet: f64,
    /// Prediction of the layer 1 outcome (layer 2 only).
    pub prediction: Option<bool>,
    /// Reputation in `[0, 1]`.
    pub reputation: f64,
    /// Sum of all settled payoffs.
    pub cumulative_profit: f64,
}

impl Player {
    /// Create a layer 1 player.
    pub fn base(id: usize, sigma: f64) -> Self {
        Self::new(id, Layer::Base, Role::Base, sigma)
    }

    /// Create a layer 2 player. Its role stays `Observer` until the first round.
    pub fn observer(id: usize, sigma: f64) -> Self {
        Self::new(id, Layer::Observer, Role::Observer, sigma)
    }

    fn new(id: usize, layer: Layer, role: Role, sigma: f64) -> Self {
        Self {
            id,
            layer,
            role,
            sigma,
            bet: 0.0,
            prediction: None,
            reputation: INITIAL_REPUTATION,
            cumulative_profit: 0.0,
        }
    }

    /// Place a bet, clamped into `[0, max_bet]`. Returns the accepted amount.
    pub fn place_bet(&mut self, amount: f64, max_bet: f64) -> f64 {
        self.bet = amount.clamp(0.0, max_bet);
        self.bet
    }

    /// Whether the player is in layer 1.
    pub fn is_base(&self) -> bool {
        self.layer == Layer::Base
    }

    /// Add a settled payoff to the running profit.
    pub fn record_profit(&mut self, payoff: f64) {
        self.cumulative_profit += payoff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let player = Player::base(1, 1.0);
        assert_eq!(player.id, 1);
        assert_eq!(player.role, Role::Base);
        assert_eq!(player.bet, 0.0);
        assert!(player.prediction.is_none());
        assert_eq!(player.reputation, 0.5);
        assert_eq!(player.cumulative_profit, 0.0);
        assert!(player.is_base());
        assert!(!Player::observer(0, 1.0).is_base());
    }

    #[test]
    fn test_place_bet_clamps() {
        let mut player = Player::base(0, 1.0);
        assert_eq!(player.place_bet(50.0, 100.0), 50.0);
        assert_eq!(player.place_bet(150.0, 100.0), 100.0);
        assert_eq!(player.place_bet(-5.0, 100.0), 0.0);
    }

    #[test]
    fn test_record_profit_accumulates() {
        let mut player = Player::observer(0, 1.0);
        player.record_profit(100.0);
        player.record_profit(-50.0);
        assert_eq!(player.cumulative_profit, 50.0);
    }

    #[test]
    fn test_role_bonuses() {
        assert_eq!(Role::Bank.disagreement_bonus(), 20.0);
        assert_eq!(Role::OddSetter.disagreement_bonus(), 15.0);
        assert_eq!(Role::Validator.disagreement_bonus(), 10.0);
        assert_eq!(Role::Observer.disagreement_bonus(), 0.0);
        assert_eq!(Role::OddSetter.to_string(), "odd_setter");
    }
}
