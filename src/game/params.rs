//! Game parameters and validation.
//!
//! `GameParameters` is an immutable value object describing one game
//! instance: player counts, the utility weights and the betting bounds.
//! It can be built in code with the builder methods or loaded from JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Parameters of the layered betting game.
///
/// All fields have defaults, so a JSON document only needs to list the
/// values it overrides.
///
/// # Example
/// ```
/// use community_betting_solver::game::GameParameters;
///
/// let params = GameParameters::default().with_max_bet(100.0);
/// assert!(params.validate().is_ok());
/// assert_eq!(params.n_layer2_players(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameParameters {
    /// Total number of players across both layers.
    pub n_players: usize,

    /// Number of base (layer 1) players. Must be at least 2.
    pub n_base_players: usize,

    /// Group-benefit decay rate. Also scales the time factor.
    pub alpha: f64,

    /// Reserved secondary decay rate, carried for configuration compatibility.
    pub beta: f64,

    /// Payout multiplier for observers (correct predictions and utility).
    pub observer_multiplier: f64,

    /// Weight of the greed penalty for bets far from the community mean.
    pub greed_factor: f64,

    /// Weight of group cooperation.
    pub group_factor: f64,

    /// Weight of the community-alignment benefit.
    pub community_factor: f64,

    /// Weight of the stability bonus.
    pub stability_factor: f64,

    /// Weight of the reputation bonus.
    pub reputation_factor: f64,

    /// Upper bound of every strategy. Must be positive.
    pub max_bet: f64,

    /// Baseline payoff every player receives.
    pub base_payoff: f64,

    /// Flat bonus added for layer 1 players.
    pub layer1_bonus: f64,
}

impl Default for GameParameters {
    fn default() -> Self {
        Self {
            n_players: 5,
            n_base_players: 2,
            alpha: 0.1,
            beta: 0.05,
            observer_multiplier: 1.5,
            greed_factor: 0.2,
            group_factor: 0.3,
            community_factor: 1.0,
            stability_factor: 0.3,
            reputation_factor: 0.4,
            max_bet: 80.0,
            base_payoff: 20.0,
            layer1_bonus: 10.0,
        }
    }
}

impl GameParameters {
    /// Create parameters with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the player counts.
    pub fn with_players(mut self, n_players: usize, n_base_players: usize) -> Self {
        self.n_players = n_players;
        self.n_base_players = n_base_players;
        self
    }

    /// Builder method: set the strategy upper bound.
    pub fn with_max_bet(mut self, max_bet: f64) -> Self {
        self.max_bet = max_bet;
        self
    }

    /// Builder method: set the group-benefit decay rate.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Builder method: set the community-related weights.
    pub fn with_community_weights(
        mut self,
        greed_factor: f64,
        community_factor: f64,
        stability_factor: f64,
    ) -> Self {
        self.greed_factor = greed_factor;
        self.community_factor = community_factor;
        self.stability_factor = stability_factor;
        self
    }

    /// Builder method: set the base payoff and layer 1 bonus.
    pub fn with_payoffs(mut self, base_payoff: f64, layer1_bonus: f64) -> Self {
        self.base_payoff = base_payoff;
        self.layer1_bonus = layer1_bonus;
        self
    }

    /// Number of layer 2 (observer) players.
    pub fn n_layer2_players(&self) -> usize {
        self.n_players.saturating_sub(self.n_base_players)
    }

    /// Validate the parameters and return the first violation found.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.n_base_players < 2 {
            return Err(GameError::InvalidParameter(format!(
                "n_base_players must be at least 2, got {}",
                self.n_base_players
            )));
        }

        if self.n_players < self.n_base_players {
            return Err(GameError::InvalidParameter(format!(
                "n_players ({}) is smaller than n_base_players ({})",
                self.n_players, self.n_base_players
            )));
        }

        let factors = [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("observer_multiplier", self.observer_multiplier),
            ("greed_factor", self.greed_factor),
            ("group_factor", self.group_factor),
            ("community_factor", self.community_factor),
            ("stability_factor", self.stability_factor),
            ("reputation_factor", self.reputation_factor),
            ("max_bet", self.max_bet),
            ("base_payoff", self.base_payoff),
            ("layer1_bonus", self.layer1_bonus),
        ];
        if let Some((name, value)) = factors.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GameError::InvalidParameter(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if self.max_bet <= 0.0 {
            return Err(GameError::InvalidParameter(format!(
                "max_bet must be positive, got {}",
                self.max_bet
            )));
        }

        Ok(())
    }

    /// Load parameters from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, GameError> {
        let content =
            fs::read_to_string(path).map_err(|e| GameError::Io(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Parse parameters from a JSON string and validate them.
    pub fn from_json_str(json: &str) -> Result<Self, GameError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| GameError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }
}

/// Errors raised while constructing or mutating a game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameError {
    /// Malformed parameters, sigmas or time constraint.
    InvalidParameter(String),
    /// Player index outside `0..n_players`.
    PlayerIndex {
        /// Requested index.
        index: usize,
        /// Number of players in the game.
        n_players: usize,
    },
    /// A prediction was made for a layer 1 player.
    NotObserver(usize),
    /// Bet amount is NaN or infinite.
    InvalidBet(f64),
    /// Failed to read a configuration file.
    Io(String),
    /// Failed to parse a configuration document.
    Parse(String),
}

impl std::fmt::Display for GameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            GameError::PlayerIndex { index, n_players } => write!(
                f,
                "Invalid player index {}. Choose a player between 0 and {}",
                index,
                n_players.saturating_sub(1)
            ),
            GameError::NotObserver(index) => {
                write!(f, "Player {} is a base player and cannot predict", index)
            }
            GameError::InvalidBet(amount) => write!(f, "Bet amount {} is not finite", amount),
            GameError::Io(e) => write!(f, "IO error: {}", e),
            GameError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for GameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_game() {
        let params = GameParameters::default();
        assert_eq!(params.n_players, 5);
        assert_eq!(params.n_base_players, 2);
        assert_eq!(params.observer_multiplier, 1.5);
        assert_eq!(params.reputation_factor, 0.4);
        assert_eq!(params.max_bet, 80.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_max_bet() {
        let params = GameParameters::default().with_max_bet(0.0);
        assert!(matches!(params.validate(), Err(GameError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_mismatched_counts() {
        let params = GameParameters::default().with_players(1, 2);
        assert!(params.validate().is_err());

        let params = GameParameters::default().with_players(5, 1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite_factor() {
        let mut params = GameParameters::default();
        params.greed_factor = f64::NAN;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("greed_factor"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params = GameParameters::from_json_str(r#"{"max_bet": 120, "greed_factor": 0.15}"#)
            .unwrap();
        assert_eq!(params.max_bet, 120.0);
        assert_eq!(params.greed_factor, 0.15);
        assert_eq!(params.n_players, 5);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = GameParameters::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, GameError::Parse(_)));

        let err = GameParameters::from_json_str(r#"{"max_bet": -1}"#).unwrap_err();
        assert!(matches!(err, GameError::InvalidParameter(_)));
    }
}
