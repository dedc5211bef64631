//! Game state: the two player layers, the community score and round settlement.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::params::{GameError, GameParameters};
use crate::game::payoff::{self, Payoff, PayoffModel};
use crate::game::player::{Layer, Player, Role};

/// Community score of a freshly constructed game.
pub const INITIAL_COMMUNITY_SCORE: f64 = 50.0;

/// Sigmas of generated players are drawn uniformly from this range.
pub const SIGMA_RANGE: std::ops::Range<f64> = 0.5..1.5;

/// Smallest bet drawn for a random round (capped by `max_bet`).
const MIN_RANDOM_BET: f64 = 1.0;

/// Complete state of one game instance.
///
/// Players are stored in one ordered vector: the first `n_base_players`
/// entries are layer 1, the rest are layer 2. Strategy profiles use the same
/// ordering.
#[derive(Debug, Clone)]
pub struct GameState {
    params: GameParameters,
    time_constraint: f64,
    players: Vec<Player>,
    community_score: f64,
    rng: StdRng,
}

/// Payoffs of one settled round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPayoffs {
    /// Layer 1 outcome (true: base player 0 wins).
    pub outcome: bool,
    /// Payoff per layer 1 player.
    pub layer1: Vec<f64>,
    /// Payoff per layer 2 player.
    pub layer2: Vec<f64>,
}

impl RoundPayoffs {
    /// Payoffs of all players in profile order.
    pub fn all(&self) -> Vec<f64> {
        self.layer1.iter().chain(&self.layer2).copied().collect()
    }

    /// Sum of layer 1 payoffs.
    pub fn layer1_total(&self) -> f64 {
        self.layer1.iter().sum()
    }

    /// Sum of layer 2 payoffs.
    pub fn layer2_total(&self) -> f64 {
        self.layer2.iter().sum()
    }
}

/// Read-only view of a player for status reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Position in the strategy profile.
    pub id: usize,
    /// Layer of the player.
    pub layer: Layer,
    /// Role held after the last round.
    pub role: Role,
    /// Current bet.
    pub bet: f64,
    /// Current reputation.
    pub reputation: f64,
    /// Sum of all settled payoffs.
    pub cumulative_profit: f64,
}

/// Status of a game: community score plus every player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Current community score.
    pub community_score: f64,
    /// All players in profile order.
    pub players: Vec<PlayerSnapshot>,
}

impl GameState {
    /// Create a game with random sigmas and an entropy-seeded RNG.
    pub fn new(params: GameParameters, time_constraint: f64) -> Result<Self, GameError> {
        Self::build(params, time_constraint, None, StdRng::from_entropy())
    }

    /// Create a game with random sigmas drawn from a seeded RNG.
    pub fn with_seed(
        params: GameParameters,
        time_constraint: f64,
        seed: u64,
    ) -> Result<Self, GameError> {
        Self::build(params, time_constraint, None, StdRng::seed_from_u64(seed))
    }

    /// Create a game with explicit per-player sigmas.
    pub fn with_sigmas(
        params: GameParameters,
        time_constraint: f64,
        sigmas: Vec<f64>,
        seed: Option<u64>,
    ) -> Result<Self, GameError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::build(params, time_constraint, Some(sigmas), rng)
    }

    fn build(
        params: GameParameters,
        time_constraint: f64,
        sigmas: Option<Vec<f64>>,
        mut rng: StdRng,
    ) -> Result<Self, GameError> {
        params.validate()?;

        if !time_constraint.is_finite() {
            return Err(GameError::InvalidParameter(format!(
                "time_constraint must be finite, got {}",
                time_constraint
            )));
        }

        let sigmas = match sigmas {
            Some(sigmas) => {
                if sigmas.len() != params.n_players {
                    return Err(GameError::InvalidParameter(format!(
                        "expected {} sigmas, got {}",
                        params.n_players,
                        sigmas.len()
                    )));
                }
                if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
                    return Err(GameError::InvalidParameter(format!(
                        "sigma must be positive and finite, got {}",
                        bad
                    )));
                }
                sigmas
            }
            None => random_sigmas(params.n_players, &mut rng),
        };

        let players = make_players(&params, &sigmas);

        Ok(Self {
            params,
            time_constraint,
            players,
            community_score: INITIAL_COMMUNITY_SCORE,
            rng,
        })
    }

    /// Game parameters.
    pub fn params(&self) -> &GameParameters {
        &self.params
    }

    /// Time constraint of this game instance.
    pub fn time_constraint(&self) -> f64 {
        self.time_constraint
    }

    /// Current community score in `[0, 100]`.
    pub fn community_score(&self) -> f64 {
        self.community_score
    }

    /// All players in profile order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Layer 1 players.
    pub fn layer1(&self) -> &[Player] {
        &self.players[..self.params.n_base_players]
    }

    /// Layer 2 players.
    pub fn layer2(&self) -> &[Player] {
        &self.players[self.params.n_base_players..]
    }

    /// Player at a profile index.
    pub fn player(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    /// Current bets in profile order.
    pub fn bets(&self) -> Vec<f64> {
        self.players.iter().map(|p| p.bet).collect()
    }

    /// Sigmas in profile order.
    pub fn sigmas(&self) -> Vec<f64> {
        self.players.iter().map(|p| p.sigma).collect()
    }

    /// Utility evaluator bound to the current state.
    pub fn payoff_model(&self) -> PayoffModel<'_> {
        PayoffModel::new(
            &self.params,
            &self.players,
            self.time_constraint,
            self.community_score,
        )
    }

    /// Replace the RNG with a freshly seeded one.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn check_index(&self, index: usize) -> Result<(), GameError> {
        if index < self.players.len() {
            Ok(())
        } else {
            Err(GameError::PlayerIndex {
                index,
                n_players: self.players.len(),
            })
        }
    }

    /// Place a bet for a player. The amount is clamped into `[0, max_bet]`.
    pub fn place_bet(&mut self, index: usize, amount: f64) -> Result<f64, GameError> {
        self.check_index(index)?;
        if !amount.is_finite() {
            return Err(GameError::InvalidBet(amount));
        }
        let max_bet = self.params.max_bet;
        Ok(self.players[index].place_bet(amount, max_bet))
    }

    /// Record a layer 2 player's prediction of the layer 1 outcome.
    pub fn make_prediction(&mut self, index: usize, prediction: bool) -> Result<(), GameError> {
        self.check_index(index)?;
        let player = &mut self.players[index];
        if player.is_base() {
            return Err(GameError::NotObserver(index));
        }
        player.prediction = Some(prediction);
        Ok(())
    }

    /// Alignment of a prospective bet with the current average bet.
    pub fn evaluate_bet_alignment(&self, amount: f64) -> f64 {
        let avg_bet = payoff::mean(&self.bets());
        1.0 - (amount - avg_bet).abs() / self.params.max_bet
    }

    /// Settle one round with the current bets and the given outcome.
    ///
    /// Layer 2 players without a prediction get a random one, and layer 2
    /// roles are reshuffled. Community score, reputations and cumulative
    /// profits are updated from the computed payoffs.
    pub fn run_game(&mut self, outcome: bool) -> RoundPayoffs {
        let n_base = self.params.n_base_players;

        for player in self.players[n_base..].iter_mut() {
            if player.prediction.is_none() {
                player.prediction = Some(self.rng.gen());
            }
        }

        let mut roles = Role::LAYER2_ROLES;
        roles.shuffle(&mut self.rng);
        for (k, player) in self.players[n_base..].iter_mut().enumerate() {
            player.role = roles[k % roles.len()];
        }

        let bets = self.bets();
        let layer2 = &self.players[n_base..];
        let predictions: Vec<bool> = layer2.iter().map(|p| p.prediction.unwrap_or(false)).collect();
        let layer2_roles: Vec<Role> = layer2.iter().map(|p| p.role).collect();

        let round = RoundPayoffs {
            outcome,
            layer1: payoff::layer1_payoffs(&bets[..n_base], outcome),
            layer2: payoff::layer2_payoffs(
                &self.params,
                &bets[n_base..],
                outcome,
                &predictions,
                &layer2_roles,
            ),
        };

        self.apply_settlement(&bets, &round.all());

        log::debug!(
            "round settled: outcome={} layer1={:?} layer2={:?} community_score={:.2}",
            outcome,
            round.layer1,
            round.layer2,
            self.community_score
        );

        round
    }

    fn apply_settlement(&mut self, bets: &[f64], payoffs: &[f64]) {
        let max_bet = self.params.max_bet;
        let avg_bet = payoff::mean(bets);

        self.community_score = payoff::updated_community_score(self.community_score, bets, max_bet);

        for ((player, &bet), &payoff) in self.players.iter_mut().zip(bets).zip(payoffs) {
            player.reputation =
                payoff::updated_reputation(player.reputation, bet, avg_bet, payoff, max_bet);
            player.record_profit(payoff);
        }
    }

    /// Play a round with random bets, random predictions and a random outcome.
    pub fn play_random_round(&mut self) -> RoundPayoffs {
        let max_bet = self.params.max_bet;
        let low = MIN_RANDOM_BET.min(max_bet);
        for player in self.players.iter_mut() {
            let amount = low + self.rng.gen::<f64>() * (max_bet - low);
            player.place_bet(amount, max_bet);
            if !player.is_base() {
                player.prediction = Some(self.rng.gen());
            }
        }
        let outcome = self.rng.gen();
        self.run_game(outcome)
    }

    /// Play a round where every player bets according to `profile`.
    ///
    /// Predictions and the outcome are drawn at random.
    pub fn settle_profile(&mut self, profile: &[f64]) -> Result<RoundPayoffs, GameError> {
        if profile.len() != self.players.len() {
            return Err(GameError::InvalidParameter(format!(
                "profile has {} entries for {} players",
                profile.len(),
                self.players.len()
            )));
        }
        if let Some(bad) = profile.iter().find(|x| !x.is_finite()) {
            return Err(GameError::InvalidBet(*bad));
        }

        let max_bet = self.params.max_bet;
        for (player, &amount) in self.players.iter_mut().zip(profile) {
            player.place_bet(amount, max_bet);
            if !player.is_base() {
                player.prediction = Some(self.rng.gen());
            }
        }
        let outcome = self.rng.gen();
        Ok(self.run_game(outcome))
    }

    /// Status snapshot for collaborators.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            community_score: self.community_score,
            players: self
                .players
                .iter()
                .enumerate()
                .map(|(id, p)| PlayerSnapshot {
                    id,
                    layer: p.layer,
                    role: p.role,
                    bet: p.bet,
                    reputation: p.reputation,
                    cumulative_profit: p.cumulative_profit,
                })
                .collect(),
        }
    }

    /// Start over with fresh players and the initial community score.
    pub fn reset(&mut self) {
        let sigmas = random_sigmas(self.params.n_players, &mut self.rng);
        self.players = make_players(&self.params, &sigmas);
        self.community_score = INITIAL_COMMUNITY_SCORE;
    }

    /// Transient copy with sigmas set from Bayesian types: `sigma = 1 + 0.5 * type`.
    pub fn with_type_sigmas(&self, types: &[usize]) -> GameState {
        let mut state = self.clone();
        for (player, &t) in state.players.iter_mut().zip(types) {
            player.sigma = type_sigma(t);
        }
        state
    }
}

impl Payoff for GameState {
    fn num_players(&self) -> usize {
        self.players.len()
    }

    fn max_bet(&self) -> f64 {
        self.params.max_bet
    }

    fn utility(&self, player: usize, x_i: f64, profile: &[f64]) -> f64 {
        self.payoff_model().utility(player, x_i, profile)
    }
}

/// Sigma of a player of the given Bayesian type.
pub fn type_sigma(type_index: usize) -> f64 {
    1.0 + 0.5 * type_index as f64
}

fn random_sigmas<R: Rng>(n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(SIGMA_RANGE)).collect()
}

fn make_players(params: &GameParameters, sigmas: &[f64]) -> Vec<Player> {
    let n_base = params.n_base_players;
    sigmas
        .iter()
        .enumerate()
        .map(|(i, &sigma)| {
            if i < n_base {
                Player::base(i, sigma)
            } else {
                Player::observer(i - n_base, sigma)
            }
        })
        .collect()
}
