//! Payoff model: strategic utility, settlement payoffs and post-round updates.
//!
//! The utility function is what the equilibrium solvers optimize. The
//! settlement functions are what a realized round pays out; they are
//! independent of the equilibrium search.

use crate::game::params::GameParameters;
use crate::game::player::{Player, Role};

/// Means closer to zero than this count as zero when computing alignment.
pub const MEAN_EPSILON: f64 = 1e-12;

/// Anything that assigns a utility to a player for a joint strategy profile.
///
/// This is the seam between the game model and the solvers: a solver only
/// needs the number of players, the strategy bound and the utility.
pub trait Payoff: Sync {
    /// Number of players (length of a strategy profile).
    fn num_players(&self) -> usize;

    /// Upper bound of every strategy. The lower bound is always 0.
    fn max_bet(&self) -> f64;

    /// Utility of `player` playing `x_i` when the full profile is `profile`.
    fn utility(&self, player: usize, x_i: f64, profile: &[f64]) -> f64;

    /// Sum of all players' utilities for a profile.
    fn total_utility(&self, profile: &[f64]) -> f64 {
        profile
            .iter()
            .enumerate()
            .map(|(i, &x)| self.utility(i, x, profile))
            .sum()
    }

    /// The neutral strategy: every player at `max_bet / 2`.
    fn neutral_profile(&self) -> Vec<f64> {
        vec![self.max_bet() / 2.0; self.num_players()]
    }
}

/// Utility evaluator bound to one game's parameters and player state.
#[derive(Debug, Clone, Copy)]
pub struct PayoffModel<'a> {
    params: &'a GameParameters,
    players: &'a [Player],
    time_constraint: f64,
    community_score: f64,
}

impl<'a> PayoffModel<'a> {
    /// Bind a model to the given state.
    pub fn new(
        params: &'a GameParameters,
        players: &'a [Player],
        time_constraint: f64,
        community_score: f64,
    ) -> Self {
        Self {
            params,
            players,
            time_constraint,
            community_score,
        }
    }

    /// Utility of player `i` betting `x_i` against the profile `profile`.
    ///
    /// `profile[j]` is matched with player `j`; `profile` must have one entry
    /// per player. The terms are applied in a fixed order because the observer
    /// multiplier scales everything accumulated before it.
    pub fn utility(&self, i: usize, x_i: f64, profile: &[f64]) -> f64 {
        let p = self.params;
        let player = &self.players[i];

        let mean_x = mean(profile);
        let total: f64 = profile.iter().sum();
        let (weighted, precision) = profile
            .iter()
            .zip(self.players)
            .fold((0.0, 0.0), |(weighted, precision), (&x, other)| {
                let inv_var = 1.0 / (other.sigma * other.sigma);
                (weighted + x * inv_var, precision + inv_var)
            });
        let pooled = if precision > 0.0 { weighted / precision } else { 0.0 };

        let time_factor = 1.0 - (p.alpha * self.time_constraint / 100.0).tanh();
        let group_benefit = (1.0 - (-p.alpha * total.max(0.0).sqrt()).exp()) * x_i * pooled;
        let deviation = x_i - mean_x;
        let info_component =
            (-(deviation * deviation) / (2.0 * player.sigma * player.sigma)).exp();
        let risk_aversion = (-x_i / 100.0).exp() * (1.0 - x_i / p.max_bet).powi(3);
        let cooperation_bonus = (-0.005 * deviation.abs()).exp();

        let mut payoff = p.base_payoff
            + time_factor * (group_benefit + info_component) * risk_aversion * cooperation_bonus;

        if player.is_base() {
            payoff += p.layer1_bonus;
        }
        if player.role == Role::Observer {
            payoff *= p.observer_multiplier;
        }

        payoff -= cost_function(x_i);

        let alignment = community_alignment(x_i, mean_x);
        payoff -= p.greed_factor * (x_i / p.max_bet - 0.7).exp() * (1.0 - alignment);
        payoff += p.community_factor * alignment * x_i * 5.0;
        payoff += p.stability_factor * (-0.3 * (deviation / 20.0).powi(2)).exp() * 2.0;
        payoff += p.reputation_factor * player.reputation * 4.0;

        // community score only shifts the base term
        payoff += p.base_payoff * 0.02 * self.community_score;

        payoff
    }
}

/// Cost of committing `x` to a bet.
pub fn cost_function(x: f64) -> f64 {
    0.004 * x.max(0.0).powf(1.6)
}

/// Alignment of a bet with the population mean: `1 - |x - mean| / mean`.
///
/// A zero mean means nobody bets, which counts as perfectly aligned.
pub fn community_alignment(x: f64, mean_x: f64) -> f64 {
    if mean_x.abs() < MEAN_EPSILON {
        1.0
    } else {
        1.0 - (x - mean_x).abs() / mean_x
    }
}

/// Alignment of a whole profile: `1 - mean(|x_j - mean|) / mean`.
pub fn profile_alignment(profile: &[f64]) -> f64 {
    let mean_x = mean(profile);
    if mean_x.abs() < MEAN_EPSILON {
        return 1.0;
    }
    let spread = mean(&profile.iter().map(|x| (x - mean_x).abs()).collect::<Vec<_>>());
    1.0 - spread / mean_x
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Winner-take-all payoffs for the base layer.
///
/// Index 0 wins when `outcome` is true, index 1 otherwise. The winner receives
/// the gross pot (its own stake included), every other player loses its bet.
pub fn layer1_payoffs(bets: &[f64], outcome: bool) -> Vec<f64> {
    let winner = if outcome { 0 } else { 1 };
    let pot: f64 = bets.iter().sum();
    let mut payoffs: Vec<f64> = bets.iter().map(|&bet| -bet).collect();
    if let Some(payoff) = payoffs.get_mut(winner) {
        *payoff = pot;
    }
    payoffs
}

/// Payoffs for the observer layer.
///
/// `bets`, `predictions` and `roles` are aligned per layer 2 player.
pub fn layer2_payoffs(
    params: &GameParameters,
    bets: &[f64],
    outcome: bool,
    predictions: &[bool],
    roles: &[Role],
) -> Vec<f64> {
    if bets.is_empty() {
        return Vec::new();
    }

    let avg_bet = mean(bets);
    let disagreement = predictions.iter().any(|&p| p != predictions[0]);

    bets.iter()
        .zip(predictions)
        .zip(roles)
        .map(|((&bet, &prediction), &role)| {
            let mut payoff = if prediction == outcome {
                bet * params.observer_multiplier
            } else {
                -bet
            };

            let deviation = (bet - avg_bet).abs() / params.max_bet;
            payoff -= deviation * bet * 0.5;

            if disagreement {
                payoff += role.disagreement_bonus();
            }

            payoff.max(0.0)
        })
        .collect()
}

/// Community score after a round with the given bets, clamped to `[0, 100]`.
pub fn updated_community_score(score: f64, bets: &[f64], max_bet: f64) -> f64 {
    if bets.is_empty() {
        return score;
    }

    let avg_bet = mean(bets);
    let mut score = if avg_bet <= max_bet / 2.0 {
        score + 1.0
    } else {
        score - 1.0
    };

    let spread = mean(&bets.iter().map(|b| (b - avg_bet).abs()).collect::<Vec<_>>());
    let alignment = 1.0 - spread / max_bet;
    score += alignment * 2.0;

    score.clamp(0.0, 100.0)
}

/// Reputation after a round, clamped to `[0, 1]`.
pub fn updated_reputation(
    reputation: f64,
    bet: f64,
    avg_bet: f64,
    payoff: f64,
    max_bet: f64,
) -> f64 {
    let bet_score = 1.0 - (bet - avg_bet).abs() / max_bet;
    let payoff_score = (payoff + max_bet) / (2.0 * max_bet);
    let change = 0.2 * (bet_score + payoff_score - 1.0);
    (reputation + change).clamp(0.0, 1.0)
}
