//! Bayesian-Nash equilibrium search over discrete player types.
//!
//! Each player draws a type from its own distribution; a type sets the
//! player's sigma to `1 + 0.5 * type`. A strategy is one bet per
//! (player, type) pair, and the objective is the expected total utility over
//! every joint type assignment:
//!
//! ```text
//! E[U] = Σ_c  Π_i p_i(c_i) · Σ_i u_i(X_c)      X_c[i] = s[i][c_i]
//! ```
//!
//! The number of joint assignments is `Π_i |types_i|`, so a solve costs that
//! many utility sweeps per objective evaluation (3 types at 5 players is 243).
//! Requests above [`SolverConfig::max_type_combinations`] are rejected.

use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::game::payoff::{mean, profile_alignment};
use crate::game::{GameState, Payoff};
use crate::solver::config::{SolveStats, SolverConfig, SolverError};
use crate::solver::optimize::{Bounds, Budget, FallbackChain};

/// Probabilities summing to 1 within this tolerance are accepted.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Discrete distribution over one player's types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDistribution {
    probabilities: Vec<f64>,
}

impl TypeDistribution {
    /// Distribution with the given probabilities (validated by the solver).
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self { probabilities }
    }

    /// Uniform distribution over `n_types` types.
    pub fn uniform(n_types: usize) -> Self {
        Self::new(vec![1.0 / n_types as f64; n_types])
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// Whether the distribution has no types.
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Probability of a type.
    pub fn probability(&self, type_index: usize) -> f64 {
        self.probabilities.get(type_index).copied().unwrap_or(0.0)
    }

    /// All probabilities.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Check the distribution of `player`.
    pub fn validate(&self, player: usize) -> Result<(), SolverError> {
        let invalid = |reason: String| SolverError::InvalidTypeDistribution { player, reason };

        if self.probabilities.is_empty() {
            return Err(invalid("no types".to_string()));
        }
        if let Some(p) = self
            .probabilities
            .iter()
            .find(|p| !(p.is_finite() && **p >= 0.0))
        {
            return Err(invalid(format!("probability {} is not a valid weight", p)));
        }
        let total: f64 = self.probabilities.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(invalid(format!("probabilities sum to {}", total)));
        }
        Ok(())
    }
}

/// Which objective a Bayesian solve maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BayesianObjective {
    /// Expected total utility.
    Standard,
    /// Expected total utility plus a community-alignment bonus per
    /// type assignment.
    Community,
}

/// Strategies indexed by (player, type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStrategies {
    offsets: Vec<usize>,
    values: Vec<f64>,
}

impl TypeStrategies {
    fn from_flat(offsets: Vec<usize>, values: Vec<f64>) -> Self {
        Self { offsets, values }
    }

    /// Number of players.
    pub fn num_players(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Strategy of `player` when it has type `type_index`.
    pub fn get(&self, player: usize, type_index: usize) -> Option<f64> {
        self.for_player(player)?.get(type_index).copied()
    }

    /// Strategies of every type of `player`.
    pub fn for_player(&self, player: usize) -> Option<&[f64]> {
        let start = *self.offsets.get(player)?;
        let end = *self.offsets.get(player + 1)?;
        Some(&self.values[start..end])
    }

    /// Flattened strategies, player-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// `(player, type) -> strategy` map.
    pub fn to_map(&self) -> FxHashMap<(usize, usize), f64> {
        let mut map = FxHashMap::default();
        for player in 0..self.num_players() {
            if let Some(strategies) = self.for_player(player) {
                for (t, &s) in strategies.iter().enumerate() {
                    map.insert((player, t), s);
                }
            }
        }
        map
    }
}

/// Outcome of a Bayesian solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianResult {
    /// Strategy per (player, type); neutral if every optimizer failed.
    pub strategies: TypeStrategies,
    /// Objective that was maximized.
    pub objective: BayesianObjective,
    /// Whether some optimizer in the chain succeeded.
    pub success: bool,
    /// Whether no (player, type) can gain more than `epsilon` by deviating.
    pub verified: bool,
    /// Objective value at `strategies`.
    pub expected_utility: f64,
    /// Number of type assignments enumerated.
    pub combinations: usize,
    /// Human-readable diagnostic.
    pub message: String,
    /// Solve statistics.
    pub stats: SolveStats,
}

/// One joint type assignment and the transient state it induces.
struct Combination {
    types: Vec<usize>,
    probability: f64,
    state: GameState,
}

/// The enumerated type space of one request.
struct TypeSpace {
    offsets: Vec<usize>,
    combinations: Vec<Combination>,
    community_factor: f64,
}

impl TypeSpace {
    fn build(
        state: &GameState,
        distributions: &[TypeDistribution],
        limit: usize,
    ) -> Result<Self, SolverError> {
        let expected = state.num_players();
        if distributions.len() != expected {
            return Err(SolverError::DistributionCount {
                got: distributions.len(),
                expected,
            });
        }
        for (player, distribution) in distributions.iter().enumerate() {
            distribution.validate(player)?;
        }

        let count = distributions
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len()))
            .unwrap_or(usize::MAX);
        if count > limit {
            return Err(SolverError::CombinatorialOverflow {
                combinations: count,
                limit,
            });
        }

        let mut offsets = Vec::with_capacity(expected + 1);
        offsets.push(0);
        for d in distributions {
            offsets.push(offsets[offsets.len() - 1] + d.len());
        }

        let mut combinations = Vec::with_capacity(count);
        let mut types = vec![0usize; expected];
        loop {
            let probability: f64 = types
                .iter()
                .zip(distributions)
                .map(|(&t, d)| d.probability(t))
                .product();
            if probability > 0.0 {
                combinations.push(Combination {
                    types: types.clone(),
                    probability,
                    state: state.with_type_sigmas(&types),
                });
            }

            // odometer increment, last player fastest
            let mut k = expected;
            loop {
                if k == 0 {
                    return Ok(Self {
                        offsets,
                        combinations,
                        community_factor: state.params().community_factor,
                    });
                }
                k -= 1;
                types[k] += 1;
                if types[k] < distributions[k].len() {
                    break;
                }
                types[k] = 0;
            }
        }
    }

    fn dimension(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    fn profile(&self, types: &[usize], strategies: &[f64]) -> Vec<f64> {
        types
            .iter()
            .enumerate()
            .map(|(i, &t)| strategies[self.offsets[i] + t])
            .collect()
    }

    fn combination_value(
        &self,
        combination: &Combination,
        strategies: &[f64],
        objective: BayesianObjective,
    ) -> f64 {
        let profile = self.profile(&combination.types, strategies);
        let model = combination.state.payoff_model();
        let mut value: f64 = profile
            .iter()
            .enumerate()
            .map(|(i, &x)| model.utility(i, x, &profile))
            .sum();
        if objective == BayesianObjective::Community {
            value += self.community_factor * profile_alignment(&profile) * mean(&profile) * 5.0;
        }
        combination.probability * value
    }

    fn expected_value(
        &self,
        strategies: &[f64],
        objective: BayesianObjective,
        parallel: bool,
    ) -> f64 {
        if parallel {
            self.combinations
                .par_iter()
                .map(|c| self.combination_value(c, strategies, objective))
                .sum()
        } else {
            self.combinations
                .iter()
                .map(|c| self.combination_value(c, strategies, objective))
                .sum()
        }
    }

    /// Expected utility of `player` with type `type_index`, conditional on
    /// that type, when it plays `strategy` and everyone else follows
    /// `strategies`.
    fn conditional_utility(
        &self,
        player: usize,
        type_index: usize,
        strategy: f64,
        strategies: &[f64],
    ) -> f64 {
        let mut weight = 0.0;
        let mut total = 0.0;
        for c in self
            .combinations
            .iter()
            .filter(|c| c.types[player] == type_index)
        {
            let mut profile = self.profile(&c.types, strategies);
            profile[player] = strategy;
            total += c.probability * c.state.utility(player, strategy, &profile);
            weight += c.probability;
        }
        if weight > 0.0 {
            total / weight
        } else {
            0.0
        }
    }

    fn check(
        &self,
        strategies: &[f64],
        bounds: Bounds,
        epsilon: f64,
        budget: &Budget,
    ) -> bool {
        let chain = FallbackChain::local();
        for player in 0..self.offsets.len() - 1 {
            for type_index in 0..self.offsets[player + 1] - self.offsets[player] {
                if !self.combinations.iter().any(|c| c.types[player] == type_index) {
                    continue;
                }
                let slot = self.offsets[player] + type_index;
                let current = self.conditional_utility(player, type_index, strategies[slot], strategies);
                let own = |y: &[f64]| -self.conditional_utility(player, type_index, y[0], strategies);
                if let Some((minimum, _)) =
                    chain.run(&own, &[strategies[slot]], bounds, budget).minimum
                {
                    if -minimum.value > current + epsilon {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Bayesian-Nash solver for both the standard and the community objective.
#[derive(Debug, Clone, Default)]
pub struct BayesianSolver {
    config: SolverConfig,
}

impl BayesianSolver {
    /// Create a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Maximize the expected objective over (player, type) strategies.
    ///
    /// Invalid requests are rejected with an error. Optimizer exhaustion is
    /// not an error: neutral strategies are returned with `success = false`.
    pub fn solve(
        &self,
        state: &GameState,
        distributions: &[TypeDistribution],
        objective: BayesianObjective,
    ) -> Result<BayesianResult, SolverError> {
        self.config.validate()?;
        let start = Instant::now();
        let space = TypeSpace::build(state, distributions, self.config.max_type_combinations)?;
        log::debug!(
            "bayesian solve: {} strategies, {} type combinations",
            space.dimension(),
            space.combinations.len()
        );

        let bounds = Bounds::new(0.0, state.max_bet());
        let neutral = vec![bounds.midpoint(); space.dimension()];
        let parallel = self.config.parallel;
        let f = |s: &[f64]| -space.expected_value(s, objective, parallel);

        let outcome = FallbackChain::from_config(&self.config).run(
            &f,
            &neutral,
            bounds,
            &Budget::from_config(&self.config, self.config.deadline()),
        );

        let mut stats = SolveStats::new();
        stats.failures = outcome.failures;

        let (strategies, success, verified, message) = match outcome.minimum {
            Some((minimum, method)) => {
                stats.method = Some(method.to_string());
                stats.iterations = minimum.iterations;
                let verified = space.check(
                    &minimum.x,
                    bounds,
                    self.config.epsilon,
                    &Budget::best_response(&self.config, bounds.width()),
                );
                let message = format!("{} converged after {} iterations", method, minimum.iterations);
                (minimum.x, true, verified, message)
            }
            None => {
                log::warn!(
                    "every optimizer failed for the {:?} objective ({}); returning neutral strategies",
                    objective,
                    stats.failures.join("; ")
                );
                (
                    neutral,
                    false,
                    false,
                    "optimization failed; returned neutral strategies".to_string(),
                )
            }
        };

        stats.elapsed_seconds = start.elapsed().as_secs_f64();

        Ok(BayesianResult {
            expected_utility: space.expected_value(&strategies, objective, parallel),
            strategies: TypeStrategies::from_flat(space.offsets.clone(), strategies),
            objective,
            success,
            verified,
            combinations: space.combinations.len(),
            message,
            stats,
        })
    }

    /// Bayesian ε-equilibrium check.
    ///
    /// Each (player, type) strategy is re-optimized over the type assignments
    /// consistent with that type, weighted by conditional probability.
    pub fn is_equilibrium(
        &self,
        state: &GameState,
        distributions: &[TypeDistribution],
        strategies: &TypeStrategies,
    ) -> Result<bool, SolverError> {
        let space = TypeSpace::build(state, distributions, self.config.max_type_combinations)?;
        let bounds = Bounds::new(0.0, state.max_bet());
        if strategies.as_slice().len() != space.dimension()
            || strategies
                .as_slice()
                .iter()
                .any(|&x| !(bounds.lower..=bounds.upper).contains(&x))
        {
            return Ok(false);
        }
        Ok(space.check(
            strategies.as_slice(),
            bounds,
            self.config.epsilon,
            &Budget::best_response(&self.config, bounds.width()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameParameters;
    use approx::assert_abs_diff_eq;

    fn small_game() -> GameState {
        let params = GameParameters::default().with_players(3, 2);
        GameState::with_seed(params, 40.0, 5).unwrap()
    }

    fn config() -> SolverConfig {
        SolverConfig::fast().with_seed(9)
    }

    #[test]
    fn test_distribution_validation() {
        assert!(TypeDistribution::uniform(3).validate(0).is_ok());
        assert!(TypeDistribution::new(vec![0.2, 0.8]).validate(0).is_ok());
        assert!(matches!(
            TypeDistribution::new(vec![0.5, 0.4]).validate(2),
            Err(SolverError::InvalidTypeDistribution { player: 2, .. })
        ));
        assert!(TypeDistribution::new(vec![]).validate(0).is_err());
        assert!(TypeDistribution::new(vec![1.5, -0.5]).validate(0).is_err());
    }

    #[test]
    fn test_combination_overflow_is_rejected() {
        let params = GameParameters::default().with_players(12, 2);
        let state = GameState::with_seed(params, 40.0, 1).unwrap();
        let dists = vec![TypeDistribution::uniform(3); 12];

        let result = BayesianSolver::new(SolverConfig::default())
            .solve(&state, &dists, BayesianObjective::Standard);
        assert_eq!(
            result.unwrap_err(),
            SolverError::CombinatorialOverflow {
                combinations: 531_441,
                limit: 100_000
            }
        );
    }

    #[test]
    fn test_distribution_count_mismatch() {
        let state = small_game();
        let result = BayesianSolver::new(config()).solve(
            &state,
            &[TypeDistribution::uniform(2)],
            BayesianObjective::Standard,
        );
        assert_eq!(
            result.unwrap_err(),
            SolverError::DistributionCount { got: 1, expected: 3 }
        );
    }

    #[test]
    fn test_solve_returns_strategy_per_player_type() {
        let state = small_game();
        let dists = vec![
            TypeDistribution::uniform(2),
            TypeDistribution::new(vec![0.3, 0.7]),
            TypeDistribution::uniform(3),
        ];

        let result = BayesianSolver::new(config())
            .solve(&state, &dists, BayesianObjective::Standard)
            .unwrap();

        assert!(result.success);
        assert_eq!(result.combinations, 12);
        assert_eq!(result.strategies.as_slice().len(), 7);
        assert_eq!(result.strategies.for_player(2).unwrap().len(), 3);
        assert!(result.strategies.get(1, 2).is_none());
        assert!(result.expected_utility.is_finite());

        let map = result.strategies.to_map();
        assert_eq!(map.len(), 7);
        for (&(player, t), &s) in &map {
            assert!((0.0..=80.0).contains(&s));
            assert_eq!(result.strategies.get(player, t), Some(s));
        }
    }

    #[test]
    fn test_standard_solve_improves_on_neutral_strategies() {
        let state = small_game();
        let dists = vec![TypeDistribution::new(vec![0.7, 0.3]); 3];
        let space = TypeSpace::build(&state, &dists, 1000).unwrap();
        let neutral = space.expected_value(&[40.0; 6], BayesianObjective::Standard, false);

        let result = BayesianSolver::new(config())
            .solve(&state, &dists, BayesianObjective::Standard)
            .unwrap();

        assert!(result.success);
        assert_ne!(result.stats.method.as_deref(), Some("projected-gradient"));
        assert!(result.strategies.as_slice().iter().any(|&s| (s - 40.0).abs() > 1.0));
        assert!(result.expected_utility > neutral + 1.0);
    }

    #[test]
    fn test_probabilities_within_tolerance_are_accepted() {
        assert!(TypeDistribution::new(vec![0.7, 0.3 + 5e-7]).validate(0).is_ok());
        assert!(TypeDistribution::new(vec![0.7, 0.3 + 5e-6]).validate(0).is_err());
    }

    #[test]
    fn test_community_objective_adds_alignment_bonus() {
        let state = small_game();
        let dists = vec![TypeDistribution::uniform(2); 3];
        let space = TypeSpace::build(&state, &dists, 1000).unwrap();

        let strategies = vec![30.0; space.dimension()];
        let standard = space.expected_value(&strategies, BayesianObjective::Standard, false);
        let community = space.expected_value(&strategies, BayesianObjective::Community, false);
        // every profile is uniform: alignment 1, mean 30
        assert_abs_diff_eq!(community - standard, 150.0, epsilon = 1e-9);

        let parallel = space.expected_value(&strategies, BayesianObjective::Community, true);
        assert_abs_diff_eq!(parallel, community, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_types_match_the_sigma_rule() {
        let state = small_game();
        let dists = vec![TypeDistribution::new(vec![0.0, 1.0]); 3];
        let space = TypeSpace::build(&state, &dists, 1000).unwrap();

        assert_eq!(space.combinations.len(), 1);
        let only = &space.combinations[0];
        assert_eq!(only.types, vec![1, 1, 1]);
        assert_eq!(only.state.sigmas(), vec![1.5, 1.5, 1.5]);

        let strategies = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let profile = [20.0, 40.0, 60.0];
        let expected = only.state.total_utility(&profile);
        assert_abs_diff_eq!(
            space.expected_value(&strategies, BayesianObjective::Standard, false),
            expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_is_equilibrium_rejects_malformed_strategies() {
        let state = small_game();
        let dists = vec![TypeDistribution::uniform(2); 3];
        let solver = BayesianSolver::new(config());
        let wrong = TypeStrategies::from_flat(vec![0, 1, 2, 3], vec![1.0, 2.0, 3.0]);
        assert!(!solver.is_equilibrium(&state, &dists, &wrong).unwrap());
    }
}
