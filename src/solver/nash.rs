//! Pure-strategy Nash equilibrium search.
//!
//! The solver first maximizes total welfare `Σ_i u_i(X_i, X)` from the
//! neutral profile through the optimizer [`FallbackChain`]. A welfare optimum
//! is generally not an equilibrium, so the point is then refined with
//! Gauss-Seidel best-response sweeps: each player in turn moves to its local
//! best response when that improves its own utility by more than `epsilon`.
//! A sweep that changes nothing proves the profile passes [`is_equilibrium`]
//! with the same `epsilon`, because both use the same deterministic local
//! optimizer.
//!
//! Utilities have kinks at `x_i = mean(X)`, and equilibria often sit on them
//! with every player at the same bet, so best responses are located with a
//! tolerance tied to `epsilon` (see [`Budget::best_response`]).

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::game::Payoff;
use crate::solver::config::{SolveStats, SolverConfig};
use crate::solver::optimize::{Bounds, Budget, FallbackChain};

/// Outcome of a Nash solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumResult {
    /// Equilibrium candidate (the neutral profile if every optimizer failed).
    pub profile: Vec<f64>,

    /// Welfare optimum the refinement started from.
    pub welfare_profile: Vec<f64>,

    /// Whether some optimizer in the chain succeeded.
    pub success: bool,

    /// Whether a best-response sweep found no profitable deviation.
    pub verified: bool,

    /// Sum of utilities at `profile`.
    pub total_utility: f64,

    /// Human-readable diagnostic.
    pub message: String,

    /// Solve statistics.
    pub stats: SolveStats,
}

/// Nash equilibrium solver.
#[derive(Debug, Clone, Default)]
pub struct NashSolver {
    config: SolverConfig,
}

impl NashSolver {
    /// Create a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn local_budget(&self, max_bet: f64) -> Budget {
        Budget::best_response(&self.config, max_bet)
    }

    /// Search for an equilibrium of `game`.
    ///
    /// Never fails: if every optimizer gives up, the neutral profile
    /// `[max_bet / 2; n]` is returned with `success = false`.
    pub fn solve<P: Payoff + ?Sized>(&self, game: &P) -> EquilibriumResult {
        let start = Instant::now();
        let deadline = self.config.deadline();
        let bounds = Bounds::new(0.0, game.max_bet());
        let neutral = game.neutral_profile();

        let objective = |x: &[f64]| -game.total_utility(x);
        let chain = FallbackChain::from_config(&self.config);
        let outcome = chain.run(
            &objective,
            &neutral,
            bounds,
            &Budget::from_config(&self.config, deadline),
        );

        let mut stats = SolveStats::new();
        stats.failures = outcome.failures;

        let (minimum, method) = match outcome.minimum {
            Some(found) => found,
            None => {
                log::warn!(
                    "every optimizer failed ({}); falling back to the neutral profile",
                    stats.failures.join("; ")
                );
                stats.elapsed_seconds = start.elapsed().as_secs_f64();
                return EquilibriumResult {
                    total_utility: game.total_utility(&neutral),
                    welfare_profile: neutral.clone(),
                    profile: neutral,
                    success: false,
                    verified: false,
                    message: "optimization failed; returned neutral strategy".to_string(),
                    stats,
                };
            }
        };

        stats.method = Some(method.to_string());
        stats.iterations = minimum.iterations;

        let welfare_profile = minimum.x;
        let mut profile = welfare_profile.clone();
        let verified = if self.config.refine_best_response {
            let (sweeps, settled) = self.refine(game, &mut profile, bounds, deadline);
            stats.refinement_sweeps = sweeps;
            settled
        } else {
            self.is_equilibrium(game, &profile)
        };

        stats.elapsed_seconds = start.elapsed().as_secs_f64();

        let message = if verified {
            format!("{} converged; no profitable unilateral deviation", method)
        } else {
            format!("{} converged; best-response check not satisfied", method)
        };
        log::info!(
            "nash solve: {} ({} sweeps, {:.3}s)",
            message,
            stats.refinement_sweeps,
            stats.elapsed_seconds
        );

        EquilibriumResult {
            total_utility: game.total_utility(&profile),
            profile,
            welfare_profile,
            success: true,
            verified,
            message,
            stats,
        }
    }

    /// Gauss-Seidel best-response sweeps. Returns the number of sweeps and
    /// whether the last sweep left the profile unchanged.
    fn refine<P: Payoff + ?Sized>(
        &self,
        game: &P,
        profile: &mut [f64],
        bounds: Bounds,
        deadline: Option<Instant>,
    ) -> (usize, bool) {
        let budget = self.local_budget(bounds.width());
        let epsilon = self.config.epsilon;

        for sweep in 1..=self.config.max_refinement_sweeps {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                log::warn!("time budget exhausted after {} refinement sweeps", sweep - 1);
                return (sweep - 1, false);
            }

            let mut changed = false;
            for i in 0..profile.len() {
                let current = game.utility(i, profile[i], profile);
                let (strategy, utility) = best_response(game, i, profile, bounds, &budget);
                if utility > current + epsilon {
                    profile[i] = strategy;
                    changed = true;
                }
            }

            log::debug!("refinement sweep {}: changed={}", sweep, changed);
            if !changed {
                return (sweep, true);
            }
        }

        (self.config.max_refinement_sweeps, false)
    }

    /// ε-Nash check with this solver's epsilon and optimizer budget.
    pub fn is_equilibrium<P: Payoff + ?Sized>(&self, game: &P, profile: &[f64]) -> bool {
        check_deviations(
            game,
            profile,
            self.config.epsilon,
            &self.local_budget(game.max_bet()),
        )
    }
}

/// ε-Nash check: no player can gain more than `epsilon` by locally
/// re-optimizing its own coordinate with everyone else held fixed.
///
/// Uses the default solver tolerances, tightened for `epsilon`. Profiles of
/// the wrong length or outside `[0, max_bet]` are never equilibria.
pub fn is_equilibrium<P: Payoff + ?Sized>(game: &P, profile: &[f64], epsilon: f64) -> bool {
    let config = SolverConfig::default().with_epsilon(epsilon);
    let budget = Budget::best_response(&config, game.max_bet());
    check_deviations(game, profile, epsilon, &budget)
}

fn check_deviations<P: Payoff + ?Sized>(
    game: &P,
    profile: &[f64],
    epsilon: f64,
    budget: &Budget,
) -> bool {
    let bounds = Bounds::new(0.0, game.max_bet());
    if profile.len() != game.num_players()
        || profile.iter().any(|&x| !(bounds.lower..=bounds.upper).contains(&x))
    {
        return false;
    }

    (0..profile.len()).all(|i| {
        let current = game.utility(i, profile[i], profile);
        let (_, best) = best_response(game, i, profile, bounds, budget);
        best <= current + epsilon
    })
}

/// Local best response of `player` to `profile`, starting from its current
/// strategy. Returns `(strategy, utility)`.
///
/// Deterministic: the same inputs always give the same answer. If the local
/// optimizers fail, the current strategy is kept.
pub fn best_response<P: Payoff + ?Sized>(
    game: &P,
    player: usize,
    profile: &[f64],
    bounds: Bounds,
    budget: &Budget,
) -> (f64, f64) {
    let own = |y: &[f64]| {
        let mut deviated = profile.to_vec();
        deviated[player] = y[0];
        -game.utility(player, y[0], &deviated)
    };

    let current = profile[player];
    let current_utility = game.utility(player, current, profile);

    match FallbackChain::local()
        .run(&own, &[current], bounds, budget)
        .minimum
    {
        Some((minimum, _)) if -minimum.value > current_utility => (minimum.x[0], -minimum.value),
        _ => (current, current_utility),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameParameters, GameState};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Cournot duopoly: `u_i = x_i (a - Σx) - c x_i`.
    ///
    /// The Nash point is `(a - c) / 3` each, while joint welfare peaks at a
    /// total of `(a - c) / 2`.
    struct Cournot;

    impl Payoff for Cournot {
        fn num_players(&self) -> usize {
            2
        }

        fn max_bet(&self) -> f64 {
            80.0
        }

        fn utility(&self, _player: usize, x_i: f64, profile: &[f64]) -> f64 {
            let total: f64 = profile.iter().sum();
            x_i * (100.0 - total) - 10.0 * x_i
        }
    }

    struct Broken;

    impl Payoff for Broken {
        fn num_players(&self) -> usize {
            3
        }

        fn max_bet(&self) -> f64 {
            80.0
        }

        fn utility(&self, _player: usize, _x_i: f64, _profile: &[f64]) -> f64 {
            f64::NAN
        }
    }

    fn solver() -> NashSolver {
        NashSolver::new(SolverConfig::default().with_seed(11))
    }

    #[test]
    fn test_refinement_moves_welfare_point_to_equilibrium() {
        let result = solver().solve(&Cournot);

        assert!(result.success);
        assert!(result.verified);
        assert_abs_diff_eq!(result.welfare_profile.iter().sum::<f64>(), 45.0, epsilon = 0.1);
        assert_abs_diff_eq!(result.profile[0], 30.0, epsilon = 0.05);
        assert_abs_diff_eq!(result.profile[1], 30.0, epsilon = 0.05);
        assert!(result.stats.refinement_sweeps > 1);
    }

    #[test]
    fn test_is_equilibrium_on_known_points() {
        assert!(is_equilibrium(&Cournot, &[30.0, 30.0], 1e-6));
        assert!(!is_equilibrium(&Cournot, &[22.5, 22.5], 1e-6));
        assert!(!is_equilibrium(&Cournot, &[30.0], 1e-6));
        assert!(!is_equilibrium(&Cournot, &[30.0, 95.0], 1e-6));
    }

    #[test]
    fn test_exhausted_chain_returns_neutral_profile() {
        let config = SolverConfig::fast().with_seed(1);
        let result = NashSolver::new(config).solve(&Broken);

        assert!(!result.success);
        assert!(!result.verified);
        assert_eq!(result.profile, vec![40.0; 3]);
        assert_eq!(result.stats.failures.len(), 4);
        assert!(result.stats.method.is_none());
    }

    fn random_game(rng: &mut StdRng, seed: u64) -> GameState {
        let params = GameParameters {
            alpha: rng.gen_range(0.05..0.5),
            greed_factor: rng.gen_range(0.05..0.4),
            community_factor: rng.gen_range(0.2..1.5),
            stability_factor: rng.gen_range(0.1..0.5),
            max_bet: rng.gen_range(40.0..120.0),
            ..GameParameters::default()
        };
        let time_constraint = rng.gen_range(10.0..100.0);
        GameState::with_seed(params, time_constraint, seed).unwrap()
    }

    #[test]
    fn test_solutions_are_equilibria_across_random_games() {
        let solver = solver();
        let mut rng = StdRng::seed_from_u64(2024);
        let draws = 20;
        let mut equilibria = 0;

        for seed in 0..draws {
            let game = random_game(&mut rng, seed);
            let result = solver.solve(&game);

            assert!(result.success);
            assert!(result.total_utility.is_finite());
            assert!(result
                .profile
                .iter()
                .all(|&x| (0.0..=game.max_bet()).contains(&x)));
            if result.verified {
                assert!(solver.is_equilibrium(&game, &result.profile));
                assert!(is_equilibrium(&game, &result.profile, 1e-6));
                equilibria += 1;
            }
        }

        // at least 95% of draws
        assert!(equilibria * 100 >= draws * 95, "{}/{} verified", equilibria, draws);
    }

    #[test]
    fn test_welfare_stage_leaves_the_neutral_profile() {
        let game = GameState::with_sigmas(
            GameParameters::default(),
            40.0,
            vec![1.0, 0.8, 1.2, 0.9, 1.1],
            Some(5),
        )
        .unwrap();
        let result = solver().solve(&game);

        assert_ne!(result.stats.method.as_deref(), Some("projected-gradient"));
        assert!(result.welfare_profile.iter().any(|&x| (x - 40.0).abs() > 1.0));
        assert!(game.total_utility(&result.welfare_profile) > game.total_utility(&[40.0; 5]));
        assert!(result.verified);
    }

    #[test]
    fn test_best_response_never_worse_than_current() {
        let game = GameState::with_seed(GameParameters::default(), 60.0, 3).unwrap();
        let profile = [10.0, 70.0, 40.0, 5.0, 80.0];
        let budget = Budget::from_config(&SolverConfig::default(), None);
        let bounds = Bounds::new(0.0, 80.0);

        for i in 0..5 {
            let (strategy, utility) = best_response(&game, i, &profile, bounds, &budget);
            assert!((0.0..=80.0).contains(&strategy));
            assert!(utility >= game.utility(i, profile[i], &profile));
        }
    }
}
