//! Generation loop of the evolutionary simulator.

use ndarray::{Array2, Axis};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::evolution::config::EvolutionConfig;
use crate::game::payoff::{mean, profile_alignment};
use crate::game::{GameState, Payoff};
use crate::solver::{ConfigError, NashSolver};

/// Statistics of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Generation number, starting at 1.
    pub generation: usize,
    /// Per-player mean strategy after mutation and crossover.
    pub mean_strategy: Vec<f64>,
    /// Mean fitness of the evaluated population.
    pub mean_fitness: f64,
    /// Euclidean distance from `mean_strategy` to the Nash target.
    pub distance_to_equilibrium: f64,
    /// Every fitness was zero; selection was replaced by noise.
    pub degenerate: bool,
}

/// Full trajectory of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// One record per generation.
    pub history: Vec<GenerationRecord>,
    /// Nash target the distances are measured to.
    pub equilibrium: Vec<f64>,
    /// Whether the target solve succeeded (otherwise the target is neutral).
    pub equilibrium_found: bool,
    /// Mean strategy of the final population.
    pub final_mean_strategy: Vec<f64>,
}

impl EvolutionResult {
    /// Generations that triggered the zero-fitness recovery.
    pub fn degenerate_generations(&self) -> usize {
        self.history.iter().filter(|r| r.degenerate).count()
    }

    /// Distance to the target after the last generation.
    pub fn final_distance(&self) -> Option<f64> {
        self.history.last().map(|r| r.distance_to_equilibrium)
    }
}

/// Population-based approximation of equilibrium play.
///
/// The population is an `n_players × population_size` matrix: each column is
/// one individual's full strategy profile. Generations run fitness
/// evaluation, fitness-proportional selection, Gaussian mutation and
/// single-cut crossover. There is no early stop; convergence to the Nash
/// target is observed, not enforced.
#[derive(Debug, Clone)]
pub struct EvolutionarySimulator {
    config: EvolutionConfig,
    mutation: Normal<f64>,
}

impl EvolutionarySimulator {
    /// Create a simulator after validating `config`.
    pub fn new(config: EvolutionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mutation = Normal::new(0.0, config.mutation_std)
            .map_err(|_| ConfigError::InvalidSpread(config.mutation_std))?;
        Ok(Self { config, mutation })
    }

    /// Simulator configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Evolve a population on `state`'s payoff landscape.
    pub fn run(&self, state: &GameState, generations: usize) -> EvolutionResult {
        self.run_with_callback(state, generations, |_| {})
    }

    /// Evolve a population, calling `callback` after every generation.
    pub fn run_with_callback<F>(
        &self,
        state: &GameState,
        generations: usize,
        mut callback: F,
    ) -> EvolutionResult
    where
        F: FnMut(&GenerationRecord),
    {
        let target = NashSolver::new(self.config.solver.clone()).solve(state);
        if !target.success {
            log::warn!("nash target unavailable, measuring distance to the neutral profile");
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let n = state.num_players();
        let size = self.config.population_size;
        let max_bet = state.max_bet();
        let mut population =
            Array2::from_shape_fn((n, size), |_| rng.gen::<f64>() * max_bet);

        let mut history = Vec::with_capacity(generations);
        for generation in 1..=generations {
            let round_seed: u64 = rng.gen();
            let fitness: Vec<f64> = (0..size)
                .into_par_iter()
                .map(|k| {
                    let strategy = population.column(k).to_vec();
                    individual_fitness(state, &strategy, round_seed.wrapping_add(k as u64))
                })
                .collect();
            let mean_fitness = mean(&fitness);

            let degenerate =
                !select_or_perturb(&mut population, &fitness, self.config.recovery_noise, &mut rng);
            if degenerate {
                log::warn!(
                    "generation {}: every fitness is zero, perturbing the population",
                    generation
                );
            }

            for x in population.iter_mut() {
                *x = (*x + self.mutation.sample(&mut rng)).clamp(0.0, max_bet);
            }
            crossover(&mut population, self.config.crossover_events, &mut rng);

            let mean_strategy = column_mean(&population);
            let record = GenerationRecord {
                generation,
                distance_to_equilibrium: euclidean(&mean_strategy, &target.profile),
                mean_strategy,
                mean_fitness,
                degenerate,
            };
            log::debug!(
                "generation {}: mean fitness {:.3}, distance {:.3}",
                generation,
                record.mean_fitness,
                record.distance_to_equilibrium
            );
            callback(&record);
            history.push(record);
        }

        EvolutionResult {
            history,
            equilibrium: target.profile,
            equilibrium_found: target.success,
            final_mean_strategy: column_mean(&population),
        }
    }
}

/// Fitness of one individual: the payoffs of one round played with its own
/// bets, plus the community term, floored at 0.
pub fn individual_fitness(state: &GameState, strategy: &[f64], seed: u64) -> f64 {
    let mut game = state.clone();
    game.reseed(seed);
    let community =
        state.params().community_factor * profile_alignment(strategy) * mean(strategy) * 5.0;

    match game.settle_profile(strategy) {
        Ok(round) => {
            let value = round.layer1_total() + round.layer2_total() + community;
            if value.is_finite() {
                value.max(0.0)
            } else {
                0.0
            }
        }
        Err(_) => 0.0,
    }
}

/// Fitness-proportional resampling of the columns.
///
/// Returns `false` when the weights are unusable (all zero); the population is
/// then shifted by `U(0, noise)` noise instead.
fn select_or_perturb<R: Rng>(
    population: &mut Array2<f64>,
    fitness: &[f64],
    noise: f64,
    rng: &mut R,
) -> bool {
    match WeightedIndex::new(fitness) {
        Ok(weights) => {
            let picks: Vec<usize> = (0..fitness.len()).map(|_| weights.sample(rng)).collect();
            let previous = population.clone();
            *population = Array2::from_shape_fn(previous.dim(), |(i, k)| previous[[i, picks[k]]]);
            true
        }
        Err(_) => {
            if noise > 0.0 {
                for x in population.iter_mut() {
                    *x += rng.gen_range(0.0..noise);
                }
            }
            false
        }
    }
}

/// Swap the coordinates before a random cut between pairs of individuals.
fn crossover<R: Rng>(population: &mut Array2<f64>, events: usize, rng: &mut R) {
    let (n, size) = population.dim();
    if n < 2 || size < 2 {
        return;
    }

    for _ in 0..events {
        let pair = rand::seq::index::sample(rng, size, 2);
        let (a, b) = (pair.index(0), pair.index(1));
        let cut = rng.gen_range(1..n);
        for i in 0..cut {
            population.swap([i, a], [i, b]);
        }
    }
}

fn column_mean(population: &Array2<f64>) -> Vec<f64> {
    population
        .mean_axis(Axis(1))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![0.0; population.nrows()])
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameParameters;
    use crate::solver::SolverConfig;
    use approx::assert_abs_diff_eq;

    fn game() -> GameState {
        GameState::with_seed(GameParameters::default(), 40.0, 2).unwrap()
    }

    fn simulator(seed: u64) -> EvolutionarySimulator {
        let config = EvolutionConfig::default()
            .with_population_size(60)
            .with_crossover_events(20)
            .with_solver(SolverConfig::fast().with_seed(seed))
            .with_seed(seed);
        EvolutionarySimulator::new(config).unwrap()
    }

    #[test]
    fn test_run_records_every_generation() {
        let result = simulator(1).run(&game(), 5);

        assert_eq!(result.history.len(), 5);
        assert_eq!(result.equilibrium.len(), 5);
        for (k, record) in result.history.iter().enumerate() {
            assert_eq!(record.generation, k + 1);
            assert!(record.mean_fitness >= 0.0);
            assert!(record.mean_strategy.iter().all(|&x| (0.0..=80.0).contains(&x)));
            assert_abs_diff_eq!(
                record.distance_to_equilibrium,
                euclidean(&record.mean_strategy, &result.equilibrium),
                epsilon = 1e-12
            );
        }
        assert_eq!(
            result.final_mean_strategy,
            result.history[4].mean_strategy
        );
    }

    #[test]
    fn test_mean_fitness_rises_over_generations_on_average() {
        let generations = 6;
        let runs = 12;
        let mut totals = vec![0.0; generations];

        for seed in 0..runs {
            let result = simulator(100 + seed).run(&game(), generations);
            assert_eq!(result.degenerate_generations(), 0);
            for (total, record) in totals.iter_mut().zip(&result.history) {
                *total += record.mean_fitness;
            }
        }

        let first = totals[0] / runs as f64;
        let last = totals[generations - 1] / runs as f64;
        assert!(last >= first, "mean fitness fell from {:.1} to {:.1}", first, last);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = simulator(7).run(&game(), 3);
        let b = simulator(7).run(&game(), 3);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_zero_generations() {
        let result = simulator(2).run(&game(), 0);
        assert!(result.history.is_empty());
        assert!(result.final_distance().is_none());
    }

    #[test]
    fn test_callback_sees_each_generation() {
        let mut seen = Vec::new();
        simulator(3).run_with_callback(&game(), 4, |r| seen.push(r.generation));
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_fitness_perturbs_instead_of_selecting() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut population = Array2::from_elem((3, 8), 5.0);
        let selected = select_or_perturb(&mut population, &[0.0; 8], 10.0, &mut rng);

        assert!(!selected);
        assert!(population.iter().all(|&x| (5.0..15.0).contains(&x)));
        assert!(population.iter().any(|&x| x != 5.0));
    }

    #[test]
    fn test_selection_only_keeps_fit_individuals() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut population = Array2::from_shape_fn((2, 4), |(_, k)| k as f64);
        let selected = select_or_perturb(&mut population, &[0.0, 0.0, 3.0, 0.0], 10.0, &mut rng);

        assert!(selected);
        assert!(population.iter().all(|&x| x == 2.0));
    }

    #[test]
    fn test_crossover_preserves_each_row() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut population = Array2::from_shape_fn((4, 10), |(i, k)| (i * 10 + k) as f64);
        let before = population.clone();
        crossover(&mut population, 50, &mut rng);

        assert_ne!(population, before);
        for (row, original) in population.rows().into_iter().zip(before.rows()) {
            let mut a = row.to_vec();
            let mut b = original.to_vec();
            a.sort_by(f64::total_cmp);
            b.sort_by(f64::total_cmp);
            assert_eq!(a, b);
        }
        // the last coordinate is never before a cut
        assert_eq!(population.row(3), before.row(3));
    }

    #[test]
    fn test_fitness_is_floored_and_deterministic() {
        let state = game();
        let strategy = [10.0, 20.0, 30.0, 40.0, 50.0];
        let a = individual_fitness(&state, &strategy, 99);
        let b = individual_fitness(&state, &strategy, 99);
        assert_eq!(a, b);
        assert!(a >= 0.0);
        assert_eq!(individual_fitness(&state, &[1.0], 99), 0.0);
    }
}
