//! Configuration of the evolutionary simulator.

use serde::{Deserialize, Serialize};

use crate::solver::{ConfigError, SolverConfig};

/// Configuration for [`EvolutionarySimulator`](super::EvolutionarySimulator).
///
/// # Example
/// ```
/// use community_betting_solver::evolution::EvolutionConfig;
///
/// let config = EvolutionConfig::default().with_population_size(200).with_seed(3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Number of individuals (columns of the population matrix).
    pub population_size: usize,

    /// Standard deviation of the Gaussian mutation noise.
    pub mutation_std: f64,

    /// Crossover events per generation.
    pub crossover_events: usize,

    /// Upper end of the uniform noise added when every fitness is zero.
    pub recovery_noise: f64,

    /// Random seed; entropy if `None`.
    pub seed: Option<u64>,

    /// Configuration of the Nash solve that fixes the convergence target.
    pub solver: SolverConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
            mutation_std: 1.0,
            crossover_events: 100,
            recovery_noise: 10.0,
            seed: None,
            solver: SolverConfig::default(),
        }
    }
}

impl EvolutionConfig {
    /// Create a new EvolutionConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Builder method: set the mutation standard deviation.
    pub fn with_mutation_std(mut self, std: f64) -> Self {
        self.mutation_std = std;
        self
    }

    /// Builder method: set the number of crossover events per generation.
    pub fn with_crossover_events(mut self, events: usize) -> Self {
        self.crossover_events = events;
        self
    }

    /// Builder method: set the solver configuration used for the target.
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Builder method: set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::ZeroLimit("population_size"));
        }

        if !(self.mutation_std.is_finite() && self.mutation_std >= 0.0) {
            return Err(ConfigError::InvalidSpread(self.mutation_std));
        }

        if !(self.recovery_noise.is_finite() && self.recovery_noise >= 0.0) {
            return Err(ConfigError::InvalidSpread(self.recovery_noise));
        }

        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvolutionConfig::default();
        assert_eq!(config.population_size, 1000);
        assert_eq!(config.crossover_events, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            EvolutionConfig::default().with_population_size(0).validate(),
            Err(ConfigError::ZeroLimit("population_size"))
        );
        assert_eq!(
            EvolutionConfig::default().with_mutation_std(-1.0).validate(),
            Err(ConfigError::InvalidSpread(-1.0))
        );
        let bad_solver = SolverConfig::default().with_tolerance(-1.0);
        assert!(EvolutionConfig::default()
            .with_solver(bad_solver)
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EvolutionConfig =
            serde_json::from_str(r#"{"population_size": 64, "seed": 5}"#).unwrap();
        assert_eq!(config.population_size, 64);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.mutation_std, 1.0);
    }
}
