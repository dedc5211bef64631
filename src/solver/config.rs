//! Configuration options for the equilibrium solvers.
//!
//! This module provides the configuration struct that controls the optimizer
//! fallback chain, the best-response refinement and the Bayesian enumeration
//! limits, plus the error types shared by the solvers.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Configuration for the equilibrium solvers.
///
/// # Example
/// ```
/// use community_betting_solver::solver::SolverConfig;
///
/// let config = SolverConfig::default().with_seed(42);
/// assert!(config.refine_best_response);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Relative tolerance on the objective used as the convergence test
    /// of the local optimizers.
    pub tolerance: f64,

    /// Maximum iterations per local optimizer.
    pub max_iterations: usize,

    /// Maximum generations of the global differential-evolution fallback.
    pub global_generations: usize,

    /// Population of the global fallback per strategy dimension.
    pub global_population_factor: usize,

    /// Deviation gain below which a profile counts as an equilibrium.
    pub epsilon: f64,

    /// Refine the welfare optimum with best-response sweeps.
    ///
    /// Maximizing the sum of utilities does not by itself yield a point where
    /// no player can gain by deviating; the sweeps move the profile to one.
    pub refine_best_response: bool,

    /// Maximum number of best-response sweeps.
    pub max_refinement_sweeps: usize,

    /// Maximum number of type combinations a Bayesian solve may enumerate.
    pub max_type_combinations: usize,

    /// Evaluate Bayesian type combinations in parallel.
    pub parallel: bool,

    /// Wall-clock budget for one solve, in seconds.
    ///
    /// Optimizers abort once the budget is spent and the chain moves on.
    /// Set to `None` for no limit.
    pub time_budget_secs: Option<f64>,

    /// Random seed for the global search.
    ///
    /// If `None`, a random seed is used.
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 1000,
            global_generations: 300,
            global_population_factor: 15,
            epsilon: 1e-6,
            refine_best_response: true,
            max_refinement_sweeps: 200,
            max_type_combinations: 100_000,
            parallel: true,
            time_budget_secs: None,
            seed: None,
        }
    }
}

impl SolverConfig {
    /// Create a new SolverConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for quick exploratory runs.
    ///
    /// Looser tolerances, a smaller global search and fewer sweeps.
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 300,
            global_generations: 60,
            global_population_factor: 8,
            max_refinement_sweeps: 60,
            ..Default::default()
        }
    }

    /// Builder method: set the objective tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Builder method: set the deviation threshold.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Builder method: enable or disable best-response refinement.
    pub fn with_refinement(mut self, enable: bool) -> Self {
        self.refine_best_response = enable;
        self
    }

    /// Builder method: set the Bayesian combination ceiling.
    pub fn with_max_type_combinations(mut self, limit: usize) -> Self {
        self.max_type_combinations = limit;
        self
    }

    /// Builder method: enable or disable parallel evaluation.
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Builder method: set the wall-clock budget in seconds.
    pub fn with_time_budget(mut self, seconds: f64) -> Self {
        self.time_budget_secs = Some(seconds);
        self
    }

    /// Builder method: set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Deadline of a solve started now, if a budget is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.time_budget_secs
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }

        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroLimit("max_iterations"));
        }

        if self.global_population_factor == 0 {
            return Err(ConfigError::ZeroLimit("global_population_factor"));
        }

        if self.max_type_combinations == 0 {
            return Err(ConfigError::ZeroLimit("max_type_combinations"));
        }

        if let Some(secs) = self.time_budget_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(ConfigError::InvalidTimeBudget(secs));
            }
        }

        Ok(())
    }
}

/// Errors that can occur when validating solver configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Tolerance is not a positive finite number.
    InvalidTolerance(f64),
    /// Epsilon is negative or not finite.
    InvalidEpsilon(f64),
    /// A count that must be positive is zero.
    ZeroLimit(&'static str),
    /// Time budget is not a positive finite number of seconds.
    InvalidTimeBudget(f64),
    /// A standard deviation or noise range is negative or not finite.
    InvalidSpread(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidTolerance(val) => {
                write!(f, "Tolerance {} must be positive and finite", val)
            }
            ConfigError::InvalidEpsilon(val) => {
                write!(f, "Epsilon {} must be non-negative and finite", val)
            }
            ConfigError::ZeroLimit(name) => write!(f, "{} must be at least 1", name),
            ConfigError::InvalidTimeBudget(val) => {
                write!(f, "Time budget {}s must be positive and finite", val)
            }
            ConfigError::InvalidSpread(val) => {
                write!(f, "Spread {} must be non-negative and finite", val)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Rejected solver requests.
///
/// Optimizer failures are not errors: they are reported through the
/// `success` flag of the result together with diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The solver configuration is invalid.
    Config(ConfigError),
    /// A type distribution is empty, negative or does not sum to 1.
    InvalidTypeDistribution {
        /// Player whose distribution is invalid.
        player: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// Number of distributions does not match the number of players.
    DistributionCount {
        /// Distributions supplied.
        got: usize,
        /// Players in the game.
        expected: usize,
    },
    /// Enumerating all type combinations would exceed the configured ceiling.
    CombinatorialOverflow {
        /// Combinations the request needs (saturated at `usize::MAX`).
        combinations: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::Config(e) => write!(f, "Invalid solver configuration: {}", e),
            SolverError::InvalidTypeDistribution { player, reason } => {
                write!(f, "Invalid type distribution for player {}: {}", player, reason)
            }
            SolverError::DistributionCount { got, expected } => write!(
                f,
                "Got {} type distributions for {} players",
                got, expected
            ),
            SolverError::CombinatorialOverflow {
                combinations,
                limit,
            } => write!(
                f,
                "{} type combinations exceed the limit of {}; reduce players or types",
                combinations, limit
            ),
        }
    }
}

impl std::error::Error for SolverError {}

impl From<ConfigError> for SolverError {
    fn from(e: ConfigError) -> Self {
        SolverError::Config(e)
    }
}

/// Statistics of one solve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStats {
    /// Optimizer that produced the accepted point.
    pub method: Option<String>,

    /// Iterations used by the accepted optimizer.
    pub iterations: usize,

    /// Best-response sweeps performed after the welfare optimum.
    pub refinement_sweeps: usize,

    /// Total time spent solving (in seconds).
    pub elapsed_seconds: f64,

    /// One line per optimizer that failed before one succeeded.
    pub failures: Vec<String>,
}

impl SolveStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(SolverConfig::fast().validate().is_ok());
        assert!(SolverConfig::default().deadline().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            SolverConfig::default().with_tolerance(0.0).validate(),
            Err(ConfigError::InvalidTolerance(0.0))
        );
        assert!(SolverConfig::default().with_epsilon(-1.0).validate().is_err());
        assert!(SolverConfig::default().with_time_budget(f64::NAN).validate().is_err());
        assert_eq!(
            SolverConfig::default().with_max_type_combinations(0).validate(),
            Err(ConfigError::ZeroLimit("max_type_combinations"))
        );
    }

    #[test]
    fn test_deadline_is_in_the_future() {
        let config = SolverConfig::default().with_time_budget(60.0);
        let deadline = config.deadline().unwrap();
        assert!(deadline > Instant::now());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SolverConfig::fast().with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seed, Some(7));
        assert_eq!(parsed.max_iterations, 300);
    }
}
