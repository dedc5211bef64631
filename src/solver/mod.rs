//! Equilibrium solvers.
//!
//! # Overview
//!
//! All solvers work on strategy vectors bounded in `[0, max_bet]` and share
//! one optimizer fallback chain (see [`optimize`]):
//!
//! - [`NashSolver`]: welfare optimum refined to a pure ε-Nash equilibrium.
//! - [`BayesianSolver`]: strategies per (player, type) maximizing expected
//!   utility over all type assignments, optionally with a community bonus.
//!
//! Optimizer exhaustion never raises: results carry a `success` flag and the
//! diagnostics of every failed method. Only malformed requests return a
//! [`SolverError`].
//!
//! # Example
//!
//! ```no_run
//! use community_betting_solver::game::{GameParameters, GameState};
//! use community_betting_solver::solver::{NashSolver, SolverConfig};
//!
//! let game = GameState::with_seed(GameParameters::default(), 50.0, 1).unwrap();
//! let result = NashSolver::new(SolverConfig::default().with_seed(1)).solve(&game);
//! println!("equilibrium: {:?} (verified: {})", result.profile, result.verified);
//! ```

pub mod bayesian;
pub mod config;
pub mod nash;
pub mod optimize;

pub use bayesian::{BayesianObjective, BayesianResult, BayesianSolver, TypeDistribution, TypeStrategies};
pub use config::{ConfigError, SolveStats, SolverConfig, SolverError};
pub use nash::{best_response, is_equilibrium, EquilibriumResult, NashSolver};
pub use optimize::{Bounds, Budget, FallbackChain, Minimizer, Minimum, OptimizeError};
