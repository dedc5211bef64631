//! # Community Betting Solver
//!
//! Equilibrium analysis for a layered community betting game.
//!
//! ## Features
//!
//! - **Payoff Model**: utility combining risk aversion, information asymmetry,
//!   group cooperation and community alignment
//! - **Nash Solver**: welfare optimum through a four-method fallback chain,
//!   refined by best-response sweeps into an ε-Nash equilibrium
//! - **Bayesian Solver**: strategies per (player, type) over every type
//!   assignment, with an optional community objective
//! - **Evolutionary Simulator**: selection, mutation and crossover on the same
//!   payoff landscape, tracked against the Nash point
//! - **Sessions**: round settlement plus a community action board with payouts
//!
//! ## Quick Start
//!
//! ```no_run
//! use community_betting_solver::game::{GameParameters, GameState};
//! use community_betting_solver::solver::{NashSolver, SolverConfig};
//!
//! // 1. Describe the game
//! let game = GameState::new(GameParameters::default(), 50.0).unwrap();
//!
//! // 2. Solve
//! let result = NashSolver::new(SolverConfig::default()).solve(&game);
//!
//! // 3. Inspect
//! println!("{:?} verified={}", result.profile, result.verified);
//! ```
//!
//! ## Modules
//!
//! - [`game`]: parameters, players, payoff model and game state
//! - [`solver`]: optimizers, Nash and Bayesian solvers
//! - [`evolution`]: evolutionary simulator
//! - [`simulation`]: Monte-Carlo trials of random rounds
//! - [`session`]: per-session context and action board
//! - [`analysis`]: batch analysis of parameter sets
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Payoff trait (utility per player)               │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │ implemented by GameState
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!    ┌─────────┐         ┌───────────┐         ┌──────────────┐
//!    │  Nash   │         │ Bayesian  │         │ Evolutionary │
//!    │ Solver  │         │  Solver   │         │  Simulator   │
//!    └─────────┘         └───────────┘         └──────────────┘
//!         │                     │
//!         └──── FallbackChain ──┘
//!   (projected gradient → Nelder-Mead → pattern search → DE)
//! ```

#![warn(missing_docs)]

/// Game model: parameters, players, payoffs and state.
pub mod game;

/// Equilibrium solvers and bounded optimizers.
pub mod solver;

/// Evolutionary simulation.
pub mod evolution;

/// Monte-Carlo simulation of random rounds.
pub mod simulation;

/// Game sessions and the community action board.
pub mod session;

/// Batch analysis driven by a JSON configuration.
pub mod analysis;

pub use evolution::{EvolutionConfig, EvolutionResult, EvolutionarySimulator};
pub use game::{GameError, GameParameters, GameState, Payoff};
pub use session::Session;
pub use simulation::{run_simulation, SimulationReport};
pub use solver::{
    BayesianObjective, BayesianSolver, EquilibriumResult, NashSolver, SolverConfig, SolverError,
    TypeDistribution,
};
