//! Evolutionary approximation of equilibrium play.
//!
//! A population of strategy profiles evolves on the same payoff landscape the
//! solvers optimize. Each generation tracks the mean strategy and its distance
//! to the Nash point solved once before the loop, so the trajectory shows
//! whether selection drifts towards the analytic equilibrium.
//!
//! # Example
//!
//! ```no_run
//! use community_betting_solver::evolution::{EvolutionConfig, EvolutionarySimulator};
//! use community_betting_solver::game::{GameParameters, GameState};
//!
//! let game = GameState::with_seed(GameParameters::default(), 50.0, 1).unwrap();
//! let simulator = EvolutionarySimulator::new(EvolutionConfig::default().with_seed(1)).unwrap();
//! let result = simulator.run(&game, 100);
//! println!("final distance: {:?}", result.final_distance());
//! ```

pub mod config;
pub mod simulator;

pub use config::EvolutionConfig;
pub use simulator::{individual_fitness, EvolutionResult, EvolutionarySimulator, GenerationRecord};
