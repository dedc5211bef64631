//! Game model: parameters, players, the payoff model and the game state.
//!
//! # Overview
//!
//! The game has two layers of players:
//!
//! - **Layer 1 (base)**: bettors whose outcome is a binary win/lose. The
//!   winning side takes the pot.
//! - **Layer 2 (observers)**: predict the layer 1 outcome. Each round they
//!   are dealt one of the roles bank, odd setter or validator.
//!
//! Two different payoff notions live here:
//!
//! 1. The strategic **utility** (`PayoffModel::utility`), which is what the
//!    equilibrium solvers optimize over a joint strategy profile.
//! 2. The **settlement** payoffs of a realized round (`GameState::run_game`),
//!    which drive the community score, reputations and cumulative profits.
//!
//! # Example
//!
//! ```
//! use community_betting_solver::game::{GameParameters, GameState};
//!
//! let mut game = GameState::with_seed(GameParameters::default(), 50.0, 7).unwrap();
//! game.place_bet(0, 10.0).unwrap();
//! game.place_bet(1, 20.0).unwrap();
//!
//! let round = game.run_game(true);
//! assert_eq!(round.layer1, vec![30.0, -20.0]);
//! assert!((0.0..=100.0).contains(&game.snapshot().community_score));
//! ```

pub mod params;
pub mod payoff;
pub mod player;
pub mod state;

pub use params::{GameError, GameParameters};
pub use payoff::{Payoff, PayoffModel};
pub use player::{Layer, Player, Role};
pub use state::{GameSnapshot, GameState, PlayerSnapshot, RoundPayoffs};
