//! Per-session context: one game plus its community action board.
//!
//! A [`Session`] is owned by whoever drives the game (a CLI, a server
//! handler); there is no process-wide game instance.

pub mod actions;
pub mod payout;

pub use actions::{Action, ActionBoard, ActionError, ActionId, ActionStatus};
pub use payout::{send_with_retry, LedgerSink, PayoutError, PayoutReceipt, PayoutSink};

use serde::{Deserialize, Serialize};

use crate::game::{GameError, GameParameters, GameSnapshot, GameState, RoundPayoffs};

/// Result of placing a bet through a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetReceipt {
    /// Bet after clamping into `[0, max_bet]`.
    pub bet: f64,
    /// Alignment of the bet with the average bet after placing it.
    pub alignment: f64,
}

/// One game session.
#[derive(Debug, Clone)]
pub struct Session {
    game: GameState,
    actions: ActionBoard,
}

impl Session {
    /// New session with a fresh game.
    pub fn new(
        params: GameParameters,
        time_constraint: f64,
        streamer_id: Option<String>,
    ) -> Result<Self, GameError> {
        Ok(Self::from_parts(
            GameState::new(params, time_constraint)?,
            ActionBoard::new(streamer_id),
        ))
    }

    /// Session around an existing game and board.
    pub fn from_parts(game: GameState, actions: ActionBoard) -> Self {
        Self { game, actions }
    }

    /// The game.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Mutable access to the game.
    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    /// The action board.
    pub fn actions(&self) -> &ActionBoard {
        &self.actions
    }

    /// Mutable access to the action board.
    pub fn actions_mut(&mut self) -> &mut ActionBoard {
        &mut self.actions
    }

    /// Place a bet and report its alignment with the community.
    pub fn place_bet(&mut self, player: usize, amount: f64) -> Result<BetReceipt, GameError> {
        let bet = self.game.place_bet(player, amount)?;
        let alignment = self.game.evaluate_bet_alignment(bet);
        log::info!(
            "player {} bet {:.2} (alignment {:.2})",
            player,
            bet,
            alignment
        );
        Ok(BetReceipt { bet, alignment })
    }

    /// Settle a round with the given layer 1 outcome.
    pub fn run_game(&mut self, outcome: bool) -> RoundPayoffs {
        let round = self.game.run_game(outcome);
        log::info!(
            "round completed: layer 1 {}",
            if outcome { "win" } else { "loss" }
        );
        round
    }

    /// Current status.
    pub fn status(&self) -> GameSnapshot {
        self.game.snapshot()
    }

    /// Start a new game; the action board is kept.
    pub fn reset(&mut self) {
        self.game.reset();
        log::info!("game reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn session() -> Session {
        let game = GameState::with_seed(GameParameters::default(), 10.0, 1).unwrap();
        Session::from_parts(game, ActionBoard::new(Some("host".to_string())))
    }

    #[test]
    fn test_place_bet_reports_alignment() {
        let mut session = session();
        for player in 0..5 {
            session.place_bet(player, 20.0).unwrap();
        }
        let receipt = session.place_bet(4, 200.0).unwrap();
        assert_eq!(receipt.bet, 80.0);
        // average is (4 * 20 + 80) / 5 = 32
        assert_abs_diff_eq!(receipt.alignment, 1.0 - 48.0 / 80.0, epsilon = 1e-12);
        assert!(session.place_bet(9, 1.0).is_err());
    }

    #[test]
    fn test_round_and_reset() {
        let mut session = session();
        session.place_bet(0, 10.0).unwrap();
        session.place_bet(1, 20.0).unwrap();

        let round = session.run_game(true);
        assert_eq!(round.layer1, vec![30.0, -20.0]);
        assert_eq!(session.status().players[0].cumulative_profit, 30.0);

        session.actions_mut().propose("host", "shoutout", 1.0).unwrap();
        session.reset();
        assert_eq!(session.status().community_score, 50.0);
        assert!(session.status().players.iter().all(|p| p.cumulative_profit == 0.0));
        assert_eq!(session.actions().len(), 1);
    }
}
