use super::GameActions;
use crate::error::{KiadisaError, KiadisaResult};
use crate::notice::Notice;
use crate::types::*;

/// Outcome of one host "advance" press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStep {
    pub phase: GamePhase,
    /// Set only when the round number changes
    pub current_round: Option<u32>,
}

/// Compute the phase that follows `phase`
///
/// Within a round the fixed order is followed. From `Results` the game moves
/// to the next round's `Intro` while rounds remain, else to `Ended`. A game
/// without a current round ends after `Results`.
pub fn next_phase(
    phase: GamePhase,
    current_round: Option<u32>,
    total_rounds: Option<u32>,
) -> KiadisaResult<PhaseStep> {
    match phase {
        GamePhase::Ended => Err(KiadisaError::Validation("The game has ended".to_string())),
        GamePhase::Results => {
            let total = total_rounds.unwrap_or(DEFAULT_TOTAL_ROUNDS);
            match current_round {
                Some(round) if round >= 1 && round < total => Ok(PhaseStep {
                    phase: GamePhase::Intro,
                    current_round: Some(round + 1),
                }),
                _ => Ok(PhaseStep {
                    phase: GamePhase::Ended,
                    current_round: None,
                }),
            }
        }
        _ => {
            let index = GamePhase::ORDER
                .iter()
                .position(|p| *p == phase)
                .unwrap_or(0);
            Ok(PhaseStep {
                phase: GamePhase::ORDER[index + 1],
                current_round: None,
            })
        }
    }
}

impl GameActions {
    /// Move a game to its next phase (host only)
    pub async fn advance_phase(&self, game_id: &str) -> KiadisaResult<PhaseStep> {
        let _loading = self.begin();
        let result = self.advance_phase_inner(game_id).await;
        self.report("advance_phase", result, |step| {
            Notice::success("Phase advanced", format!("Now in phase: {}", step.phase))
        })
    }

    async fn advance_phase_inner(&self, game_id: &str) -> KiadisaResult<PhaseStep> {
        let user = self.require_user().await?;

        let game = self
            .backend
            .game_by_id(game_id)
            .await?
            .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

        if !game.is_hosted_by(&user.id) {
            return Err(KiadisaError::Unauthorized(
                "Only the host can advance the game".to_string(),
            ));
        }

        let step = next_phase(game.phase, game.current_round, game.total_rounds)?;
        let patch = GamePatch {
            phase: Some(step.phase),
            current_round: step.current_round,
            ..Default::default()
        };
        self.backend.update_game(game_id, patch).await?;

        tracing::info!(
            "Game {} advanced {} -> {} (round {:?})",
            game_id,
            game.phase,
            step.phase,
            step.current_round.or(game.current_round)
        );
        Ok(step)
    }
}
