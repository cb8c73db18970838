//! Round-robin party over the four mini-games, with final standings

use crate::minigame::{MiniGameKind, RoundScores, PLAYER_SLOTS};
use crate::types::DEFAULT_TOTAL_ROUNDS;
use serde::Serialize;

/// Coins awarded per point of the winner's score
const COINS_PER_POINT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyProgress {
    /// The party continues with this round
    NextRound(u32),
    Finished,
}

#[derive(Debug, Clone)]
pub struct Party {
    current_round: u32,
    total_rounds: u32,
    totals: RoundScores,
    finished: bool,
}

impl Default for Party {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_ROUNDS)
    }
}

impl Party {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            current_round: 1,
            total_rounds: total_rounds.max(1),
            totals: RoundScores::default(),
            finished: false,
        }
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn totals(&self) -> RoundScores {
        self.totals
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mini-game of the current round
    pub fn current_game(&self) -> MiniGameKind {
        MiniGameKind::for_round(self.current_round)
    }

    /// Add a finished round's scores and move on
    ///
    /// Rounds completed after the party finished are ignored.
    pub fn complete_round(&mut self, scores: RoundScores) -> PartyProgress {
        if self.finished {
            tracing::warn!("Round completed after the party finished, ignoring");
            return PartyProgress::Finished;
        }

        self.totals += scores;
        if self.current_round >= self.total_rounds {
            self.finished = true;
            tracing::info!("Party finished with totals {:?}", self.totals.slots);
            PartyProgress::Finished
        } else {
            self.current_round += 1;
            tracing::debug!(
                "Round {}/{}: {}",
                self.current_round,
                self.total_rounds,
                self.current_game()
            );
            PartyProgress::NextRound(self.current_round)
        }
    }

    pub fn standings(&self) -> Standings {
        Standings::from_totals(self.totals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub name: &'static str,
    pub score: u32,
}

/// Final ranking, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standings {
    pub ranking: Vec<Standing>,
    pub winner_coins: u32,
}

impl Standings {
    pub fn from_totals(totals: RoundScores) -> Self {
        let mut ranking: Vec<Standing> = PLAYER_SLOTS
            .into_iter()
            .zip(totals.slots)
            .map(|(name, score)| Standing { name, score })
            .collect();
        // Stable: ties keep slot order
        ranking.sort_by(|a, b| b.score.cmp(&a.score));

        let winner_coins = ranking.first().map_or(0, |w| w.score * COINS_PER_POINT);
        Self {
            ranking,
            winner_coins,
        }
    }

    pub fn winner(&self) -> Option<&Standing> {
        self.ranking.first()
    }

    /// Text shared when a party ends
    pub fn share_message(&self) -> String {
        const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
        let lines: Vec<String> = self
            .ranking
            .iter()
            .zip(MEDALS)
            .map(|(s, medal)| format!("{} {}: {} pts", medal, s.name, s.score))
            .collect();
        format!(
            "🏆 Partie KIADISA terminée !\n\n{}\n\nQui sera le prochain champion ? 🎮",
            lines.join("\n")
        )
    }
}
