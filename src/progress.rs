//! Player progression and game-setup helpers

use crate::error::{KiadisaError, KiadisaResult};
use crate::minigame::MiniGameKind;
use crate::types::{Ambiance, GameMode, GameSettings, UserStats};

/// XP per level
pub const XP_PER_LEVEL: u32 = 100;

/// Allowed number of rounds when creating a game
pub const MIN_ROUNDS: u32 = 3;
pub const MAX_ROUNDS: u32 = 15;

/// Estimated duration of one round, in minutes
const MINUTES_PER_ROUND: u32 = 3;

/// Total XP at which `level` ends
pub fn xp_for_next_level(level: u32) -> u32 {
    level * XP_PER_LEVEL
}

/// XP still missing to reach the next level
pub fn xp_to_next_level(stats: &UserStats) -> u32 {
    xp_for_next_level(stats.level).saturating_sub(stats.total_xp)
}

/// Progress through the current level, in percent (0..=100)
pub fn xp_progress(stats: &UserStats) -> f64 {
    let level_start = stats.level.saturating_sub(1) * XP_PER_LEVEL;
    let gained = stats.total_xp as f64 - level_start as f64;
    (gained / XP_PER_LEVEL as f64 * 100.0).clamp(0.0, 100.0)
}

/// Share of games won, rounded to whole percent
pub fn win_rate(stats: &UserStats) -> u32 {
    if stats.games_played == 0 {
        return 0;
    }
    (stats.games_won as f64 / stats.games_played as f64 * 100.0).round() as u32
}

pub fn estimated_minutes(total_rounds: u32) -> u32 {
    total_rounds * MINUTES_PER_ROUND
}

/// Choices made on the create-game screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDraft {
    pub mode: Option<GameMode>,
    pub ambiance: Option<Ambiance>,
    pub mini_games: Vec<String>,
    pub total_rounds: u32,
    pub two_players_only: bool,
}

impl SettingsDraft {
    /// A game can be created once mode, ambiance and a mini-game are picked
    pub fn can_create(&self) -> bool {
        self.mode.is_some() && self.ambiance.is_some() && !self.mini_games.is_empty()
    }

    pub fn validate(self) -> KiadisaResult<GameSettings> {
        let mode = self
            .mode
            .ok_or_else(|| KiadisaError::Validation("Pick a game mode".to_string()))?;
        let ambiance = self
            .ambiance
            .ok_or_else(|| KiadisaError::Validation("Pick an ambiance".to_string()))?;

        if self.mini_games.is_empty() {
            return Err(KiadisaError::Validation(
                "Pick at least one mini-game".to_string(),
            ));
        }
        if let Some(unknown) = self
            .mini_games
            .iter()
            .find(|id| MiniGameKind::from_id(id).is_none())
        {
            return Err(KiadisaError::Validation(format!(
                "Unknown mini-game: {}",
                unknown
            )));
        }
        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.total_rounds) {
            return Err(KiadisaError::Validation(format!(
                "Rounds must be between {} and {}",
                MIN_ROUNDS, MAX_ROUNDS
            )));
        }

        Ok(GameSettings {
            mode: Some(mode),
            ambiance: Some(ambiance),
            mini_games: self.mini_games,
            total_rounds: self.total_rounds,
            max_players: if self.two_players_only { 2 } else { 6 },
            two_players_only: self.two_players_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(level: u32, total_xp: u32) -> UserStats {
        UserStats {
            level,
            total_xp,
            ..UserStats::fresh("u1")
        }
    }

    #[test]
    fn test_xp_progress() {
        assert_eq!(xp_for_next_level(3), 300);
        assert_eq!(xp_progress(&stats(1, 0)), 0.0);
        assert_eq!(xp_progress(&stats(1, 50)), 50.0);
        assert_eq!(xp_progress(&stats(3, 275)), 75.0);
        assert_eq!(xp_to_next_level(&stats(3, 275)), 25);
    }

    #[test]
    fn test_xp_progress_is_clamped() {
        // Stats rows can lag behind level-ups
        assert_eq!(xp_progress(&stats(2, 40)), 0.0);
        assert_eq!(xp_progress(&stats(1, 450)), 100.0);
        assert_eq!(xp_to_next_level(&stats(1, 450)), 0);
    }

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(&UserStats::fresh("u1")), 0);
        let s = UserStats {
            games_played: 3,
            games_won: 2,
            ..UserStats::fresh("u1")
        };
        assert_eq!(win_rate(&s), 67);
    }

    #[test]
    fn test_settings_validation() {
        let draft = SettingsDraft {
            mode: Some(GameMode::Bluff),
            ambiance: Some(Ambiance::Safe),
            mini_games: vec!["kikadi".into(), "kideja".into()],
            total_rounds: 5,
            two_players_only: true,
        };
        assert!(draft.can_create());
        let settings = draft.clone().validate().unwrap();
        assert_eq!(settings.max_players, 2);
        assert_eq!(settings.total_rounds, 5);
        assert_eq!(estimated_minutes(settings.total_rounds), 15);

        let no_games = SettingsDraft {
            mini_games: Vec::new(),
            ..draft.clone()
        };
        assert!(!no_games.can_create());
        assert!(matches!(
            no_games.validate(),
            Err(KiadisaError::Validation(_))
        ));

        let too_long = SettingsDraft {
            total_rounds: 20,
            ..draft.clone()
        };
        assert!(too_long.validate().is_err());

        let unknown = SettingsDraft {
            mini_games: vec!["quiz".into()],
            ..draft
        };
        assert!(unknown.validate().is_err());
    }
}
