//! Row types mirrored from the hosted backend tables

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque ID types for readability
pub type GameId = String;
pub type UserId = String;
pub type PlayerId = String;
pub type RoundId = String;
pub type AnswerId = String;

/// Default number of rounds when a game or its settings leave it unset
pub const DEFAULT_TOTAL_ROUNDS: u32 = 5;

/// Length of a join code
pub const JOIN_CODE_LENGTH: usize = 6;

/// Nullable columns decode to the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Active,
    Ended,
}

/// Coarse, host-gated phase stored in `games.phase`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    #[default]
    Intro,
    Answer,
    Vote,
    Reveal,
    Results,
    Ended,
}

impl GamePhase {
    /// Fixed per-round progression; `Ended` is reached only from `Results`
    pub const ORDER: [GamePhase; 5] = [
        GamePhase::Intro,
        GamePhase::Answer,
        GamePhase::Vote,
        GamePhase::Reveal,
        GamePhase::Results,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Intro => "intro",
            GamePhase::Answer => "answer",
            GamePhase::Vote => "vote",
            GamePhase::Reveal => "reveal",
            GamePhase::Results => "results",
            GamePhase::Ended => "ended",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed-in user as reported by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// `games` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: GameStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phase: GamePhase,
    #[serde(default)]
    pub current_round: Option<u32>,
    #[serde(default)]
    pub total_rounds: Option<u32>,
    #[serde(default)]
    pub host: Option<UserId>,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub current_game: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Game {
    pub fn total_rounds_or_default(&self) -> u32 {
        self.total_rounds.unwrap_or(DEFAULT_TOTAL_ROUNDS)
    }

    pub fn is_hosted_by(&self, user_id: &str) -> bool {
        self.host.as_deref() == Some(user_id)
    }
}

/// Insert payload for `games`
#[derive(Debug, Clone, Serialize)]
pub struct NewGame {
    pub code: String,
    pub host: UserId,
    pub settings: serde_json::Value,
    pub status: GameStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub phase: GamePhase,
}

/// Partial update for `games`; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GamePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<GamePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
}

/// `game_players` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GamePlayer {
    pub id: PlayerId,
    pub game_id: GameId,
    pub user_id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_host: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coins: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: u32,
}

/// Insert payload for `game_players`
#[derive(Debug, Clone, Serialize)]
pub struct NewGamePlayer {
    pub game_id: GameId,
    pub user_id: UserId,
    pub is_host: bool,
    pub score: u32,
    pub coins: u32,
    pub level: u32,
    pub xp: u32,
}

impl NewGamePlayer {
    /// A player row as created by the create and join flows
    pub fn fresh(game_id: &str, user_id: &str, is_host: bool) -> Self {
        Self {
            game_id: game_id.to_string(),
            user_id: user_id.to_string(),
            is_host,
            score: 0,
            coins: 0,
            level: 1,
            xp: 0,
        }
    }
}

/// `rounds` row (read-only from the client)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub game_id: GameId,
    #[serde(default)]
    pub round_number: Option<u32>,
    #[serde(default)]
    pub mini_game_id: Option<String>,
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// `answers` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub player_id: UserId,
    pub round_id: RoundId,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_bluff: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAnswer {
    pub player_id: UserId,
    pub round_id: RoundId,
    pub content: String,
    pub is_bluff: bool,
    pub timestamp: String,
}

/// `votes` row, unique on (player_id, round_id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: String,
    pub player_id: UserId,
    pub round_id: RoundId,
    pub target_player_id: String,
    #[serde(default)]
    pub answer_id: Option<AnswerId>,
    pub vote_type: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewVote {
    pub player_id: UserId,
    pub round_id: RoundId,
    pub target_player_id: String,
    pub answer_id: Option<AnswerId>,
    pub vote_type: String,
    pub timestamp: String,
}

/// `user_stats` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub user_id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub games_played: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub games_won: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_xp: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coins: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub best_streak: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bluffs_successful: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bluffs_detected: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub titles: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub achievements: Vec<String>,
}

impl UserStats {
    /// Defaults inserted the first time a user's stats are read
    pub fn fresh(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            games_played: 0,
            games_won: 0,
            level: 1,
            total_xp: 0,
            coins: 0,
            best_streak: 0,
            bluffs_successful: 0,
            bluffs_detected: 0,
            titles: Vec::new(),
            achievements: Vec::new(),
        }
    }

    pub fn apply(&mut self, patch: &StatsPatch) {
        if let Some(v) = patch.games_played {
            self.games_played = v;
        }
        if let Some(v) = patch.games_won {
            self.games_won = v;
        }
        if let Some(v) = patch.level {
            self.level = v;
        }
        if let Some(v) = patch.total_xp {
            self.total_xp = v;
        }
        if let Some(v) = patch.coins {
            self.coins = v;
        }
        if let Some(v) = patch.best_streak {
            self.best_streak = v;
        }
        if let Some(v) = patch.bluffs_successful {
            self.bluffs_successful = v;
        }
        if let Some(v) = patch.bluffs_detected {
            self.bluffs_detected = v;
        }
    }
}

/// Partial update for `user_stats`
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games_played: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games_won: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_xp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_streak: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bluffs_successful: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bluffs_detected: Option<u32>,
}

/// `profiles` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub pseudo: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Classique,
    Bluff,
    Duel,
    Couple,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ambiance {
    #[default]
    Safe,
    Intime,
    Nofilter,
}

/// Settings chosen on game creation, stored as the `games.settings` blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    pub mode: Option<GameMode>,
    pub ambiance: Option<Ambiance>,
    #[serde(deserialize_with = "null_as_default")]
    pub mini_games: Vec<String>,
    #[serde(deserialize_with = "null_as_default_rounds")]
    pub total_rounds: u32,
    #[serde(deserialize_with = "null_as_default_max_players")]
    pub max_players: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub two_players_only: bool,
}

const DEFAULT_MAX_PLAYERS: u32 = 6;

fn null_as_default_rounds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_TOTAL_ROUNDS))
}

fn null_as_default_max_players<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_MAX_PLAYERS))
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            mode: None,
            ambiance: None,
            mini_games: Vec::new(),
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            max_players: DEFAULT_MAX_PLAYERS,
            two_players_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_row_with_nulls_decodes() {
        let row = serde_json::json!({
            "id": "g1",
            "code": "ABC123",
            "status": null,
            "phase": null,
            "current_round": 1,
            "total_rounds": null,
            "host": "u1",
            "settings": {}
        });
        let game: Game = serde_json::from_value(row).unwrap();
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.phase, GamePhase::Intro);
        assert_eq!(game.total_rounds_or_default(), DEFAULT_TOTAL_ROUNDS);
        assert!(game.is_hosted_by("u1"));
        assert!(!game.is_hosted_by("u2"));
    }

    #[test]
    fn test_game_patch_skips_unset_fields() {
        let patch = GamePatch {
            phase: Some(GamePhase::Vote),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "phase": "vote" }));
    }

    #[test]
    fn test_settings_use_camel_case_and_defaults() {
        let settings: GameSettings = serde_json::from_value(serde_json::json!({
            "mode": "bluff",
            "miniGames": ["kikadi"],
        }))
        .unwrap();
        assert_eq!(settings.mode, Some(GameMode::Bluff));
        assert_eq!(settings.mini_games, vec!["kikadi".to_string()]);
        assert_eq!(settings.total_rounds, DEFAULT_TOTAL_ROUNDS);
    }

    #[test]
    fn test_settings_with_null_fields_decode_to_defaults() {
        let settings: GameSettings = serde_json::from_value(serde_json::json!({
            "mode": null,
            "miniGames": null,
            "totalRounds": null,
            "maxPlayers": null,
            "twoPlayersOnly": null,
        }))
        .unwrap();
        assert_eq!(settings, GameSettings::default());
    }

    #[test]
    fn test_stats_patch_applies_only_set_fields() {
        let mut stats = UserStats::fresh("u1");
        stats.apply(&StatsPatch {
            coins: Some(40),
            games_played: Some(2),
            ..Default::default()
        });
        assert_eq!(stats.coins, 40);
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.level, 1);
    }
}
