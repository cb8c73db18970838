use super::GameActions;
use crate::error::{KiadisaError, KiadisaResult};
use crate::notice::Notice;
use crate::types::*;
use rand::Rng;

/// Base-36 alphabet of join codes
const CODE_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random join code
///
/// Collisions with an existing game are not checked.
pub fn generate_join_code(rng: &mut impl Rng) -> String {
    (0..JOIN_CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGame {
    pub game_id: GameId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedGame {
    pub game_id: GameId,
    pub code: String,
    /// The user already had a player row in this game
    pub already_joined: bool,
}

impl GameActions {
    /// Create a game hosted by the signed-in user
    pub async fn create_game(&self, settings: GameSettings) -> KiadisaResult<CreatedGame> {
        let _loading = self.begin();
        let result = self.create_game_inner(settings).await;
        self.report("create_game", result, |created| {
            Notice::success("Game created", format!("Game code: {}", created.code))
        })
    }

    async fn create_game_inner(&self, mut settings: GameSettings) -> KiadisaResult<CreatedGame> {
        let user = self.require_user().await?;
        let code = generate_join_code(&mut rand::rng());
        // Zero means unset
        if settings.total_rounds == 0 {
            settings.total_rounds = DEFAULT_TOTAL_ROUNDS;
        }

        let game = self
            .backend
            .insert_game(NewGame {
                code: code.clone(),
                host: user.id.clone(),
                total_rounds: settings.total_rounds,
                settings: serde_json::to_value(&settings)?,
                status: GameStatus::Waiting,
                current_round: 1,
                phase: GamePhase::Intro,
            })
            .await?;

        self.backend
            .insert_player(NewGamePlayer::fresh(&game.id, &user.id, true))
            .await?;

        tracing::info!("Created game {} with code {}", game.id, code);
        self.notifier.log_event(
            "game_created",
            serde_json::json!({ "game_id": game.id, "code": code }),
        );

        Ok(CreatedGame {
            game_id: game.id,
            code,
        })
    }

    /// Join a waiting game by its code
    pub async fn join_game(&self, code: &str) -> KiadisaResult<JoinedGame> {
        let _loading = self.begin();
        let result = self.join_game_inner(code).await;
        self.report("join_game", result, |joined| {
            Notice::success("Game joined", format!("You joined game {}", joined.code))
        })
    }

    async fn join_game_inner(&self, code: &str) -> KiadisaResult<JoinedGame> {
        let user = self.require_user().await?;

        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(KiadisaError::Validation("A game code is required".to_string()));
        }

        let game = self
            .backend
            .game_by_code(&code)
            .await?
            .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

        if game.status != GameStatus::Waiting {
            return Err(KiadisaError::GameAlreadyStarted);
        }

        if self
            .backend
            .player_in_game(&game.id, &user.id)
            .await?
            .is_some()
        {
            tracing::debug!("User {} already in game {}", user.id, game.id);
            return Ok(JoinedGame {
                game_id: game.id,
                code: game.code,
                already_joined: true,
            });
        }

        self.backend
            .insert_player(NewGamePlayer::fresh(&game.id, &user.id, false))
            .await?;

        tracing::info!("User {} joined game {}", user.id, game.id);
        Ok(JoinedGame {
            game_id: game.id,
            code: game.code,
            already_joined: false,
        })
    }

    /// Start a waiting game (host only)
    pub async fn start_game(&self, game_id: &str) -> KiadisaResult<()> {
        let _loading = self.begin();
        let result = self.start_game_inner(game_id).await;
        self.report("start_game", result, |_| {
            Notice::success("Game started", "Let the bluffing begin")
        })
    }

    async fn start_game_inner(&self, game_id: &str) -> KiadisaResult<()> {
        let user = self.require_user().await?;

        let game = self
            .backend
            .game_by_id(game_id)
            .await?
            .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

        if !game.is_hosted_by(&user.id) {
            return Err(KiadisaError::Unauthorized(
                "Only the host can start the game".to_string(),
            ));
        }
        if game.status != GameStatus::Waiting {
            return Err(KiadisaError::GameAlreadyStarted);
        }

        self.backend
            .update_game(
                game_id,
                GamePatch {
                    status: Some(GameStatus::Active),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!("Game {} started", game_id);
        Ok(())
    }
}
