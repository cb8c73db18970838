use super::{WatchBuilder, Watcher};
use crate::actions::tally_votes;
use crate::backend::{Backend, Subscription, Table};
use crate::error::{KiadisaError, KiadisaResult};
use crate::types::*;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Display name used when a player has no profile row
const ANONYMOUS_PSEUDO: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerWithProfile {
    pub player: GamePlayer,
    pub pseudo: String,
    pub avatar: Option<String>,
}

/// Everything a game screen shows for the current round
#[derive(Debug, Clone, PartialEq)]
pub struct GameData {
    pub game: Game,
    pub players: Vec<PlayerWithProfile>,
    pub current_round: Option<Round>,
    pub answers: Vec<Answer>,
    pub votes: Vec<Vote>,
}

impl GameData {
    /// Votes received per target player in the current round
    pub fn vote_counts(&self) -> HashMap<String, u32> {
        tally_votes(&self.votes)
    }
}

pub async fn fetch_game_data(backend: &dyn Backend, code: &str) -> KiadisaResult<GameData> {
    let game = backend
        .game_by_code(code)
        .await?
        .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

    let rows = backend.players_for_game(&game.id).await?;
    let user_ids: Vec<UserId> = rows.iter().map(|p| p.user_id.clone()).collect();
    let profiles: HashMap<UserId, Profile> = backend
        .profiles(&user_ids)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let players = rows
        .into_iter()
        .map(|player| {
            let profile = profiles.get(&player.user_id);
            PlayerWithProfile {
                pseudo: profile
                    .map(|p| p.pseudo.clone())
                    .unwrap_or_else(|| ANONYMOUS_PSEUDO.to_string()),
                avatar: profile.and_then(|p| p.avatar.clone()),
                player,
            }
        })
        .collect();

    let current_round = match game.current_round {
        Some(number) => backend.round_by_number(&game.id, number).await?,
        None => None,
    };

    let (answers, votes) = match &current_round {
        Some(round) => (
            backend.answers_for_round(&round.id).await?,
            backend.votes_for_round(&round.id).await?,
        ),
        None => (Vec::new(), Vec::new()),
    };

    Ok(GameData {
        game,
        players,
        current_round,
        answers,
        votes,
    })
}

pub fn watch_game_data(backend: Arc<dyn Backend>, code: &str) -> Watcher<GameData> {
    let code = code.to_string();
    let fetch_backend = backend.clone();
    let initial = vec![Subscription::eq(Table::Games, "code", code.clone())];

    WatchBuilder::new(
        "game_data",
        backend,
        move || {
            let backend = fetch_backend.clone();
            let code = code.clone();
            async move { fetch_game_data(backend.as_ref(), &code).await }.boxed()
        },
        |data: &GameData| {
            let game_id = data.game.id.clone();
            let mut subscriptions = vec![
                Subscription::eq(Table::Games, "id", game_id.clone()),
                Subscription::eq(Table::GamePlayers, "game_id", game_id),
            ];
            if let Some(round) = &data.current_round {
                subscriptions.push(Subscription::eq(Table::Answers, "round_id", round.id.clone()));
                subscriptions.push(Subscription::eq(Table::Votes, "round_id", round.id.clone()));
            }
            subscriptions
        },
    )
    .initial_subscriptions(initial)
    .spawn()
}
