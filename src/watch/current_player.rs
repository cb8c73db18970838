use super::{WatchBuilder, Watcher};
use crate::backend::{Backend, Subscription, Table};
use crate::error::{KiadisaError, KiadisaResult};
use crate::types::GamePlayer;
use futures::FutureExt;
use std::sync::Arc;

/// The signed-in user's player row in a game
pub async fn fetch_current_player(
    backend: &dyn Backend,
    game_id: &str,
) -> KiadisaResult<GamePlayer> {
    let user = backend
        .current_user()
        .await?
        .ok_or(KiadisaError::NotAuthenticated)?;

    backend
        .player_in_game(game_id, &user.id)
        .await?
        .ok_or_else(|| KiadisaError::NotFound("Player".to_string()))
}

pub fn watch_current_player(backend: Arc<dyn Backend>, game_id: &str) -> Watcher<GamePlayer> {
    let game_id = game_id.to_string();
    let fetch_backend = backend.clone();
    let subscriptions = vec![Subscription::eq(Table::GamePlayers, "game_id", game_id.clone())];
    let current = subscriptions.clone();

    WatchBuilder::new(
        "current_player",
        backend,
        move || {
            let backend = fetch_backend.clone();
            let game_id = game_id.clone();
            async move { fetch_current_player(backend.as_ref(), &game_id).await }.boxed()
        },
        move |_| current.clone(),
    )
    .initial_subscriptions(subscriptions)
    .spawn()
}
