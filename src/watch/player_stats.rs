use super::{WatchBuilder, Watcher};
use crate::backend::{Backend, Subscription, Table};
use crate::error::{KiadisaError, KiadisaResult};
use crate::types::{StatsPatch, UserStats};
use futures::FutureExt;
use std::ops::Deref;
use std::sync::Arc;

/// The signed-in user's stats, inserted with defaults on first read
pub async fn fetch_or_create_stats(backend: &dyn Backend) -> KiadisaResult<UserStats> {
    let user = backend
        .current_user()
        .await?
        .ok_or(KiadisaError::NotAuthenticated)?;

    if let Some(stats) = backend.user_stats(&user.id).await? {
        return Ok(stats);
    }

    tracing::info!("Creating stats for user {}", user.id);
    match backend.insert_user_stats(UserStats::fresh(&user.id)).await {
        Ok(stats) => Ok(stats),
        Err(e) => {
            // Another client may have created the row first
            match backend.user_stats(&user.id).await? {
                Some(stats) => Ok(stats),
                None => Err(e),
            }
        }
    }
}

/// Stats watcher that can also patch the row it watches
pub struct PlayerStatsWatcher {
    watcher: Watcher<UserStats>,
    backend: Arc<dyn Backend>,
}

impl PlayerStatsWatcher {
    /// Apply a partial update to the caller's stats
    ///
    /// Failures are logged only; the watcher keeps showing the last good row.
    pub async fn update_stats(&self, patch: StatsPatch) {
        if let Err(e) = self.try_update(patch).await {
            tracing::error!("Error updating player stats: {}", e);
        }
    }

    async fn try_update(&self, patch: StatsPatch) -> KiadisaResult<()> {
        let user = self
            .backend
            .current_user()
            .await?
            .ok_or(KiadisaError::NotAuthenticated)?;
        self.backend.update_user_stats(&user.id, patch).await
    }
}

impl Deref for PlayerStatsWatcher {
    type Target = Watcher<UserStats>;

    fn deref(&self) -> &Self::Target {
        &self.watcher
    }
}

pub fn watch_player_stats(backend: Arc<dyn Backend>) -> PlayerStatsWatcher {
    let fetch_backend = backend.clone();

    let watcher = WatchBuilder::new(
        "player_stats",
        backend.clone(),
        move || {
            let backend = fetch_backend.clone();
            async move { fetch_or_create_stats(backend.as_ref()).await }.boxed()
        },
        |stats: &UserStats| {
            vec![Subscription::eq(
                Table::UserStats,
                "user_id",
                stats.user_id.clone(),
            )]
        },
    )
    .spawn();

    PlayerStatsWatcher { watcher, backend }
}
