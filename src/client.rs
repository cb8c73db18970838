//! Client context shared by actions and watchers

use crate::actions::GameActions;
use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::notice::{Notice, Notifier};
use crate::types::{GamePlayer, UserStats};
use crate::watch::{self, GameData, GameSnapshot, PlayerStatsWatcher, Watcher};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point of the crate: one backend, one configuration, one notice hub
#[derive(Clone)]
pub struct KiadisaClient {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    notifier: Notifier,
}

impl KiadisaClient {
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        tracing::debug!("Client using {} backend", backend.name());
        Self {
            backend,
            config,
            notifier: Notifier::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Notices emitted from now on
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn actions(&self) -> GameActions {
        GameActions::new(self.backend.clone(), self.notifier.clone())
    }

    pub fn watch_game_state(&self, code: &str) -> Watcher<GameSnapshot> {
        watch::watch_game_state(
            self.backend.clone(),
            code,
            &self.config,
            self.notifier.clone(),
        )
    }

    pub fn watch_current_player(&self, game_id: &str) -> Watcher<GamePlayer> {
        watch::watch_current_player(self.backend.clone(), game_id)
    }

    pub fn watch_player_stats(&self) -> PlayerStatsWatcher {
        watch::watch_player_stats(self.backend.clone())
    }

    pub fn watch_game_data(&self, code: &str) -> Watcher<GameData> {
        watch::watch_game_data(self.backend.clone(), code)
    }

    /// The signed-in user's stats row, created on first use
    pub async fn player_stats(&self) -> crate::error::KiadisaResult<UserStats> {
        watch::fetch_or_create_stats(self.backend.as_ref()).await
    }
}
