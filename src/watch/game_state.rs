use super::{WatchBuilder, Watcher};
use crate::backend::{Backend, Subscription, Table};
use crate::config::ClientConfig;
use crate::error::{KiadisaError, KiadisaResult};
use crate::notice::Notifier;
use crate::types::*;
use futures::FutureExt;
use std::sync::Arc;

/// A game with its players and current round, fetched as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub game: Game,
    pub players: Vec<GamePlayer>,
    pub current_round: Option<Round>,
}

impl GameSnapshot {
    pub fn host(&self) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn player_for(&self, user_id: &str) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.user_id == user_id)
    }
}

/// Game by code, then its players, then the round matching `current_round`
pub async fn fetch_game_snapshot(backend: &dyn Backend, code: &str) -> KiadisaResult<GameSnapshot> {
    if code.is_empty() {
        return Err(KiadisaError::Validation("Join code is required".to_string()));
    }

    let game = backend
        .game_by_code(code)
        .await?
        .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

    let players = backend.players_for_game(&game.id).await?;

    let current_round = match game.current_round {
        Some(number) => backend.round_by_number(&game.id, number).await?,
        None => None,
    };

    tracing::debug!(
        "Fetched game {} ({} players, phase {})",
        game.code,
        players.len(),
        game.phase
    );
    Ok(GameSnapshot {
        game,
        players,
        current_round,
    })
}

/// Watch the game behind a join code, with deadline and retry from `config`
pub fn watch_game_state(
    backend: Arc<dyn Backend>,
    code: &str,
    config: &ClientConfig,
    notifier: Notifier,
) -> Watcher<GameSnapshot> {
    let code = code.to_string();
    let fetch_backend = backend.clone();
    // Until the game exists, only its code is known
    let initial = vec![Subscription::eq(Table::Games, "code", code.clone())];

    WatchBuilder::new(
        "game_state",
        backend,
        move || {
            let backend = fetch_backend.clone();
            let code = code.clone();
            async move { fetch_game_snapshot(backend.as_ref(), &code).await }.boxed()
        },
        |snapshot: &GameSnapshot| {
            let game_id = snapshot.game.id.clone();
            vec![
                Subscription::eq(Table::Games, "id", game_id.clone()),
                Subscription::eq(Table::GamePlayers, "game_id", game_id.clone()),
                Subscription::eq(Table::Rounds, "game_id", game_id),
            ]
        },
    )
    .initial_subscriptions(initial)
    .deadline(config.fetch_timeout)
    .retry(config.retry)
    .notifier(notifier)
    .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::GameActions;
    use crate::backend::MemoryBackend;
    use crate::notice::NoticeLevel;
    use crate::watch::Resource;
    use std::time::Duration;
    use tokio::time::Instant;

    async fn hosted_game(backend: &MemoryBackend) -> (MemoryBackend, String, String) {
        let (host, _) = backend.as_user("Alex").await;
        let actions = GameActions::new(Arc::new(host.clone()), Notifier::new());
        let created = actions
            .create_game(GameSettings::default())
            .await
            .unwrap();
        (host, created.game_id, created.code)
    }

    #[tokio::test]
    async fn test_snapshot_merges_game_players_and_round() {
        let backend = MemoryBackend::new();
        let (_, game_id, code) = hosted_game(&backend).await;
        backend.seed_round(&game_id, 1, "kikadi").await;
        backend.seed_round(&game_id, 2, "kidivrai").await;

        let snapshot = fetch_game_snapshot(&backend, &code).await.unwrap();
        assert_eq!(snapshot.game.id, game_id);
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.host().is_some());
        let round = snapshot.current_round.unwrap();
        assert_eq!(round.round_number, Some(1));
        assert_eq!(round.mini_game_id.as_deref(), Some("kikadi"));
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let backend = MemoryBackend::new();
        let result = fetch_game_snapshot(&backend, "NOPE00").await;
        assert_eq!(result, Err(KiadisaError::NotFound("Game".to_string())));

        let result = fetch_game_snapshot(&backend, "").await;
        assert!(matches!(result, Err(KiadisaError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let backend = MemoryBackend::new();
        let (_, _, code) = hosted_game(&backend).await;
        backend
            .fail_next_reads(2, KiadisaError::Network("Failed to fetch".into()))
            .await;

        let start = Instant::now();
        let watcher = watch_game_state(
            Arc::new(backend.clone()),
            &code,
            &ClientConfig::default(),
            Notifier::new(),
        );

        let snapshot = watcher.ready().await.unwrap();
        assert_eq!(snapshot.game.code, code);
        assert_eq!(backend.code_lookups(), 3);
        assert!(!watcher.view().is_retrying);
        // Backoff of 1 s then 2 s
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fetch_times_out_at_deadline() {
        let backend = MemoryBackend::new();
        let (_, _, code) = hosted_game(&backend).await;
        backend.set_stalled(true).await;

        let start = Instant::now();
        let watcher = watch_game_state(
            Arc::new(backend.clone()),
            &code,
            &ClientConfig::default(),
            Notifier::new(),
        );

        let view = watcher.wait_until(|v| v.resource.error().is_some()).await;
        let elapsed = start.elapsed();
        assert!(view.resource.error().unwrap().contains("Timeout"));
        assert!(view.is_retrying);
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_millis(10_001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_publish_error_and_notice() {
        let backend = MemoryBackend::new();
        let (_, _, code) = hosted_game(&backend).await;
        backend
            .fail_next_reads(10, KiadisaError::Network("Failed to fetch".into()))
            .await;
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();

        let watcher = watch_game_state(
            Arc::new(backend.clone()),
            &code,
            &ClientConfig::default(),
            notifier,
        );

        let view = watcher
            .wait_until(|v| v.resource.error().is_some() && !v.is_retrying)
            .await;
        assert!(matches!(view.resource, Resource::Error { .. }));
        // First attempt plus three retries
        assert_eq!(backend.code_lookups(), 4);

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.title, "Connection problem");
    }

    #[tokio::test]
    async fn test_phase_change_triggers_refetch() {
        let backend = MemoryBackend::new();
        let (host, game_id, code) = hosted_game(&backend).await;
        let watcher = watch_game_state(
            Arc::new(backend.clone()),
            &code,
            &ClientConfig::default(),
            Notifier::new(),
        );
        assert_eq!(watcher.ready().await.unwrap().game.phase, GamePhase::Intro);

        let actions = GameActions::new(Arc::new(host), Notifier::new());
        actions.advance_phase(&game_id).await.unwrap();

        let view = watcher
            .wait_until(|v| {
                v.resource
                    .data()
                    .is_some_and(|s| s.game.phase == GamePhase::Answer)
            })
            .await;
        assert!(!view.is_retrying);
    }

    #[tokio::test]
    async fn test_new_player_triggers_refetch() {
        let backend = MemoryBackend::new();
        let (_, _, code) = hosted_game(&backend).await;
        let watcher = watch_game_state(
            Arc::new(backend.clone()),
            &code,
            &ClientConfig::default(),
            Notifier::new(),
        );
        assert_eq!(watcher.ready().await.unwrap().players.len(), 1);

        let (guest, guest_user) = backend.as_user("Marie").await;
        let actions = GameActions::new(Arc::new(guest), Notifier::new());
        actions.join_game(&code).await.unwrap();

        let view = watcher
            .wait_until(|v| v.resource.data().is_some_and(|s| s.players.len() == 2))
            .await;
        let snapshot = view.resource.data().unwrap();
        assert!(snapshot.player_for(&guest_user.id).is_some());
    }
}
