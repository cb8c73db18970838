use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiadisa::backend::{MemoryBackend, RestBackend};
use kiadisa::config::ClientConfig;
use kiadisa::minigame::{
    AnswerInput, MiniGameKind, MiniGameRunner, MiniGameTimings, VoteInput, PLAYER_SLOTS,
};
use kiadisa::party::{Party, PartyProgress};
use kiadisa::progress::{estimated_minutes, SettingsDraft};
use kiadisa::types::{Ambiance, GameMode, GamePhase, GameSettings, StatsPatch};
use kiadisa::{KiadisaClient, KiadisaError, KiadisaResult};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiadisa=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting KIADISA...");

    let config = ClientConfig::from_env();
    let result = match config.rest_endpoint() {
        Some((url, key)) => run_remote(url.to_string(), key.to_string(), config.clone()).await,
        None => run_local_party(config).await,
    };

    if let Err(e) = result {
        tracing::error!("KIADISA stopped: {}", e);
    }
}

/// Sign in to the hosted backend and open a game there
async fn run_remote(url: String, anon_key: String, config: ClientConfig) -> KiadisaResult<()> {
    let backend = RestBackend::new(url, anon_key)?;

    let user = match (&config.access_token, &config.email, &config.password) {
        (Some(token), _, _) => backend.with_access_token(token).await?,
        (None, Some(email), Some(password)) => {
            backend.sign_in_with_password(email, password).await?
        }
        _ => {
            return Err(KiadisaError::Config(
                "Set SUPABASE_ACCESS_TOKEN or KIADISA_EMAIL and KIADISA_PASSWORD".to_string(),
            ))
        }
    };
    tracing::info!("Signed in as {}", user.email.as_deref().unwrap_or(&user.id));

    let client = KiadisaClient::new(Arc::new(backend), config);
    let stats = client.player_stats().await?;
    tracing::info!(
        "Level {} with {} XP, {} games played",
        stats.level,
        stats.total_xp,
        stats.games_played
    );

    let created = client.actions().create_game(GameSettings::default()).await?;
    let watcher = client.watch_game_state(&created.code);
    if let Some(snapshot) = watcher.ready().await {
        tracing::info!(
            "Game {} is {:?} with {} player(s); share code {}",
            snapshot.game.id,
            snapshot.game.status,
            snapshot.players.len(),
            created.code
        );
    }
    Ok(())
}

/// Demo timings, faster than a real table
fn demo_timings() -> MiniGameTimings {
    MiniGameTimings {
        intro_tick: Duration::from_millis(200),
        type_char: Duration::from_millis(20),
        typing_hold: Duration::from_millis(200),
        reveal: Duration::from_millis(600),
    }
}

/// Play a whole party with three simulated players on the in-memory backend
async fn run_local_party(config: ClientConfig) -> KiadisaResult<()> {
    tracing::info!("No hosted backend configured, playing a local demo party");
    let backend = MemoryBackend::new();

    let mut clients = Vec::new();
    let mut user_ids = Vec::new();
    for name in PLAYER_SLOTS {
        let (handle, user) = backend.as_user(name).await;
        clients.push(KiadisaClient::new(Arc::new(handle), config.clone()));
        user_ids.push(user.id);
    }
    let host = &clients[0];

    let settings = SettingsDraft {
        mode: Some(GameMode::Classique),
        ambiance: Some(Ambiance::Safe),
        mini_games: MiniGameKind::ROTATION
            .iter()
            .map(|kind| kind.id().to_string())
            .collect(),
        total_rounds: 4,
        two_players_only: false,
    }
    .validate()?;
    tracing::info!(
        "Estimated duration: ~{} minutes",
        estimated_minutes(settings.total_rounds)
    );

    let total_rounds = settings.total_rounds;
    let created = host.actions().create_game(settings).await?;
    for guest in &clients[1..] {
        guest.actions().join_game(&created.code).await?;
    }

    // Log every phase the players' screens would show
    let watcher = host.watch_game_state(&created.code);
    let mut views = watcher.subscribe();
    let phase_log = tokio::spawn(async move {
        let mut last = None;
        while views.changed().await.is_ok() {
            let current = views
                .borrow_and_update()
                .resource
                .data()
                .map(|s| (s.game.phase, s.game.current_round));
            if let Some((phase, round)) = current.filter(|c| Some(*c) != last) {
                tracing::info!("Screen: round {:?}, phase {}", round, phase);
                last = current;
            }
        }
    });

    host.actions().start_game(&created.game_id).await?;

    let mut party = Party::new(total_rounds);
    loop {
        let kind = party.current_game();
        let round = backend
            .seed_round(&created.game_id, party.current_round(), kind.id())
            .await;
        tracing::info!(
            "Round {}/{}: {} - {}",
            party.current_round(),
            party.total_rounds(),
            kind,
            kind.question()
        );

        let mut runner = MiniGameRunner::new(kind, demo_timings());
        runner.run_intro().await?;
        advance(host, &created.game_id).await?;

        if kind.has_answer_phase() {
            let (input, content, is_bluff) = match kind {
                MiniGameKind::KiKaDi => {
                    let text = "La vie est belle quand on sait la regarder";
                    (AnswerInput::Text(text.to_string()), text, false)
                }
                MiniGameKind::KiDiVrai => {
                    let text = "J'ai dit que le chat avait mangé mes devoirs";
                    (
                        AnswerInput::Bluff {
                            content: text.to_string(),
                            is_bluff: true,
                        },
                        text,
                        true,
                    )
                }
                _ => (AnswerInput::Experienced(true), "oui", false),
            };
            for client in &clients {
                client
                    .actions()
                    .submit_answer(&round.id, content, is_bluff)
                    .await?;
            }
            runner.answer(input)?;
        }
        advance(host, &created.game_id).await?;

        // Guests vote for the host
        for client in &clients[1..] {
            client
                .actions()
                .submit_vote(&round.id, &user_ids[0], None, "guess")
                .await?;
        }
        let vote = match kind {
            MiniGameKind::KiDiVrai => VoteInput::Truth(false),
            MiniGameKind::KiDeja => VoteInput::Experiences(
                PLAYER_SLOTS
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.to_string(), i % 2 == 0))
                    .collect::<BTreeMap<_, _>>(),
            ),
            _ => VoteInput::Player(PLAYER_SLOTS[1].to_string()),
        };
        advance(host, &created.game_id).await?;
        let scores = runner.vote(vote).await?;
        advance(host, &created.game_id).await?;

        let progress = party.complete_round(scores);
        let next = advance(host, &created.game_id).await?;
        if progress == PartyProgress::Finished || next == GamePhase::Ended {
            break;
        }
    }

    let standings = party.standings();
    for (rank, standing) in standings.ranking.iter().enumerate() {
        tracing::info!("#{} {} with {} pts", rank + 1, standing.name, standing.score);
    }

    // Credit the winner
    if let Some(winner) = standings.winner() {
        if let Some(index) = PLAYER_SLOTS.iter().position(|name| *name == winner.name) {
            let stats_watcher = clients[index].watch_player_stats();
            if let Some(stats) = stats_watcher.ready().await {
                stats_watcher
                    .update_stats(StatsPatch {
                        games_played: Some(stats.games_played + 1),
                        games_won: Some(stats.games_won + 1),
                        coins: Some(stats.coins + standings.winner_coins),
                        ..Default::default()
                    })
                    .await;
                tracing::info!("{} earns {} coins", winner.name, standings.winner_coins);
            }
        }
    }
    tracing::info!("{}", standings.share_message());

    drop(watcher);
    phase_log.abort();
    Ok(())
}

async fn advance(host: &KiadisaClient, game_id: &str) -> KiadisaResult<GamePhase> {
    let step = host.actions().advance_phase(game_id).await?;
    Ok(step.phase)
}
