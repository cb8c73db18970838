use super::{Backend, ChangeEvent, ChangeKind, Table, CHANGE_FEED_CAPACITY};
use crate::error::{KiadisaError, KiadisaResult};
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};

/// Injected read failures, for exercising retry and timeout handling
#[derive(Debug, Default)]
struct FaultPlan {
    failures: Vec<KiadisaError>,
    stalled: bool,
}

/// In-process stand-in for the hosted backend
///
/// Clones share the tables and the change feed. The signed-in user belongs to
/// the handle, so [`MemoryBackend::as_user`] gives each simulated client its
/// own session over the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    session: Arc<RwLock<Option<AuthUser>>>,
    pub games: Arc<RwLock<HashMap<GameId, Game>>>,
    pub players: Arc<RwLock<HashMap<PlayerId, GamePlayer>>>,
    pub rounds: Arc<RwLock<HashMap<RoundId, Round>>>,
    pub answers: Arc<RwLock<HashMap<AnswerId, Answer>>>,
    pub votes: Arc<RwLock<HashMap<String, Vote>>>,
    pub stats: Arc<RwLock<HashMap<UserId, UserStats>>>,
    pub profiles: Arc<RwLock<HashMap<UserId, Profile>>>,
    faults: Arc<RwLock<FaultPlan>>,
    code_lookups: Arc<AtomicUsize>,
    ids: Arc<Mutex<ulid::Generator>>,
    change_tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (change_tx, _rx) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            session: Arc::new(RwLock::new(None)),
            games: Arc::new(RwLock::new(HashMap::new())),
            players: Arc::new(RwLock::new(HashMap::new())),
            rounds: Arc::new(RwLock::new(HashMap::new())),
            answers: Arc::new(RwLock::new(HashMap::new())),
            votes: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(HashMap::new())),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(RwLock::new(FaultPlan::default())),
            code_lookups: Arc::new(AtomicUsize::new(0)),
            ids: Arc::new(Mutex::new(ulid::Generator::new())),
            change_tx,
        }
    }

    /// A handle over the same tables, signed in as `pseudo`
    ///
    /// Creates the user's profile on first use.
    pub async fn as_user(&self, pseudo: &str) -> (Self, AuthUser) {
        let existing = self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.pseudo == pseudo)
            .map(|p| p.id.clone());

        let user_id = match existing {
            Some(id) => id,
            None => {
                let profile = Profile {
                    id: self.next_id(),
                    pseudo: pseudo.to_string(),
                    avatar: None,
                    email: None,
                };
                let id = profile.id.clone();
                self.profiles.write().await.insert(id.clone(), profile.clone());
                self.emit(Table::Profiles, ChangeKind::Insert, &profile);
                id
            }
        };

        let user = AuthUser {
            id: user_id,
            email: None,
        };
        let handle = Self {
            session: Arc::new(RwLock::new(Some(user.clone()))),
            ..self.clone()
        };
        (handle, user)
    }

    /// Row ids increase strictly, so sorting by id keeps insertion order
    fn next_id(&self) -> String {
        let generated = match self.ids.lock() {
            Ok(mut ids) => ids.generate().ok(),
            Err(_) => None,
        };
        generated.unwrap_or_else(ulid::Ulid::new).to_string()
    }

    pub async fn sign_out(&self) {
        *self.session.write().await = None;
    }

    /// Insert a round row, standing in for rounds created server-side
    pub async fn seed_round(&self, game_id: &str, round_number: u32, mini_game_id: &str) -> Round {
        let round = Round {
            id: self.next_id(),
            game_id: game_id.to_string(),
            round_number: Some(round_number),
            mini_game_id: Some(mini_game_id.to_string()),
            question_id: None,
            status: Some("pending".to_string()),
            started_at: Some(chrono::Utc::now().to_rfc3339()),
            completed_at: None,
        };
        self.rounds
            .write()
            .await
            .insert(round.id.clone(), round.clone());
        self.emit(Table::Rounds, ChangeKind::Insert, &round);
        round
    }

    /// Make the next `count` reads fail with `error`
    pub async fn fail_next_reads(&self, count: usize, error: KiadisaError) {
        let mut faults = self.faults.write().await;
        faults.failures.extend((0..count).map(|_| error.clone()));
    }

    /// While stalled, reads never complete
    pub async fn set_stalled(&self, stalled: bool) {
        self.faults.write().await.stalled = stalled;
    }

    /// Number of lookups by join code served so far, failed ones included
    pub fn code_lookups(&self) -> usize {
        self.code_lookups.load(Ordering::SeqCst)
    }

    async fn check_faults(&self) -> KiadisaResult<()> {
        let stalled = {
            let mut faults = self.faults.write().await;
            if !faults.failures.is_empty() {
                return Err(faults.failures.remove(0));
            }
            faults.stalled
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn emit<T: serde::Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        // No receivers is fine
        let _ = self.change_tx.send(ChangeEvent::new(table, kind, row));
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_user(&self) -> KiadisaResult<Option<AuthUser>> {
        Ok(self.session.read().await.clone())
    }

    async fn game_by_code(&self, code: &str) -> KiadisaResult<Option<Game>> {
        self.code_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_faults().await?;
        Ok(self
            .games
            .read()
            .await
            .values()
            .find(|g| g.code == code)
            .cloned())
    }

    async fn game_by_id(&self, game_id: &str) -> KiadisaResult<Option<Game>> {
        self.check_faults().await?;
        Ok(self.games.read().await.get(game_id).cloned())
    }

    async fn insert_game(&self, game: NewGame) -> KiadisaResult<Game> {
        let row = Game {
            id: self.next_id(),
            code: game.code,
            status: game.status,
            phase: game.phase,
            current_round: Some(game.current_round),
            total_rounds: Some(game.total_rounds),
            host: Some(game.host),
            settings: game.settings,
            current_game: None,
            created_at: Some(Self::now()),
        };
        self.games.write().await.insert(row.id.clone(), row.clone());
        self.emit(Table::Games, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update_game(&self, game_id: &str, patch: GamePatch) -> KiadisaResult<()> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| KiadisaError::NotFound("Game".to_string()))?;

        if let Some(phase) = patch.phase {
            game.phase = phase;
        }
        if let Some(round) = patch.current_round {
            game.current_round = Some(round);
        }
        if let Some(status) = patch.status {
            game.status = status;
        }

        let row = game.clone();
        drop(games);
        self.emit(Table::Games, ChangeKind::Update, &row);
        Ok(())
    }

    async fn players_for_game(&self, game_id: &str) -> KiadisaResult<Vec<GamePlayer>> {
        self.check_faults().await?;
        let mut players: Vec<GamePlayer> = self
            .players
            .read()
            .await
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        // Ids are monotonic
        players.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(players)
    }

    async fn player_in_game(
        &self,
        game_id: &str,
        user_id: &str,
    ) -> KiadisaResult<Option<GamePlayer>> {
        self.check_faults().await?;
        Ok(self
            .players
            .read()
            .await
            .values()
            .find(|p| p.game_id == game_id && p.user_id == user_id)
            .cloned())
    }

    async fn insert_player(&self, player: NewGamePlayer) -> KiadisaResult<GamePlayer> {
        let row = GamePlayer {
            id: self.next_id(),
            game_id: player.game_id,
            user_id: player.user_id,
            is_host: player.is_host,
            score: player.score,
            coins: player.coins,
            xp: player.xp,
            level: player.level,
        };
        self.players
            .write()
            .await
            .insert(row.id.clone(), row.clone());
        self.emit(Table::GamePlayers, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn round_by_number(
        &self,
        game_id: &str,
        round_number: u32,
    ) -> KiadisaResult<Option<Round>> {
        self.check_faults().await?;
        Ok(self
            .rounds
            .read()
            .await
            .values()
            .find(|r| r.game_id == game_id && r.round_number == Some(round_number))
            .cloned())
    }

    async fn insert_answer(&self, answer: NewAnswer) -> KiadisaResult<Answer> {
        let row = Answer {
            id: self.next_id(),
            player_id: answer.player_id,
            round_id: answer.round_id,
            content: answer.content,
            is_bluff: answer.is_bluff,
            timestamp: answer.timestamp,
        };
        self.answers
            .write()
            .await
            .insert(row.id.clone(), row.clone());
        self.emit(Table::Answers, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn answers_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Answer>> {
        self.check_faults().await?;
        let mut answers: Vec<Answer> = self
            .answers
            .read()
            .await
            .values()
            .filter(|a| a.round_id == round_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(answers)
    }

    async fn upsert_vote(&self, vote: NewVote) -> KiadisaResult<Vote> {
        let mut votes = self.votes.write().await;
        let existing = votes
            .values_mut()
            .find(|v| v.player_id == vote.player_id && v.round_id == vote.round_id);

        let (row, kind) = match existing {
            Some(v) => {
                v.target_player_id = vote.target_player_id;
                v.answer_id = vote.answer_id;
                v.vote_type = vote.vote_type;
                v.timestamp = vote.timestamp;
                (v.clone(), ChangeKind::Update)
            }
            None => {
                let row = Vote {
                    id: self.next_id(),
                    player_id: vote.player_id,
                    round_id: vote.round_id,
                    target_player_id: vote.target_player_id,
                    answer_id: vote.answer_id,
                    vote_type: vote.vote_type,
                    timestamp: vote.timestamp,
                };
                votes.insert(row.id.clone(), row.clone());
                (row, ChangeKind::Insert)
            }
        };
        drop(votes);

        self.emit(Table::Votes, kind, &row);
        Ok(row)
    }

    async fn votes_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Vote>> {
        self.check_faults().await?;
        let mut votes: Vec<Vote> = self
            .votes
            .read()
            .await
            .values()
            .filter(|v| v.round_id == round_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(votes)
    }

    async fn user_stats(&self, user_id: &str) -> KiadisaResult<Option<UserStats>> {
        self.check_faults().await?;
        Ok(self.stats.read().await.get(user_id).cloned())
    }

    async fn insert_user_stats(&self, stats: UserStats) -> KiadisaResult<UserStats> {
        let mut table = self.stats.write().await;
        if table.contains_key(&stats.user_id) {
            return Err(KiadisaError::Backend(format!(
                "duplicate key value violates unique constraint: user_stats ({})",
                stats.user_id
            )));
        }
        table.insert(stats.user_id.clone(), stats.clone());
        drop(table);

        self.emit(Table::UserStats, ChangeKind::Insert, &stats);
        Ok(stats)
    }

    async fn update_user_stats(&self, user_id: &str, patch: StatsPatch) -> KiadisaResult<()> {
        let mut table = self.stats.write().await;
        // Like a filtered UPDATE, no matching row is not an error
        let Some(stats) = table.get_mut(user_id) else {
            return Ok(());
        };
        stats.apply(&patch);
        let row = stats.clone();
        drop(table);

        self.emit(Table::UserStats, ChangeKind::Update, &row);
        Ok(())
    }

    async fn profiles(&self, user_ids: &[UserId]) -> KiadisaResult<Vec<Profile>> {
        self.check_faults().await?;
        let profiles = self.profiles.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).cloned())
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_vote(player: &str, round: &str, target: &str, vote_type: &str) -> NewVote {
        NewVote {
            player_id: player.to_string(),
            round_id: round.to_string(),
            target_player_id: target.to_string(),
            answer_id: None,
            vote_type: vote_type.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_sessions_are_per_handle() {
        let backend = MemoryBackend::new();
        assert!(backend.current_user().await.unwrap().is_none());

        let (alice, alice_user) = backend.as_user("Alice").await;
        let (bob, bob_user) = backend.as_user("Bob").await;

        assert_eq!(alice.current_user().await.unwrap(), Some(alice_user.clone()));
        assert_eq!(bob.current_user().await.unwrap(), Some(bob_user));
        assert!(backend.current_user().await.unwrap().is_none());

        // Same pseudo maps to the same user
        let (_, again) = backend.as_user("Alice").await;
        assert_eq!(again.id, alice_user.id);
        assert_eq!(backend.profiles.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_vote_overwrites_per_player_and_round() {
        let backend = MemoryBackend::new();

        let first = backend
            .upsert_vote(new_vote("p1", "r1", "p2", "bluff"))
            .await
            .unwrap();
        let second = backend
            .upsert_vote(new_vote("p1", "r1", "p3", "truth"))
            .await
            .unwrap();
        backend
            .upsert_vote(new_vote("p2", "r1", "p1", "guess"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let votes = backend.votes_for_round("r1").await.unwrap();
        assert_eq!(votes.len(), 2);
        let p1_vote = votes.iter().find(|v| v.player_id == "p1").unwrap();
        assert_eq!(p1_vote.target_player_id, "p3");
        assert_eq!(p1_vote.vote_type, "truth");
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend
            .fail_next_reads(2, KiadisaError::Network("Failed to fetch".into()))
            .await;

        assert!(backend.game_by_code("NOPE00").await.is_err());
        assert!(backend.game_by_code("NOPE00").await.is_err());
        assert_eq!(backend.game_by_code("NOPE00").await.unwrap(), None);
        assert_eq!(backend.code_lookups(), 3);
    }

    #[tokio::test]
    async fn test_writes_emit_change_events() {
        let backend = MemoryBackend::new();
        let mut rx = backend.changes();

        let round = backend.seed_round("g1", 1, "kikadi").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, Table::Rounds);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["id"], serde_json::json!(round.id));
    }

    #[tokio::test]
    async fn test_rows_list_in_insertion_order() {
        let backend = MemoryBackend::new();

        // Many rows within the same millisecond
        let users: Vec<String> = (0..50).map(|i| format!("user-{i}")).collect();
        for user in &users {
            backend
                .insert_player(NewGamePlayer::fresh("g1", user, false))
                .await
                .unwrap();
            backend
                .insert_answer(NewAnswer {
                    player_id: user.clone(),
                    round_id: "r1".to_string(),
                    content: format!("answer from {user}"),
                    is_bluff: false,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                })
                .await
                .unwrap();
            backend
                .upsert_vote(new_vote(user, "r1", "user-0", "guess"))
                .await
                .unwrap();
        }

        let players = backend.players_for_game("g1").await.unwrap();
        let answers = backend.answers_for_round("r1").await.unwrap();
        let votes = backend.votes_for_round("r1").await.unwrap();
        assert_eq!(
            players.iter().map(|p| &p.user_id).collect::<Vec<_>>(),
            users.iter().collect::<Vec<_>>()
        );
        assert_eq!(
            answers.iter().map(|a| &a.player_id).collect::<Vec<_>>(),
            users.iter().collect::<Vec<_>>()
        );
        assert_eq!(
            votes.iter().map(|v| &v.player_id).collect::<Vec<_>>(),
            users.iter().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_update_missing_game_is_not_found() {
        let backend = MemoryBackend::new();
        let result = backend.update_game("missing", GamePatch::default()).await;
        assert_eq!(result, Err(KiadisaError::NotFound("Game".to_string())));
    }
}
