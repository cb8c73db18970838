//! The hosted backend seam: typed table access, auth and change notifications

mod memory;
mod rest;

use crate::error::KiadisaResult;
use crate::types::*;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// Capacity of the change-notification channel
pub(crate) const CHANGE_FEED_CAPACITY: usize = 256;

/// Tables exposed by the hosted backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Games,
    GamePlayers,
    Rounds,
    Answers,
    Votes,
    UserStats,
    Profiles,
    Questions,
    ShopItems,
    UserPurchases,
    GameHistory,
    Achievements,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Games => "games",
            Table::GamePlayers => "game_players",
            Table::Rounds => "rounds",
            Table::Answers => "answers",
            Table::Votes => "votes",
            Table::UserStats => "user_stats",
            Table::Profiles => "profiles",
            Table::Questions => "questions",
            Table::ShopItems => "shop_items",
            Table::UserPurchases => "user_purchases",
            Table::GameHistory => "game_history",
            Table::Achievements => "achievements",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A "row changed" notification; consumers only use it as a re-fetch trigger
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// The row after the change, used for filter matching only
    pub record: serde_json::Value,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(table: Table, kind: ChangeKind, row: &T) -> Self {
        Self {
            table,
            kind,
            record: serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Row filter of a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// `column = value`
    Eq(&'static str, String),
}

/// One watched table plus its filter
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub table: Table,
    pub filter: Filter,
}

impl Subscription {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: Filter::All,
        }
    }

    pub fn eq(table: Table, column: &'static str, value: impl Into<String>) -> Self {
        Self {
            table,
            filter: Filter::Eq(column, value.into()),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.filter {
            Filter::All => true,
            Filter::Eq(column, value) => event
                .record
                .get(*column)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == value),
        }
    }
}

/// A filtered view over the backend's change notifications
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeEvent>,
    subscriptions: Vec<Subscription>,
}

impl ChangeFeed {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, subscriptions: Vec<Subscription>) -> Self {
        Self { rx, subscriptions }
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Replace the filters; queued notifications are kept
    pub fn set_subscriptions(&mut self, subscriptions: Vec<Subscription>) {
        self.subscriptions = subscriptions;
    }

    /// Wait for the next matching notification. `None` once the feed is closed.
    ///
    /// A lagged receiver has missed events it cannot inspect, so lagging counts
    /// as a match.
    pub async fn next(&mut self) -> Option<()> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.subscriptions.iter().any(|s| s.matches(&event)) => {
                    tracing::debug!("Change on {} ({:?})", event.table.name(), event.kind);
                    return Some(());
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Change feed lagged, skipped {} events", skipped);
                    return Some(());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Discard queued notifications, returning whether any of them matched
    pub fn drain(&mut self) -> bool {
        let mut matched = false;
        loop {
            match self.rx.try_recv() {
                Ok(event) => matched |= self.subscriptions.iter().any(|s| s.matches(&event)),
                Err(broadcast::error::TryRecvError::Lagged(_)) => matched = true,
                Err(_) => return matched,
            }
        }
    }
}

/// Trait that every backend implementation must provide
///
/// Methods mirror the queries the client issues against the hosted tables.
/// Lookups that may legitimately find nothing return `Option`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The signed-in user, if any
    async fn current_user(&self) -> KiadisaResult<Option<AuthUser>>;

    async fn game_by_code(&self, code: &str) -> KiadisaResult<Option<Game>>;
    async fn game_by_id(&self, game_id: &str) -> KiadisaResult<Option<Game>>;
    async fn insert_game(&self, game: NewGame) -> KiadisaResult<Game>;
    async fn update_game(&self, game_id: &str, patch: GamePatch) -> KiadisaResult<()>;

    async fn players_for_game(&self, game_id: &str) -> KiadisaResult<Vec<GamePlayer>>;
    async fn player_in_game(&self, game_id: &str, user_id: &str)
        -> KiadisaResult<Option<GamePlayer>>;
    async fn insert_player(&self, player: NewGamePlayer) -> KiadisaResult<GamePlayer>;

    async fn round_by_number(&self, game_id: &str, round_number: u32)
        -> KiadisaResult<Option<Round>>;

    async fn insert_answer(&self, answer: NewAnswer) -> KiadisaResult<Answer>;
    async fn answers_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Answer>>;

    /// Insert or overwrite the vote keyed on (player_id, round_id)
    async fn upsert_vote(&self, vote: NewVote) -> KiadisaResult<Vote>;
    async fn votes_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Vote>>;

    async fn user_stats(&self, user_id: &str) -> KiadisaResult<Option<UserStats>>;
    async fn insert_user_stats(&self, stats: UserStats) -> KiadisaResult<UserStats>;
    async fn update_user_stats(&self, user_id: &str, patch: StatsPatch) -> KiadisaResult<()>;

    async fn profiles(&self, user_ids: &[UserId]) -> KiadisaResult<Vec<Profile>>;

    /// Receiver for every change notification the backend emits
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Name of this backend, for logging
    fn name(&self) -> &str;
}

/// Open a filtered change feed on a backend
pub fn subscribe(backend: &dyn Backend, subscriptions: Vec<Subscription>) -> ChangeFeed {
    ChangeFeed::new(backend.changes(), subscriptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_matches_on_column() {
        let sub = Subscription::eq(Table::GamePlayers, "game_id", "g1");
        let hit = ChangeEvent {
            table: Table::GamePlayers,
            kind: ChangeKind::Insert,
            record: serde_json::json!({ "game_id": "g1" }),
        };
        let other_game = ChangeEvent {
            record: serde_json::json!({ "game_id": "g2" }),
            ..hit.clone()
        };
        let other_table = ChangeEvent {
            table: Table::Votes,
            ..hit.clone()
        };

        assert!(sub.matches(&hit));
        assert!(!sub.matches(&other_game));
        assert!(!sub.matches(&other_table));
        assert!(Subscription::table(Table::GamePlayers).matches(&other_game));
    }

    #[tokio::test]
    async fn test_feed_skips_unrelated_events_and_drains() {
        let (tx, rx) = broadcast::channel(8);
        let mut feed = ChangeFeed::new(rx, vec![Subscription::table(Table::Votes)]);

        tx.send(ChangeEvent {
            table: Table::Answers,
            kind: ChangeKind::Insert,
            record: serde_json::Value::Null,
        })
        .unwrap();
        tx.send(ChangeEvent {
            table: Table::Votes,
            kind: ChangeKind::Update,
            record: serde_json::Value::Null,
        })
        .unwrap();
        assert_eq!(feed.next().await, Some(()));
        assert!(!feed.drain());

        tx.send(ChangeEvent {
            table: Table::Votes,
            kind: ChangeKind::Insert,
            record: serde_json::Value::Null,
        })
        .unwrap();
        assert!(feed.drain());

        drop(tx);
        assert_eq!(feed.next().await, None);
    }
}
