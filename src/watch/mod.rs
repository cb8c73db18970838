//! Re-fetching views over backend rows
//!
//! A watcher runs one fetch, publishes the result, then waits for a change
//! notification on its subscribed tables (or a manual refetch) and fetches
//! again. Fetches never overlap: triggers that arrive while a fetch is running
//! are coalesced into a single follow-up fetch.

mod current_player;
mod game_data;
mod game_state;
mod player_stats;
mod retry;

use crate::backend::{Backend, ChangeFeed, Subscription};
use crate::error::KiadisaResult;
use crate::notice::{ErrorEvent, Notifier};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use current_player::{fetch_current_player, watch_current_player};
pub use game_data::{fetch_game_data, watch_game_data, GameData, PlayerWithProfile};
pub use game_state::{fetch_game_snapshot, watch_game_state, GameSnapshot};
pub use player_stats::{fetch_or_create_stats, watch_player_stats, PlayerStatsWatcher};
pub use retry::{with_deadline, RetryPolicy};

/// State of a fetched value
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    Loading,
    Error { message: String },
    Ready(T),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Resource::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// What a watcher publishes
#[derive(Debug, Clone, PartialEq)]
pub struct View<T> {
    pub resource: Resource<T>,
    /// A failed fetch will be attempted again after a backoff
    pub is_retrying: bool,
}

impl<T> View<T> {
    fn new(resource: Resource<T>, is_retrying: bool) -> Self {
        Self {
            resource,
            is_retrying,
        }
    }
}

type FetchFn<T> = Box<dyn Fn() -> BoxFuture<'static, KiadisaResult<T>> + Send + Sync>;
type SubscriptionsFn<T> = Box<dyn Fn(&T) -> Vec<Subscription> + Send + Sync>;

/// Handle to a running watcher; dropping it stops the task and its subscriptions
pub struct Watcher<T> {
    rx: watch::Receiver<View<T>>,
    refetch_tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl<T: Clone> Watcher<T> {
    /// Latest published view
    pub fn view(&self) -> View<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<View<T>> {
        self.rx.clone()
    }

    /// Request a fresh fetch
    pub fn refetch(&self) {
        let _ = self.refetch_tx.send(());
    }

    /// Wait until the published view satisfies `predicate`
    pub async fn wait_until(&self, mut predicate: impl FnMut(&View<T>) -> bool) -> View<T> {
        let mut rx = self.rx.clone();
        let view = match rx.wait_for(|view| predicate(view)).await {
            Ok(view) => view.clone(),
            // Task gone: nothing else will be published
            Err(_) => self.view(),
        };
        view
    }

    /// Wait for the next `Ready` value
    pub async fn ready(&self) -> Option<T> {
        self.wait_until(|view| view.resource.data().is_some())
            .await
            .resource
            .data()
            .cloned()
    }
}

impl<T> Drop for Watcher<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything a watcher task needs
pub(crate) struct WatchBuilder<T> {
    pub name: &'static str,
    pub backend: Arc<dyn Backend>,
    pub fetch: FetchFn<T>,
    /// Tables to watch, derived from the last fetched value
    pub subscriptions: SubscriptionsFn<T>,
    /// Tables to watch until a fetch succeeds
    pub initial_subscriptions: Vec<Subscription>,
    pub deadline: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub notifier: Option<Notifier>,
}

impl<T> WatchBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        backend: Arc<dyn Backend>,
        fetch: impl Fn() -> BoxFuture<'static, KiadisaResult<T>> + Send + Sync + 'static,
        subscriptions: impl Fn(&T) -> Vec<Subscription> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            backend,
            fetch: Box::new(fetch),
            subscriptions: Box::new(subscriptions),
            initial_subscriptions: Vec::new(),
            deadline: None,
            retry: None,
            notifier: None,
        }
    }

    pub fn initial_subscriptions(mut self, subscriptions: Vec<Subscription>) -> Self {
        self.initial_subscriptions = subscriptions;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn spawn(self) -> Watcher<T> {
        let (tx, rx) = watch::channel(View::new(Resource::Loading, false));
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(tx, refetch_rx));
        Watcher {
            rx,
            refetch_tx,
            task,
        }
    }

    async fn run(self, tx: watch::Sender<View<T>>, mut refetch_rx: mpsc::UnboundedReceiver<()>) {
        // Subscribe before the first fetch so changes made while it runs still
        // trigger a follow-up
        let mut feed = Some(ChangeFeed::new(
            self.backend.changes(),
            self.initial_subscriptions.clone(),
        ));

        loop {
            match self.fetch_with_retry(&tx).await {
                Ok(data) => {
                    if let Some(feed) = feed.as_mut() {
                        let subscriptions = (self.subscriptions)(&data);
                        if feed.subscriptions() != subscriptions.as_slice() {
                            tracing::debug!(
                                "{} watching {} tables",
                                self.name,
                                subscriptions.len()
                            );
                            feed.set_subscriptions(subscriptions);
                        }
                    }
                    tx.send_replace(View::new(Resource::Ready(data), false));
                }
                Err(e) => {
                    tracing::error!("{} fetch failed: {}", self.name, e);
                    if let Some(notifier) = &self.notifier {
                        notifier.report_error(
                            ErrorEvent::from_action_error(&e)
                                .with_context(serde_json::json!({ "watcher": self.name })),
                        );
                    }
                }
            }

            // Wait for a trigger
            loop {
                let triggered = match feed.as_mut() {
                    Some(changes) => tokio::select! {
                        change = changes.next() => {
                            if change.is_none() {
                                feed = None;
                                continue;
                            }
                            true
                        }
                        request = refetch_rx.recv() => request.is_some(),
                    },
                    None => refetch_rx.recv().await.is_some(),
                };
                if !triggered {
                    // Handle dropped
                    return;
                }
                break;
            }

            // Coalesce everything queued behind this trigger
            if let Some(changes) = feed.as_mut() {
                changes.drain();
            }
            while refetch_rx.try_recv().is_ok() {}
            tracing::debug!("{} re-fetching", self.name);
        }
    }

    async fn attempt(&self) -> KiadisaResult<T> {
        match self.deadline {
            Some(deadline) => with_deadline(deadline, (self.fetch)()).await,
            None => (self.fetch)().await,
        }
    }

    async fn fetch_with_retry(&self, tx: &watch::Sender<View<T>>) -> KiadisaResult<T> {
        let mut retries = 0;
        loop {
            tx.send_replace(View::new(Resource::Loading, retries > 0));

            let error = match self.attempt().await {
                Ok(data) => return Ok(data),
                Err(e) => e,
            };

            let policy = self
                .retry
                .filter(|policy| error.is_retryable() && retries < policy.max_retries);
            tx.send_replace(View::new(
                Resource::Error {
                    message: error.to_string(),
                },
                policy.is_some(),
            ));

            let Some(policy) = policy else {
                return Err(error);
            };
            let delay = policy.delay_for(retries);
            retries += 1;
            tracing::warn!(
                "{} fetch failed ({}), retry {}/{} in {:?}",
                self.name,
                error,
                retries,
                policy.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
