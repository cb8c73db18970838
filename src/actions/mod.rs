//! Mutating requests against the hosted backend
//!
//! Every action needs a signed-in user. Outcomes are logged and reported as
//! notices; the caller gets a plain `Result` carrying the backend's error text.

mod answer;
mod game;
mod phase;
mod vote;

use crate::backend::Backend;
use crate::error::{KiadisaError, KiadisaResult};
use crate::notice::{ErrorEvent, Notice, Notifier};
use crate::types::AuthUser;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub use game::{generate_join_code, CreatedGame, JoinedGame};
pub use phase::{next_phase, PhaseStep};
pub use vote::tally_votes;

#[derive(Clone)]
pub struct GameActions {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when an action finishes
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GameActions {
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier) -> Self {
        Self {
            backend,
            notifier,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// True while any action started from this handle is running
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn begin(&self) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(self.in_flight.clone())
    }

    async fn require_user(&self) -> KiadisaResult<AuthUser> {
        self.backend
            .current_user()
            .await?
            .ok_or(KiadisaError::NotAuthenticated)
    }

    /// Report an action outcome: success notice, or logged error plus error notice
    fn report<T>(
        &self,
        action: &str,
        result: KiadisaResult<T>,
        success: impl FnOnce(&T) -> Notice,
    ) -> KiadisaResult<T> {
        match &result {
            Ok(value) => self.notifier.notify(success(value)),
            Err(e) => {
                tracing::error!("Error in {}: {}", action, e);
                self.notifier.report_error(
                    ErrorEvent::from_action_error(e)
                        .with_context(serde_json::json!({ "action": action })),
                );
            }
        }
        result
    }
}
