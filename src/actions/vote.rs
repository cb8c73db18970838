use super::GameActions;
use crate::error::KiadisaResult;
use crate::notice::Notice;
use crate::types::*;
use std::collections::HashMap;

/// Count votes per target player
pub fn tally_votes(votes: &[Vote]) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target_player_id.clone()).or_insert(0) += 1;
    }
    counts
}

impl GameActions {
    /// Cast or replace the caller's vote for a round
    pub async fn submit_vote(
        &self,
        round_id: &str,
        target_player_id: &str,
        answer_id: Option<&str>,
        vote_type: &str,
    ) -> KiadisaResult<Vote> {
        let _loading = self.begin();
        let result = self
            .submit_vote_inner(round_id, target_player_id, answer_id, vote_type)
            .await;
        self.report("submit_vote", result, |_| {
            Notice::success("Vote recorded", "Your vote was counted")
        })
    }

    async fn submit_vote_inner(
        &self,
        round_id: &str,
        target_player_id: &str,
        answer_id: Option<&str>,
        vote_type: &str,
    ) -> KiadisaResult<Vote> {
        let user = self.require_user().await?;

        let vote = self
            .backend
            .upsert_vote(NewVote {
                player_id: user.id,
                round_id: round_id.to_string(),
                target_player_id: target_player_id.to_string(),
                answer_id: answer_id.map(str::to_string),
                vote_type: vote_type.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .await?;

        tracing::info!(
            "Vote {} ({}) recorded for round {}",
            vote.id,
            vote.vote_type,
            round_id
        );
        Ok(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::error::KiadisaError;
    use crate::notice::Notifier;
    use std::sync::Arc;

    fn vote(player: &str, target: &str) -> Vote {
        Vote {
            id: ulid::Ulid::new().to_string(),
            player_id: player.to_string(),
            round_id: "r1".to_string(),
            target_player_id: target.to_string(),
            answer_id: None,
            vote_type: "guess".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_tally_votes() {
        assert!(tally_votes(&[]).is_empty());

        let counts = tally_votes(&[vote("a", "b"), vote("c", "b"), vote("b", "a")]);
        assert_eq!(counts.get("b"), Some(&2));
        assert_eq!(counts.get("a"), Some(&1));
        assert_eq!(counts.get("c"), None);
    }

    #[tokio::test]
    async fn test_second_vote_overwrites_first() {
        let backend = MemoryBackend::new();
        let (handle, user) = backend.as_user("Marie").await;
        let actions = GameActions::new(Arc::new(handle), Notifier::new());

        actions
            .submit_vote("r1", "alex", Some("a1"), "bluff")
            .await
            .unwrap();
        actions
            .submit_vote("r1", "julien", None, "truth")
            .await
            .unwrap();

        let votes = backend.votes_for_round("r1").await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].player_id, user.id);
        assert_eq!(votes[0].target_player_id, "julien");
        assert_eq!(votes[0].answer_id, None);
        assert_eq!(votes[0].vote_type, "truth");
    }

    #[tokio::test]
    async fn test_vote_requires_sign_in() {
        let backend = MemoryBackend::new();
        let actions = GameActions::new(Arc::new(backend.clone()), Notifier::new());

        let result = actions.submit_vote("r1", "alex", None, "guess").await;
        assert_eq!(result, Err(KiadisaError::NotAuthenticated));
        assert!(backend.votes.read().await.is_empty());
    }
}
