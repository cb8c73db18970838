use super::GameActions;
use crate::error::{KiadisaError, KiadisaResult};
use crate::notice::Notice;
use crate::types::*;

impl GameActions {
    /// Submit an answer for a round; bluffs are flagged at submission time
    pub async fn submit_answer(
        &self,
        round_id: &str,
        content: &str,
        is_bluff: bool,
    ) -> KiadisaResult<Answer> {
        let _loading = self.begin();
        let result = self.submit_answer_inner(round_id, content, is_bluff).await;
        self.report("submit_answer", result, |_| {
            Notice::success("Answer sent", "Your answer was submitted")
        })
    }

    async fn submit_answer_inner(
        &self,
        round_id: &str,
        content: &str,
        is_bluff: bool,
    ) -> KiadisaResult<Answer> {
        let user = self.require_user().await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(KiadisaError::Validation("Answer cannot be empty".to_string()));
        }

        let answer = self
            .backend
            .insert_answer(NewAnswer {
                player_id: user.id,
                round_id: round_id.to_string(),
                content: content.to_string(),
                is_bluff,
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .await?;

        tracing::info!("Answer {} submitted for round {}", answer.id, round_id);
        Ok(answer)
    }
}
