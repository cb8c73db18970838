use super::{AnswerInput, MiniGame, MiniGameError, MiniGameKind, MiniPhase, RoundScores, VoteInput};
use std::time::Duration;
use tokio::sync::watch;

/// Timer settings of a mini-game round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniGameTimings {
    pub intro_tick: Duration,
    pub type_char: Duration,
    /// Pause after the last typed character
    pub typing_hold: Duration,
    pub reveal: Duration,
}

impl Default for MiniGameTimings {
    fn default() -> Self {
        Self {
            intro_tick: Duration::from_secs(1),
            type_char: Duration::from_millis(100),
            typing_hold: Duration::from_secs(1),
            reveal: Duration::from_secs(3),
        }
    }
}

/// What a screen renders for the round
#[derive(Debug, Clone, PartialEq)]
pub struct MiniGameView {
    pub kind: MiniGameKind,
    pub phase: MiniPhase,
    pub countdown: u32,
    pub typed_text: String,
    pub scores: Option<RoundScores>,
}

impl From<&MiniGame> for MiniGameView {
    fn from(game: &MiniGame) -> Self {
        Self {
            kind: game.kind(),
            phase: game.phase(),
            countdown: game.countdown(),
            typed_text: game.typed_text(),
            scores: game.scores(),
        }
    }
}

/// Drives a [`MiniGame`] on tokio timers and publishes every state change
pub struct MiniGameRunner {
    game: MiniGame,
    timings: MiniGameTimings,
    tx: watch::Sender<MiniGameView>,
}

impl MiniGameRunner {
    pub fn new(kind: MiniGameKind, timings: MiniGameTimings) -> Self {
        let game = MiniGame::new(kind);
        let (tx, _rx) = watch::channel(MiniGameView::from(&game));
        Self { game, timings, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<MiniGameView> {
        self.tx.subscribe()
    }

    pub fn game(&self) -> &MiniGame {
        &self.game
    }

    fn publish(&self) {
        self.tx.send_replace(MiniGameView::from(&self.game));
    }

    /// Count down the intro; KiDeNous then types its question out.
    /// Returns the phase waiting for player input.
    pub async fn run_intro(&mut self) -> Result<MiniPhase, MiniGameError> {
        while self.game.phase() == MiniPhase::Intro {
            tokio::time::sleep(self.timings.intro_tick).await;
            self.game.tick()?;
            self.publish();
        }

        if self.game.phase() == MiniPhase::Typing {
            loop {
                tokio::time::sleep(self.timings.type_char).await;
                if !self.game.type_char()? {
                    break;
                }
                self.publish();
            }
            tokio::time::sleep(self.timings.typing_hold).await;
            self.game.typing_done()?;
            self.publish();
        }

        tracing::debug!("{} intro done, now {:?}", self.game.kind(), self.game.phase());
        Ok(self.game.phase())
    }

    pub fn answer(&mut self, input: AnswerInput) -> Result<MiniPhase, MiniGameError> {
        let phase = self.game.submit_answer(input)?;
        self.publish();
        Ok(phase)
    }

    /// Confirm the vote, dwell on the reveal, then score the round
    pub async fn vote(&mut self, input: VoteInput) -> Result<RoundScores, MiniGameError> {
        self.game.submit_vote(input)?;
        self.publish();

        tokio::time::sleep(self.timings.reveal).await;
        let scores = self.game.reveal_elapsed(&mut rand::rng())?;
        self.publish();

        tracing::info!("{} round scored: {:?}", self.game.kind(), scores.slots);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    /// Paused timers may round up to the next millisecond per sleep
    fn assert_close(elapsed: Duration, expected: Duration) {
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(
            elapsed <= expected + Duration::from_millis(50),
            "{elapsed:?} too far past {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_intro_takes_five_seconds() {
        let mut runner = MiniGameRunner::new(MiniGameKind::KiKaDi, MiniGameTimings::default());
        let rx = runner.subscribe();
        let start = Instant::now();

        assert_eq!(runner.run_intro().await.unwrap(), MiniPhase::Answer);
        assert_close(start.elapsed(), Duration::from_secs(5));
        assert_eq!(rx.borrow().phase, MiniPhase::Answer);
        assert_eq!(rx.borrow().countdown, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kidenous_typing_timing() {
        let mut runner = MiniGameRunner::new(MiniGameKind::KiDeNous, MiniGameTimings::default());
        let start = Instant::now();

        assert_eq!(runner.run_intro().await.unwrap(), MiniPhase::Vote);

        let chars = MiniGameKind::KiDeNous.question().chars().count() as u32;
        // Intro, one interval per character plus the one that finds nothing left, then the hold
        let expected = Duration::from_secs(5)
            + Duration::from_millis(100) * (chars + 1)
            + Duration::from_secs(1);
        assert_close(start.elapsed(), expected);
        assert_eq!(runner.game().typed_text(), MiniGameKind::KiDeNous.question());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_reveals_for_three_seconds_then_scores() {
        let mut runner = MiniGameRunner::new(MiniGameKind::KiDiVrai, MiniGameTimings::default());
        runner.run_intro().await.unwrap();
        runner
            .answer(AnswerInput::Bluff {
                content: "I once met a famous singer".into(),
                is_bluff: true,
            })
            .unwrap();

        let rx = runner.subscribe();
        let start = Instant::now();
        let scores = runner.vote(VoteInput::Truth(false)).await.unwrap();

        assert_close(start.elapsed(), Duration::from_secs(3));
        assert_eq!(rx.borrow().phase, MiniPhase::Result);
        assert_eq!(rx.borrow().scores, Some(scores));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_before_answer_is_rejected() {
        let mut runner = MiniGameRunner::new(MiniGameKind::KiKaDi, MiniGameTimings::default());
        runner.run_intro().await.unwrap();

        let result = runner.vote(VoteInput::Player("Alex".into())).await;
        assert!(matches!(result, Err(MiniGameError::WrongPhase { .. })));
        assert_eq!(runner.game().phase(), MiniPhase::Answer);
    }
}
