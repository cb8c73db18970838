//! Client-local mini-game rounds
//!
//! Each client runs its own machine; nothing here is synchronized through the
//! backend. The machine is pure: [`MiniGame`] takes inputs and timer events
//! and rejects anything that does not fit the current phase. [`runner`] drives
//! the timers on tokio.

mod runner;
mod score;

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

pub use runner::{MiniGameRunner, MiniGameTimings, MiniGameView};
pub use score::{RoundScores, PLAYER_SLOTS};

/// Intro countdown length in ticks
pub const INTRO_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MiniGameKind {
    /// Guess who wrote each answer
    KiKaDi,
    /// Tell a story, others judge truth or bluff
    KiDiVrai,
    /// Who has already done it
    KiDeja,
    /// Vote for the player who best fits the prompt
    KiDeNous,
}

impl MiniGameKind {
    /// Round-robin order of a party
    pub const ROTATION: [MiniGameKind; 4] = [
        MiniGameKind::KiKaDi,
        MiniGameKind::KiDiVrai,
        MiniGameKind::KiDeja,
        MiniGameKind::KiDeNous,
    ];

    /// Mini-game played in 1-based round `round`
    pub fn for_round(round: u32) -> Self {
        let index = round.saturating_sub(1) as usize % Self::ROTATION.len();
        Self::ROTATION[index]
    }

    pub fn id(&self) -> &'static str {
        match self {
            MiniGameKind::KiKaDi => "kikadi",
            MiniGameKind::KiDiVrai => "kidivrai",
            MiniGameKind::KiDeja => "kideja",
            MiniGameKind::KiDeNous => "kidenous",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ROTATION.into_iter().find(|kind| kind.id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MiniGameKind::KiKaDi => "KiKaDi",
            MiniGameKind::KiDiVrai => "KiDiVrai",
            MiniGameKind::KiDeja => "KiDeja",
            MiniGameKind::KiDeNous => "KiDeNous",
        }
    }

    pub fn question(&self) -> &'static str {
        match self {
            MiniGameKind::KiKaDi => "Quelle est votre citation inspirante préférée ?",
            MiniGameKind::KiDiVrai => "Raconte-nous ton plus gros mensonge d'enfance",
            MiniGameKind::KiDeja => {
                "Qui a déjà mangé quelque chose qui était tombé par terre ?"
            }
            MiniGameKind::KiDeNous => "Qui de vous est le plus peureux ?",
        }
    }

    /// KiDeNous types its question out instead of collecting answers
    pub fn has_answer_phase(&self) -> bool {
        !matches!(self, MiniGameKind::KiDeNous)
    }
}

impl std::fmt::Display for MiniGameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MiniPhase {
    Intro,
    /// Question being typed out (KiDeNous)
    Typing,
    Answer,
    Vote,
    Reveal,
    Result,
}

/// What a player submits in the answer phase
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerInput {
    /// KiKaDi free text
    Text(String),
    /// KiDiVrai story, flagged when made up
    Bluff { content: String, is_bluff: bool },
    /// KiDeja "I have done it"
    Experienced(bool),
}

/// What a player submits in the vote phase
#[derive(Debug, Clone, PartialEq)]
pub enum VoteInput {
    /// KiKaDi and KiDeNous target; empty means nothing selected
    Player(String),
    /// KiDiVrai verdict
    Truth(bool),
    /// KiDeja verdict per player slot
    Experiences(BTreeMap<String, bool>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MiniGameError {
    #[error("{kind} cannot do that in phase {phase:?}")]
    WrongPhase { kind: MiniGameKind, phase: MiniPhase },

    #[error("Answer cannot be empty")]
    EmptyAnswer,

    #[error("Select a player first")]
    NothingSelected,

    #[error("Every player needs a verdict before confirming")]
    IncompleteVotes,

    #[error("{kind} does not take this kind of input")]
    InputMismatch { kind: MiniGameKind },
}

impl From<MiniGameError> for crate::error::KiadisaError {
    fn from(e: MiniGameError) -> Self {
        crate::error::KiadisaError::Validation(e.to_string())
    }
}

/// One mini-game round on this client
#[derive(Debug, Clone)]
pub struct MiniGame {
    kind: MiniGameKind,
    phase: MiniPhase,
    countdown: u32,
    typed: usize,
    answer: Option<AnswerInput>,
    vote: Option<VoteInput>,
    scores: Option<RoundScores>,
}

impl MiniGame {
    pub fn new(kind: MiniGameKind) -> Self {
        Self {
            kind,
            phase: MiniPhase::Intro,
            countdown: INTRO_TICKS,
            typed: 0,
            answer: None,
            vote: None,
            scores: None,
        }
    }

    pub fn kind(&self) -> MiniGameKind {
        self.kind
    }

    pub fn phase(&self) -> MiniPhase {
        self.phase
    }

    /// Intro seconds left
    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    /// The part of the question typed out so far
    pub fn typed_text(&self) -> String {
        self.kind.question().chars().take(self.typed).collect()
    }

    pub fn answer(&self) -> Option<&AnswerInput> {
        self.answer.as_ref()
    }

    pub fn vote(&self) -> Option<&VoteInput> {
        self.vote.as_ref()
    }

    /// Set once the round reached `Result`
    pub fn scores(&self) -> Option<RoundScores> {
        self.scores
    }

    fn expect_phase(&self, phase: MiniPhase) -> Result<(), MiniGameError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(MiniGameError::WrongPhase {
                kind: self.kind,
                phase: self.phase,
            })
        }
    }

    /// One second of intro countdown
    pub fn tick(&mut self) -> Result<MiniPhase, MiniGameError> {
        self.expect_phase(MiniPhase::Intro)?;
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.phase = if self.kind.has_answer_phase() {
                MiniPhase::Answer
            } else {
                MiniPhase::Typing
            };
        }
        Ok(self.phase)
    }

    /// Type one more question character; returns false once all are shown
    pub fn type_char(&mut self) -> Result<bool, MiniGameError> {
        self.expect_phase(MiniPhase::Typing)?;
        if self.typing_complete() {
            return Ok(false);
        }
        self.typed += 1;
        Ok(true)
    }

    pub fn typing_complete(&self) -> bool {
        self.typed >= self.kind.question().chars().count()
    }

    /// End of the pause after the question is fully typed
    pub fn typing_done(&mut self) -> Result<MiniPhase, MiniGameError> {
        self.expect_phase(MiniPhase::Typing)?;
        self.typed = self.kind.question().chars().count();
        self.phase = MiniPhase::Vote;
        Ok(self.phase)
    }

    pub fn submit_answer(&mut self, input: AnswerInput) -> Result<MiniPhase, MiniGameError> {
        self.expect_phase(MiniPhase::Answer)?;
        match (self.kind, &input) {
            (MiniGameKind::KiKaDi, AnswerInput::Text(content))
            | (MiniGameKind::KiDiVrai, AnswerInput::Bluff { content, .. }) => {
                if content.trim().is_empty() {
                    return Err(MiniGameError::EmptyAnswer);
                }
            }
            (MiniGameKind::KiDeja, AnswerInput::Experienced(_)) => {}
            _ => return Err(MiniGameError::InputMismatch { kind: self.kind }),
        }
        self.answer = Some(input);
        self.phase = MiniPhase::Vote;
        Ok(self.phase)
    }

    /// Confirm the vote; the round moves to `Reveal`
    pub fn submit_vote(&mut self, input: VoteInput) -> Result<MiniPhase, MiniGameError> {
        self.expect_phase(MiniPhase::Vote)?;
        match (self.kind, &input) {
            (MiniGameKind::KiKaDi | MiniGameKind::KiDeNous, VoteInput::Player(target)) => {
                if target.trim().is_empty() {
                    return Err(MiniGameError::NothingSelected);
                }
            }
            (MiniGameKind::KiDiVrai, VoteInput::Truth(_)) => {}
            (MiniGameKind::KiDeja, VoteInput::Experiences(verdicts)) => {
                if !PLAYER_SLOTS.iter().all(|p| verdicts.contains_key(*p)) {
                    return Err(MiniGameError::IncompleteVotes);
                }
            }
            _ => return Err(MiniGameError::InputMismatch { kind: self.kind }),
        }
        self.vote = Some(input);
        self.phase = MiniPhase::Reveal;
        Ok(self.phase)
    }

    /// End of the reveal dwell: score the round
    pub fn reveal_elapsed(&mut self, rng: &mut impl Rng) -> Result<RoundScores, MiniGameError> {
        self.expect_phase(MiniPhase::Reveal)?;
        let scores = RoundScores::random(rng);
        self.scores = Some(scores);
        self.phase = MiniPhase::Result;
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn past_intro(kind: MiniGameKind) -> MiniGame {
        let mut game = MiniGame::new(kind);
        for _ in 0..INTRO_TICKS {
            game.tick().unwrap();
        }
        game
    }

    #[test]
    fn test_rotation_by_round() {
        assert_eq!(MiniGameKind::for_round(1), MiniGameKind::KiKaDi);
        assert_eq!(MiniGameKind::for_round(2), MiniGameKind::KiDiVrai);
        assert_eq!(MiniGameKind::for_round(4), MiniGameKind::KiDeNous);
        assert_eq!(MiniGameKind::for_round(5), MiniGameKind::KiKaDi);
        assert_eq!(MiniGameKind::from_id("kideja"), Some(MiniGameKind::KiDeja));
        assert_eq!(MiniGameKind::from_id("quiz"), None);
    }

    #[test]
    fn test_intro_counts_down_to_answer() {
        let mut game = MiniGame::new(MiniGameKind::KiKaDi);
        for remaining in (1..INTRO_TICKS).rev() {
            assert_eq!(game.tick().unwrap(), MiniPhase::Intro);
            assert_eq!(game.countdown(), remaining);
        }
        assert_eq!(game.tick().unwrap(), MiniPhase::Answer);
        assert!(game.tick().is_err());
    }

    #[test]
    fn test_kidenous_types_question_then_votes() {
        let mut game = past_intro(MiniGameKind::KiDeNous);
        assert_eq!(game.phase(), MiniPhase::Typing);
        assert!(game.submit_answer(AnswerInput::Text("x".into())).is_err());

        while game.type_char().unwrap() {}
        assert_eq!(game.typed_text(), MiniGameKind::KiDeNous.question());
        assert_eq!(game.typing_done().unwrap(), MiniPhase::Vote);
    }

    #[test]
    fn test_blank_answer_keeps_answer_phase() {
        let mut game = past_intro(MiniGameKind::KiDiVrai);
        let result = game.submit_answer(AnswerInput::Bluff {
            content: "  ".into(),
            is_bluff: true,
        });
        assert_eq!(result, Err(MiniGameError::EmptyAnswer));
        assert_eq!(game.phase(), MiniPhase::Answer);

        let result = game.submit_answer(AnswerInput::Text("story".into()));
        assert_eq!(
            result,
            Err(MiniGameError::InputMismatch {
                kind: MiniGameKind::KiDiVrai
            })
        );
    }

    #[test]
    fn test_kideja_answer_always_proceeds() {
        let mut game = past_intro(MiniGameKind::KiDeja);
        assert_eq!(
            game.submit_answer(AnswerInput::Experienced(false)).unwrap(),
            MiniPhase::Vote
        );
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let mut game = past_intro(MiniGameKind::KiKaDi);
        game.submit_answer(AnswerInput::Text("Carpe diem".into()))
            .unwrap();

        assert_eq!(
            game.submit_vote(VoteInput::Player(String::new())),
            Err(MiniGameError::NothingSelected)
        );
        assert_eq!(game.phase(), MiniPhase::Vote);
        assert_eq!(
            game.submit_vote(VoteInput::Player("Marie".into())).unwrap(),
            MiniPhase::Reveal
        );
    }

    #[test]
    fn test_kideja_needs_every_verdict() {
        let mut game = past_intro(MiniGameKind::KiDeja);
        game.submit_answer(AnswerInput::Experienced(true)).unwrap();

        let mut verdicts = BTreeMap::new();
        verdicts.insert("Alex".to_string(), true);
        assert_eq!(
            game.submit_vote(VoteInput::Experiences(verdicts.clone())),
            Err(MiniGameError::IncompleteVotes)
        );

        verdicts.insert("Marie".to_string(), false);
        verdicts.insert("Julien".to_string(), true);
        assert_eq!(
            game.submit_vote(VoteInput::Experiences(verdicts)).unwrap(),
            MiniPhase::Reveal
        );
    }

    #[test]
    fn test_reveal_produces_scores() {
        let mut game = past_intro(MiniGameKind::KiDiVrai);
        game.submit_answer(AnswerInput::Bluff {
            content: "I told my teacher my dog ate my homework".into(),
            is_bluff: false,
        })
        .unwrap();
        game.submit_vote(VoteInput::Truth(true)).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let scores = game.reveal_elapsed(&mut rng).unwrap();
        assert_eq!(game.phase(), MiniPhase::Result);
        assert_eq!(game.scores(), Some(scores));
        assert!(scores.slots.iter().all(|s| (1..=3).contains(s)));
        assert!(game.reveal_elapsed(&mut rng).is_err());
    }
}
