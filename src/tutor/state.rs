use serde::Serialize;
use thiserror::Error;

use crate::bkt;

const SKIP_OFFER_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorState {
    SkipPrompt,
    InitialLesson,
    UnderstandingQuiz,
    FailedQuiz,
    CodingChallenge,
}

impl TutorState {
    pub const fn as_str(self) -> &'static str {
        match self {
            TutorState::SkipPrompt => "skip_prompt",
            TutorState::InitialLesson => "initial_lesson",
            TutorState::UnderstandingQuiz => "understanding_quiz",
            TutorState::FailedQuiz => "failed_quiz",
            TutorState::CodingChallenge => "coding_challenge",
        }
    }

    /// First state on opening a topic. Mastered topics get the lesson as a
    /// review; likely-known topics are offered a skip.
    pub fn entry(prob_knows: f64) -> Self {
        if bkt::is_mastered(prob_knows) {
            TutorState::InitialLesson
        } else if prob_knows > SKIP_OFFER_THRESHOLD {
            TutorState::SkipPrompt
        } else {
            TutorState::InitialLesson
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ReviewAnyway,
    Skip,
    StartQuiz,
    AnswerCorrect,
    AnswerIncorrect,
    RetryQuiz,
    ChallengeFailed,
    ChallengePassed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition: {trigger:?} in state {from:?}")]
pub struct TransitionError {
    pub from: TutorState,
    pub trigger: Trigger,
}

/// The per-topic transition table.
pub fn transition(from: TutorState, trigger: Trigger) -> Result<TutorState, TransitionError> {
    use TutorState::*;

    let to = match trigger {
        Trigger::ReviewAnyway => match from {
            SkipPrompt => Some(InitialLesson),
            InitialLesson | UnderstandingQuiz | FailedQuiz | CodingChallenge => None,
        },
        Trigger::Skip => match from {
            SkipPrompt => Some(UnderstandingQuiz),
            InitialLesson | UnderstandingQuiz | FailedQuiz | CodingChallenge => None,
        },
        Trigger::StartQuiz => match from {
            InitialLesson => Some(UnderstandingQuiz),
            SkipPrompt | UnderstandingQuiz | FailedQuiz | CodingChallenge => None,
        },
        Trigger::AnswerCorrect => match from {
            UnderstandingQuiz => Some(CodingChallenge),
            SkipPrompt | InitialLesson | FailedQuiz | CodingChallenge => None,
        },
        Trigger::AnswerIncorrect => match from {
            UnderstandingQuiz => Some(FailedQuiz),
            SkipPrompt | InitialLesson | FailedQuiz | CodingChallenge => None,
        },
        Trigger::RetryQuiz => match from {
            FailedQuiz => Some(UnderstandingQuiz),
            SkipPrompt | InitialLesson | UnderstandingQuiz | CodingChallenge => None,
        },
        Trigger::ChallengeFailed | Trigger::ChallengePassed => match from {
            CodingChallenge => Some(CodingChallenge),
            SkipPrompt | InitialLesson | UnderstandingQuiz | FailedQuiz => None,
        },
    };

    to.ok_or(TransitionError { from, trigger })
}
