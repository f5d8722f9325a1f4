use crate::content::{Diagnosis, ErrorReport, Grading, QuizItem};
use crate::tutor::state::{self, TransitionError, Trigger, TutorState};
use crate::types::{AbilityLevel, StudentId, Topic};

/// Ephemeral context for one student viewing one topic. Switching topic
/// means building a new session; nothing carries over.
#[derive(Debug, Clone)]
pub struct TutoringSession {
    pub student_id: StudentId,
    pub subject: String,
    pub topic: Topic,
    pub level: AbilityLevel,
    pub review_mode: bool,
    state: TutorState,
    pub(crate) lesson: Option<String>,
    pub(crate) quiz: Option<QuizItem>,
    pub(crate) last_failure: Option<ErrorReport>,
    pub(crate) diagnosis: Option<Diagnosis>,
    pub(crate) remediation: Option<String>,
    pub(crate) challenge: Option<String>,
    pub(crate) grading: Option<Grading>,
}

impl TutoringSession {
    pub(crate) fn new(
        student_id: StudentId,
        subject: &str,
        topic: Topic,
        level: AbilityLevel,
        review_mode: bool,
        state: TutorState,
    ) -> Self {
        Self {
            student_id,
            subject: subject.to_string(),
            topic,
            level,
            review_mode,
            state,
            lesson: None,
            quiz: None,
            last_failure: None,
            diagnosis: None,
            remediation: None,
            challenge: None,
            grading: None,
        }
    }

    pub fn state(&self) -> TutorState {
        self.state
    }

    pub fn lesson(&self) -> Option<&str> {
        self.lesson.as_deref()
    }

    pub fn quiz(&self) -> Option<&QuizItem> {
        self.quiz.as_ref()
    }

    pub fn last_failure(&self) -> Option<&ErrorReport> {
        self.last_failure.as_ref()
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        self.diagnosis.as_ref()
    }

    pub fn challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    pub fn grading(&self) -> Option<&Grading> {
        self.grading.as_ref()
    }

    pub fn challenge_solved(&self) -> bool {
        self.grading.as_ref().is_some_and(|g| g.is_correct)
    }

    pub(crate) fn fire(&mut self, trigger: Trigger) -> Result<TutorState, TransitionError> {
        let next = state::transition(self.state, trigger)?;
        tracing::debug!(
            student_id = self.student_id,
            topic_id = self.topic.id,
            from = self.state.as_str(),
            to = next.as_str(),
            ?trigger,
            "tutor transition"
        );
        self.state = next;
        Ok(next)
    }

    /// Drops the failed item and everything derived from it.
    pub(crate) fn clear_failure(&mut self) {
        self.quiz = None;
        self.last_failure = None;
        self.diagnosis = None;
        self.remediation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(state: TutorState) -> TutoringSession {
        let topic = Topic {
            id: 1,
            subject: "C".into(),
            name: "Variables".into(),
            knowledge_unit_code: "SDF".into(),
            order: 1,
        };
        TutoringSession::new(9, "C", topic, AbilityLevel::Beginner, false, state)
    }

    #[test]
    fn test_fire_moves_state_or_leaves_it() {
        let mut s = session(TutorState::InitialLesson);
        assert!(s.fire(Trigger::RetryQuiz).is_err());
        assert_eq!(s.state(), TutorState::InitialLesson);
        s.fire(Trigger::StartQuiz).unwrap();
        assert_eq!(s.state(), TutorState::UnderstandingQuiz);
    }

    #[test]
    fn test_clear_failure_keeps_lesson() {
        let mut s = session(TutorState::FailedQuiz);
        s.lesson = Some("lesson".into());
        s.remediation = Some("try again".into());
        s.clear_failure();
        assert_eq!(s.lesson(), Some("lesson"));
        assert!(s.remediation.is_none());
        assert!(!s.challenge_solved());
    }
}
