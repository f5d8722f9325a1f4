pub mod cached;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    ContentKind, Item, MasteryEntry, ProgressRecord, ProgressUpdate, ResponseEvent, StudentId,
    TestType, Topic, TopicId,
};

pub use cached::CachedStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("failed to decode stored value: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningEvent {
    LessonView,
    QuizPass,
    QuizFail,
    Remediation,
    ChallengePass,
    ChallengeFail,
    TopicAdvance,
    PathComplete,
}

impl LearningEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            LearningEvent::LessonView => "lesson_view",
            LearningEvent::QuizPass => "quiz_pass",
            LearningEvent::QuizFail => "quiz_fail",
            LearningEvent::Remediation => "remediation",
            LearningEvent::ChallengePass => "challenge_pass",
            LearningEvent::ChallengeFail => "challenge_fail",
            LearningEvent::TopicAdvance => "topic_advance",
            LearningEvent::PathComplete => "path_complete",
        }
    }
}

/// Persistence collaborator. Each call is one read-modify-write against a
/// single (student, subject[, topic]) key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the entry, creating it with `prob_knows = 0` when absent.
    async fn get_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: TopicId,
    ) -> Result<MasteryEntry, StoreError>;

    async fn save_mastery(&self, entry: &MasteryEntry) -> Result<(), StoreError>;

    /// One entry per topic in path order. Topics never touched report zero
    /// without a row being created.
    async fn list_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<Vec<MasteryEntry>, StoreError>;

    /// Sets every topic of the subject to `prob_knows`; returns how many were written.
    async fn seed_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        prob_knows: f64,
    ) -> Result<usize, StoreError>;

    /// Returns the record, creating a default one when absent.
    async fn get_progress(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<ProgressRecord, StoreError>;

    /// Every progress record of the student, ordered by subject.
    async fn list_progress(&self, student_id: StudentId) -> Result<Vec<ProgressRecord>, StoreError>;

    async fn save_progress(
        &self,
        student_id: StudentId,
        subject: &str,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StoreError>;

    async fn append_response_log(&self, event: &ResponseEvent) -> Result<(), StoreError>;

    async fn get_items(&self, subject: &str, test_type: TestType) -> Result<Vec<Item>, StoreError>;

    /// Distinct subjects that have at least one topic, sorted.
    async fn list_subjects(&self) -> Result<Vec<String>, StoreError>;

    /// Topics ordered by `order` ascending.
    async fn get_topics(&self, subject: &str) -> Result<Vec<Topic>, StoreError>;

    async fn get_canonical_content(
        &self,
        topic_id: TopicId,
        kind: ContentKind,
    ) -> Result<Option<String>, StoreError>;

    async fn log_event(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: Option<TopicId>,
        event: LearningEvent,
        details: &str,
    ) -> Result<(), StoreError>;
}
