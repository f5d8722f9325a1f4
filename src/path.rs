//! Topic sequencing and lock/unlock status derived from the mastery vector.

use serde::Serialize;

use crate::bkt;
use crate::db::{Store, StoreError};
use crate::types::{
    AbilityLevel, MasteryEntry, ProgressRecord, ProgressStatus, StudentId, Topic, TopicId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Mastered,
    Unlocked,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineEntry {
    pub topic: Topic,
    pub prob_knows: f64,
    pub status: TopicStatus,
    /// Whether the topic may be opened. Mastered topics past the frontier stay closed.
    pub unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathOutline {
    pub entries: Vec<OutlineEntry>,
    pub frontier_index: usize,
    pub review_mode: bool,
}

/// One subject the student has placed into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseSummary {
    pub subject: String,
    pub status: ProgressStatus,
    pub topics_mastered: usize,
    pub total_topics: usize,
    /// `topics_mastered / total_topics`, zero for an empty path.
    pub completion: f64,
    pub starting_level: AbilityLevel,
    /// `None` until a final assessment has been taken.
    pub current_level: Option<AbilityLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseOverview {
    pub active: Vec<CourseSummary>,
    pub not_started: Vec<String>,
}

/// Index of the first topic below the mastery threshold, or the last topic
/// when every topic meets it. `None` for an empty path.
pub fn frontier_index(probabilities: &[f64]) -> Option<usize> {
    if probabilities.is_empty() {
        return None;
    }
    Some(
        probabilities
            .iter()
            .position(|&p| !bkt::meets_mastery(p))
            .unwrap_or(probabilities.len() - 1),
    )
}

pub fn is_unlocked(order_index: usize, frontier_index: usize, review_mode: bool) -> bool {
    review_mode || order_index <= frontier_index
}

/// Review mode follows a failed final assessment or an explicit revise request.
pub fn review_mode(progress: &ProgressRecord, revise_flag: bool) -> bool {
    revise_flag || progress.failed_final_assessment()
}

pub fn topic_status(prob_knows: f64, unlocked: bool) -> TopicStatus {
    if bkt::is_mastered(prob_knows) {
        TopicStatus::Mastered
    } else if unlocked {
        TopicStatus::Unlocked
    } else {
        TopicStatus::Locked
    }
}

pub async fn full_path(store: &dyn Store, subject: &str) -> Result<Vec<Topic>, StoreError> {
    store.get_topics(subject).await
}

pub async fn first_unmastered(
    store: &dyn Store,
    student_id: StudentId,
    subject: &str,
) -> Result<Option<Topic>, StoreError> {
    let topics = store.get_topics(subject).await?;
    let mastery = store.list_mastery(student_id, subject).await?;
    let probabilities = aligned_probabilities(&topics, &mastery);
    Ok(frontier_index(&probabilities).and_then(|i| topics.get(i).cloned()))
}

pub async fn next_topic(
    store: &dyn Store,
    subject: &str,
    current_topic_id: TopicId,
) -> Result<Option<Topic>, StoreError> {
    let topics = store.get_topics(subject).await?;
    Ok(topics
        .iter()
        .position(|t| t.id == current_topic_id)
        .and_then(|i| topics.get(i + 1).cloned()))
}

pub async fn outline(
    store: &dyn Store,
    student_id: StudentId,
    subject: &str,
    progress: &ProgressRecord,
    revise_flag: bool,
) -> Result<PathOutline, StoreError> {
    let topics = store.get_topics(subject).await?;
    let mastery = store.list_mastery(student_id, subject).await?;
    let probabilities = aligned_probabilities(&topics, &mastery);
    let frontier = frontier_index(&probabilities).unwrap_or(0);
    let review = review_mode(progress, revise_flag);

    let entries = topics
        .into_iter()
        .zip(probabilities)
        .enumerate()
        .map(|(index, (topic, prob_knows))| {
            let unlocked = is_unlocked(index, frontier, review);
            OutlineEntry {
                topic,
                prob_knows,
                status: topic_status(prob_knows, unlocked),
                unlocked,
            }
        })
        .collect();

    Ok(PathOutline {
        entries,
        frontier_index: frontier,
        review_mode: review,
    })
}

/// Splits every known subject into courses with a completed placement and
/// subjects the student has not started.
pub async fn course_overview(
    store: &dyn Store,
    student_id: StudentId,
) -> Result<CourseOverview, StoreError> {
    let subjects = store.list_subjects().await?;
    let records = store.list_progress(student_id).await?;
    let mut overview = CourseOverview::default();

    for subject in subjects {
        let placed = records
            .iter()
            .find(|r| r.subject == subject)
            .filter(|r| r.theta_initial.is_some());
        match placed {
            Some(record) => overview.active.push(course_summary(store, record).await?),
            None => overview.not_started.push(subject),
        }
    }
    Ok(overview)
}

pub async fn course_summary(
    store: &dyn Store,
    progress: &ProgressRecord,
) -> Result<CourseSummary, StoreError> {
    let topics = store.get_topics(&progress.subject).await?;
    let mastery = store
        .list_mastery(progress.student_id, &progress.subject)
        .await?;
    let probabilities = aligned_probabilities(&topics, &mastery);
    let topics_mastered = probabilities.iter().filter(|&&p| bkt::is_mastered(p)).count();
    let total_topics = topics.len();
    let completion = if total_topics == 0 {
        0.0
    } else {
        topics_mastered as f64 / total_topics as f64
    };

    Ok(CourseSummary {
        subject: progress.subject.clone(),
        status: progress.status,
        topics_mastered,
        total_topics,
        completion,
        starting_level: AbilityLevel::from_theta(progress.theta_initial),
        current_level: progress.theta_final.map(|t| AbilityLevel::from_theta(Some(t))),
    })
}

/// Mastery per topic in path order; topics without an entry count as zero.
pub fn aligned_probabilities(topics: &[Topic], mastery: &[MasteryEntry]) -> Vec<f64> {
    topics
        .iter()
        .map(|topic| {
            mastery
                .iter()
                .find(|m| m.topic_id == topic.id)
                .map_or(0.0, |m| m.prob_knows)
        })
        .collect()
}
