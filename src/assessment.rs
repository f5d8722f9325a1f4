//! Placement and final assessments: CAT runs wired to the store.
//!
//! Placement seeds every topic's mastery from the ability estimate. The final
//! assessment also feeds each answer into the BKT entry of the item's topic,
//! and a failed attempt reopens the path in review mode.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::bkt::{self, BktParams};
use crate::cat::{CatError, CatSession, CatState, INITIAL_THETA};
use crate::config::AssessmentConfig;
use crate::db::{Store, StoreError};
use crate::path;
use crate::types::{
    AbilityLevel, Item, ItemId, ProgressRecord, ProgressStatus, ProgressUpdate, ResponseEvent, StudentId,
    TestType, Topic,
};

/// Topics below this probability are reported back after a failed final.
pub const WEAK_TOPIC_THRESHOLD: f64 = 0.70;

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cat(#[from] CatError),
    #[error("placement already completed")]
    AlreadyPlaced,
    #[error("final assessment needs status assessing, found {0:?}")]
    NotAssessing(ProgressStatus),
    #[error("subject already completed")]
    AlreadyCompleted,
    #[error("no failed final assessment to retry")]
    NoFailedAttempt,
    #[error("every topic must be mastered before retrying")]
    MasteryRequired,
    #[error("option {index} out of range ({available} options)")]
    InvalidOption { index: usize, available: usize },
    #[error("{0} test is not finished")]
    NotComplete(TestType),
    #[error("expected a {expected} run, got {actual}")]
    WrongTestType { expected: TestType, actual: TestType },
}

/// One in-flight adaptive test for a student.
#[derive(Debug, Clone)]
pub struct AssessmentRun {
    pub student_id: StudentId,
    pub subject: String,
    pub test_type: TestType,
    session: CatSession,
    correct: usize,
}

impl AssessmentRun {
    pub fn theta(&self) -> f64 {
        self.session.theta()
    }

    pub fn question_number(&self) -> usize {
        self.session.question_number()
    }

    pub fn test_length(&self) -> usize {
        self.session.test_length()
    }

    pub fn correct_count(&self) -> usize {
        self.correct
    }

    pub fn is_complete(&self) -> bool {
        self.session.state() == CatState::Complete
    }

    /// The item to present; stays the same until it is answered.
    pub fn current_item(&mut self) -> Result<&Item, AssessmentError> {
        let index = self.session.next_item()?;
        Ok(self.session.item(index).ok_or(CatError::UnknownItem(index))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub item_id: ItemId,
    pub is_correct: bool,
    pub theta: f64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementResult {
    pub theta: f64,
    pub level: AbilityLevel,
    pub seeded_prior: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeakTopic {
    pub topic: Topic,
    pub prob_knows: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResult {
    pub theta: f64,
    pub level: AbilityLevel,
    pub passed: bool,
    pub score_percent: i32,
    pub attempt: i32,
    pub learning_gain: Option<f64>,
    /// Empty on a pass; weakest first otherwise.
    pub weak_topics: Vec<WeakTopic>,
}

pub struct Assessment {
    store: Arc<dyn Store>,
    config: AssessmentConfig,
    bkt: BktParams,
}

impl Assessment {
    pub fn new(store: Arc<dyn Store>, config: AssessmentConfig, bkt: BktParams) -> Self {
        Self { store, config, bkt }
    }

    pub async fn start_placement(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<AssessmentRun, AssessmentError> {
        let progress = self.store.get_progress(student_id, subject).await?;
        if progress.theta_initial.is_some() {
            return Err(AssessmentError::AlreadyPlaced);
        }
        let items = self.store.get_items(subject, TestType::Placement).await?;
        let session = CatSession::initialize(items, self.config.placement_length)?;
        Ok(new_run(student_id, subject, TestType::Placement, session))
    }

    pub async fn start_final(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<AssessmentRun, AssessmentError> {
        let progress = self.store.get_progress(student_id, subject).await?;
        if progress.status != ProgressStatus::Assessing {
            return Err(AssessmentError::NotAssessing(progress.status));
        }
        let items = self.store.get_items(subject, TestType::Final).await?;
        let session = CatSession::initialize(items, self.config.final_length)?
            .with_initial_theta(progress.theta_initial.unwrap_or(INITIAL_THETA));
        Ok(new_run(student_id, subject, TestType::Final, session))
    }

    /// Grades the current item, re-estimates ability and logs the response.
    /// An out-of-range option is rejected without consuming the item.
    pub async fn answer(
        &self,
        run: &mut AssessmentRun,
        option_index: usize,
    ) -> Result<AnswerOutcome, AssessmentError> {
        let item = run.current_item()?.clone();
        if option_index >= item.options.len() {
            return Err(AssessmentError::InvalidOption {
                index: option_index,
                available: item.options.len(),
            });
        }

        let is_correct = item.is_correct(option_index);
        let theta = run.session.answer_pending(is_correct)?;
        if is_correct {
            run.correct += 1;
        }

        self.store
            .append_response_log(&ResponseEvent {
                student_id: run.student_id,
                item_id: item.id,
                test_type: run.test_type,
                chosen_option_index: option_index,
                is_correct,
                theta_after: theta,
                timestamp: Utc::now(),
            })
            .await?;

        if run.test_type == TestType::Final {
            bkt::record_evidence(
                self.store.as_ref(),
                &self.bkt,
                run.student_id,
                &run.subject,
                item.topic_id,
                is_correct,
                None,
            )
            .await?;
        }

        Ok(AnswerOutcome {
            item_id: item.id,
            is_correct,
            theta,
            complete: run.is_complete(),
        })
    }

    pub async fn finish_placement(&self, run: &AssessmentRun) -> Result<PlacementResult, AssessmentError> {
        let theta = finished_theta(run, TestType::Placement)?;
        let progress = self.store.get_progress(run.student_id, &run.subject).await?;
        if progress.theta_initial.is_some() {
            return Err(AssessmentError::AlreadyPlaced);
        }
        let seeded_prior = bkt::seed_subject(self.store.as_ref(), run.student_id, &run.subject, theta).await?;
        self.store
            .save_progress(
                run.student_id,
                &run.subject,
                &ProgressUpdate {
                    theta_initial: Some(theta),
                    status: Some(ProgressStatus::Learning),
                    ..Default::default()
                },
            )
            .await?;

        let level = AbilityLevel::from_theta(Some(theta));
        info!(student_id = run.student_id, subject = %run.subject, theta, %level, seeded_prior, "placement complete");
        Ok(PlacementResult {
            theta,
            level,
            seeded_prior,
        })
    }

    pub async fn finish_final(&self, run: &AssessmentRun) -> Result<FinalResult, AssessmentError> {
        let theta = finished_theta(run, TestType::Final)?;
        let progress = self.store.get_progress(run.student_id, &run.subject).await?;
        if progress.status != ProgressStatus::Assessing {
            return Err(AssessmentError::NotAssessing(progress.status));
        }

        let passed = theta >= self.config.final_passing_theta;
        let attempt = progress.final_attempt_count + 1;
        let score_percent = score_percent(run.correct, run.test_length());
        let status = if passed {
            ProgressStatus::Completed
        } else {
            ProgressStatus::Learning
        };

        self.store
            .save_progress(
                run.student_id,
                &run.subject,
                &ProgressUpdate {
                    theta_final: Some(Some(theta)),
                    status: Some(status),
                    assignment_score: Some(score_percent),
                    final_attempt_count: Some(attempt),
                    ..Default::default()
                },
            )
            .await?;

        let weak_topics = if passed {
            Vec::new()
        } else {
            self.weak_topics(run.student_id, &run.subject).await?
        };

        info!(
            student_id = run.student_id,
            subject = %run.subject,
            theta,
            passed,
            attempt,
            score_percent,
            "final assessment complete"
        );

        Ok(FinalResult {
            theta,
            level: AbilityLevel::from_theta(Some(theta)),
            passed,
            score_percent,
            attempt,
            learning_gain: progress.theta_initial.map(|initial| theta - initial),
            weak_topics,
        })
    }

    /// Reopens a failed final assessment once every topic is mastered again.
    pub async fn request_final_retry(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<ProgressRecord, AssessmentError> {
        let progress = self.store.get_progress(student_id, subject).await?;
        if progress.status == ProgressStatus::Completed {
            return Err(AssessmentError::AlreadyCompleted);
        }
        if !progress.failed_final_assessment() {
            return Err(AssessmentError::NoFailedAttempt);
        }
        if !bkt::all_topics_mastered(self.store.as_ref(), student_id, subject).await? {
            return Err(AssessmentError::MasteryRequired);
        }
        let record = self
            .store
            .save_progress(
                student_id,
                subject,
                &ProgressUpdate {
                    theta_final: Some(None),
                    status: Some(ProgressStatus::Assessing),
                    ..Default::default()
                },
            )
            .await?;
        Ok(record)
    }

    async fn weak_topics(&self, student_id: StudentId, subject: &str) -> Result<Vec<WeakTopic>, StoreError> {
        let topics = self.store.get_topics(subject).await?;
        let mastery = self.store.list_mastery(student_id, subject).await?;
        let probabilities = path::aligned_probabilities(&topics, &mastery);

        let mut weak: Vec<WeakTopic> = topics
            .into_iter()
            .zip(probabilities)
            .filter(|(_, p)| *p < WEAK_TOPIC_THRESHOLD)
            .map(|(topic, prob_knows)| WeakTopic { topic, prob_knows })
            .collect();
        weak.sort_by(|a, b| a.prob_knows.total_cmp(&b.prob_knows));
        Ok(weak)
    }
}

fn new_run(student_id: StudentId, subject: &str, test_type: TestType, session: CatSession) -> AssessmentRun {
    AssessmentRun {
        student_id,
        subject: subject.to_string(),
        test_type,
        session,
        correct: 0,
    }
}

fn finished_theta(run: &AssessmentRun, expected: TestType) -> Result<f64, AssessmentError> {
    if run.test_type != expected {
        return Err(AssessmentError::WrongTestType {
            expected,
            actual: run.test_type,
        });
    }
    run.session
        .final_theta()
        .ok_or(AssessmentError::NotComplete(expected))
}

fn score_percent(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_percent() {
        assert_eq!(score_percent(0, 20), 0);
        assert_eq!(score_percent(13, 20), 65);
        assert_eq!(score_percent(2, 3), 67);
        assert_eq!(score_percent(1, 0), 0);
    }
}
