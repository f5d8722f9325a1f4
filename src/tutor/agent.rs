//! Per-topic tutoring flow: lesson, understanding quiz, remediation and a
//! coding challenge, with BKT updates at each graded step.
//!
//! Content-service failures never surface from here; each call site falls
//! back to stored canonical material or a conservative default.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::bkt::{self, MasteryUpdate};
use crate::config::TutorConfig;
use crate::content::validate::{self, Validated};
use crate::content::{prompts, ContentError, ContentService, Diagnosis, ErrorReport, Grading, QuizItem};
use crate::db::{LearningEvent, Store, StoreError};
use crate::path;
use crate::tutor::session::TutoringSession;
use crate::tutor::state::{Trigger, TutorState};
use crate::tutor::{coding_template, TutorError};
use crate::types::{
    AbilityLevel, ContentKind, ProgressRecord, ProgressStatus, ProgressUpdate, StudentId, Topic, TopicId,
};

const LESSON_UNAVAILABLE: &str = "Content unavailable. Please try refreshing.";
const CHAT_UNAVAILABLE: &str = "The tutor is unavailable right now. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizOutcome {
    pub is_correct: bool,
    pub chosen_answer: String,
    pub correct_answer: String,
    pub explanation: String,
    pub mastery: MasteryUpdate,
    pub state: TutorState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Remediation {
    pub diagnosis: Diagnosis,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionIssue {
    Placeholder,
    TooShort { min_length: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CodeOutcome {
    /// Not sent for grading; the student should edit and resubmit.
    Rejected(SubmissionIssue),
    Graded {
        grading: Grading,
        mastery: Option<MasteryUpdate>,
    },
}

#[derive(Debug, Clone)]
pub enum Advance {
    NextTopic(TutoringSession),
    /// End of path with unmastered topics left; resumes at the first of them.
    Redirect(TutoringSession),
    /// Every topic mastered; the subject is now open for final assessment.
    PathComplete,
}

pub struct TutorAgent {
    store: Arc<dyn Store>,
    content: Arc<dyn ContentService>,
    config: TutorConfig,
}

impl TutorAgent {
    pub fn new(store: Arc<dyn Store>, content: Arc<dyn ContentService>, config: TutorConfig) -> Self {
        Self {
            store,
            content,
            config,
        }
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    /// Opens the student's current topic: the first one not yet mastered.
    pub async fn start(
        &self,
        student_id: StudentId,
        subject: &str,
        revise_flag: bool,
    ) -> Result<TutoringSession, TutorError> {
        let topic = path::first_unmastered(self.store.as_ref(), student_id, subject)
            .await?
            .ok_or_else(|| TutorError::EmptyPath(subject.to_string()))?;
        let progress = self.store.get_progress(student_id, subject).await?;
        let review_mode = path::review_mode(&progress, revise_flag);
        self.enter_topic(student_id, subject, topic, &progress, review_mode)
            .await
    }

    /// Opens a specific topic if the path lets the student reach it.
    pub async fn open_topic(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: TopicId,
        revise_flag: bool,
    ) -> Result<TutoringSession, TutorError> {
        let progress = self.store.get_progress(student_id, subject).await?;
        let outline =
            path::outline(self.store.as_ref(), student_id, subject, &progress, revise_flag).await?;
        let entry = outline
            .entries
            .into_iter()
            .find(|e| e.topic.id == topic_id)
            .ok_or(TutorError::UnknownTopic(topic_id))?;
        if !entry.unlocked {
            return Err(TutorError::TopicLocked(topic_id));
        }
        self.enter_topic(student_id, subject, entry.topic, &progress, outline.review_mode)
            .await
    }

    async fn enter_topic(
        &self,
        student_id: StudentId,
        subject: &str,
        topic: Topic,
        progress: &ProgressRecord,
        review_mode: bool,
    ) -> Result<TutoringSession, TutorError> {
        let mastery = self.store.get_mastery(student_id, subject, topic.id).await?;
        let state = TutorState::entry(mastery.prob_knows);
        let level = AbilityLevel::from_theta(progress.theta_initial);
        tracing::debug!(
            student_id,
            topic_id = topic.id,
            prob_knows = mastery.prob_knows,
            state = state.as_str(),
            "topic opened"
        );
        Ok(TutoringSession::new(student_id, subject, topic, level, review_mode, state))
    }

    pub fn review_anyway(&self, session: &mut TutoringSession) -> Result<TutorState, TutorError> {
        Ok(session.fire(Trigger::ReviewAnyway)?)
    }

    pub fn skip_lesson(&self, session: &mut TutoringSession) -> Result<TutorState, TutorError> {
        let state = session.fire(Trigger::Skip)?;
        session.lesson = None;
        Ok(state)
    }

    pub fn start_quiz(&self, session: &mut TutoringSession) -> Result<TutorState, TutorError> {
        Ok(session.fire(Trigger::StartQuiz)?)
    }

    /// Personalized lesson for the topic. Generated once per session; the
    /// passive-learning credit is applied with that generation.
    pub async fn lesson(&self, session: &mut TutoringSession) -> Result<String, TutorError> {
        expect_state(session, TutorState::InitialLesson)?;
        if let Some(lesson) = &session.lesson {
            return Ok(lesson.clone());
        }

        let base = self
            .canonical(session, ContentKind::Lesson)
            .await?
            .filter(|text| validate::is_usable_lesson(text));
        let prompt = prompts::lesson(&session.subject, session.level, &session.topic.name, base.as_deref());
        let lesson = match self.content.generate(&prompt, &session.subject).await {
            Ok(text) if validate::is_usable_lesson(&text) => text,
            outcome => {
                warn!(
                    topic_id = session.topic.id,
                    reason = %failure_reason(&outcome),
                    "lesson generation unusable, using stored lesson"
                );
                base.unwrap_or_else(|| LESSON_UNAVAILABLE.to_string())
            }
        };

        self.credit_exposure(session).await?;
        self.log(session, LearningEvent::LessonView, "").await?;
        session.lesson = Some(lesson.clone());
        Ok(lesson)
    }

    /// The current understanding-check item, generated on first request.
    pub async fn quiz(&self, session: &mut TutoringSession) -> Result<QuizItem, TutorError> {
        expect_state(session, TutorState::UnderstandingQuiz)?;
        if let Some(quiz) = &session.quiz {
            return Ok(quiz.clone());
        }

        let lesson_text = self.lesson_context(session).await?;
        let entry = self
            .store
            .get_mastery(session.student_id, &session.subject, session.topic.id)
            .await?;
        let misconceptions: Vec<&String> = entry.misconceptions.iter().collect();
        let prompt = prompts::quiz(&session.subject, &session.topic.name, &lesson_text, misconceptions.as_slice());

        let generated = match self.content.generate(&prompt, &session.subject).await {
            Ok(text) => match validate::parse_quiz(&text) {
                Validated::Valid(quiz) => Some(quiz),
                Validated::Invalid(reason) => {
                    warn!(topic_id = session.topic.id, %reason, "generated quiz rejected, using stored question");
                    None
                }
            },
            Err(e) => {
                warn!(topic_id = session.topic.id, error = %e, "quiz generation failed, using stored question");
                None
            }
        };

        let quiz = match generated {
            Some(quiz) => quiz,
            None => self.canonical_quiz(session).await?,
        };
        session.quiz = Some(quiz.clone());
        Ok(quiz)
    }

    pub async fn submit_answer(
        &self,
        session: &mut TutoringSession,
        option_index: usize,
    ) -> Result<QuizOutcome, TutorError> {
        expect_state(session, TutorState::UnderstandingQuiz)?;
        let quiz = self.quiz(session).await?;
        let chosen = quiz
            .option(option_index)
            .ok_or(TutorError::InvalidOption {
                index: option_index,
                available: quiz.options.len(),
            })?
            .to_string();
        let is_correct = quiz.is_correct(&chosen);
        let misconception = (!is_correct).then_some(quiz.explanation.as_str());

        let mastery = bkt::record_evidence(
            self.store.as_ref(),
            &self.config.bkt,
            session.student_id,
            &session.subject,
            session.topic.id,
            is_correct,
            misconception,
        )
        .await?;

        if is_correct {
            self.log(session, LearningEvent::QuizPass, "").await?;
            session.fire(Trigger::AnswerCorrect)?;
        } else {
            self.log(session, LearningEvent::QuizFail, &quiz.explanation).await?;
            session.fire(Trigger::AnswerIncorrect)?;
            session.diagnosis = None;
            session.remediation = None;
            session.last_failure = Some(ErrorReport {
                topic: session.topic.name.clone(),
                question: quiz.question.clone(),
                wrong_answer: chosen.clone(),
                correct_answer: quiz.correct_answer.clone(),
                explanation: quiz.explanation.clone(),
                level: session.level,
            });
        }

        Ok(QuizOutcome {
            is_correct,
            chosen_answer: chosen,
            correct_answer: quiz.correct_answer,
            explanation: quiz.explanation,
            mastery,
            state: session.state(),
        })
    }

    /// Diagnoses the last wrong answer and explains it with the chosen strategy.
    pub async fn remediation(&self, session: &mut TutoringSession) -> Result<Remediation, TutorError> {
        expect_state(session, TutorState::FailedQuiz)?;
        if let (Some(diagnosis), Some(content)) = (&session.diagnosis, &session.remediation) {
            return Ok(Remediation {
                diagnosis: diagnosis.clone(),
                content: content.clone(),
            });
        }
        let report = session.last_failure.clone().ok_or(TutorError::WrongState {
            expected: TutorState::FailedQuiz,
            actual: session.state(),
        })?;

        let diagnosis = self.content.classify_error(&session.subject, &report).await;
        let prompt = prompts::remediation(&report, &diagnosis);
        let content = match self.content.generate(&prompt, &session.subject).await {
            Ok(text) if !text.trim().is_empty() => text,
            outcome => {
                warn!(
                    topic_id = session.topic.id,
                    reason = %failure_reason(&outcome),
                    "remediation generation failed, using stored explanation"
                );
                self.canonical(session, ContentKind::SimpleExplanation)
                    .await?
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| report.explanation.clone())
            }
        };

        self.credit_exposure(session).await?;
        self.log(session, LearningEvent::Remediation, diagnosis.strategy.as_str())
            .await?;

        session.diagnosis = Some(diagnosis.clone());
        session.remediation = Some(content.clone());
        Ok(Remediation { diagnosis, content })
    }

    /// Back to the quiz with a fresh item.
    pub fn retry_quiz(&self, session: &mut TutoringSession) -> Result<TutorState, TutorError> {
        let state = session.fire(Trigger::RetryQuiz)?;
        session.clear_failure();
        Ok(state)
    }

    /// Coding problem scoped to what the lesson covered.
    pub async fn challenge(&self, session: &mut TutoringSession) -> Result<String, TutorError> {
        expect_state(session, TutorState::CodingChallenge)?;
        if let Some(challenge) = &session.challenge {
            return Ok(challenge.clone());
        }

        let context = self.lesson_context(session).await?;
        let prompt = prompts::challenge(&session.subject, &session.topic.name, session.level, &context);
        let challenge = match self.content.generate(&prompt, &session.subject).await {
            Ok(text) if !text.trim().is_empty() => text,
            outcome => {
                warn!(
                    topic_id = session.topic.id,
                    reason = %failure_reason(&outcome),
                    "challenge generation failed, using stored challenge"
                );
                self.canonical(session, ContentKind::CodeChallenge)
                    .await?
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!(
                            "Write a short {} program that demonstrates {}. Print the result to the console.",
                            session.subject, session.topic.name
                        )
                    })
            }
        };

        session.challenge = Some(challenge.clone());
        Ok(challenge)
    }

    pub async fn submit_code(
        &self,
        session: &mut TutoringSession,
        code: &str,
    ) -> Result<CodeOutcome, TutorError> {
        expect_state(session, TutorState::CodingChallenge)?;
        if session.challenge_solved() {
            return Err(TutorError::AlreadySolved);
        }

        let submitted = code.trim();
        if submitted == coding_template(&session.subject).trim() {
            return Ok(CodeOutcome::Rejected(SubmissionIssue::Placeholder));
        }
        if submitted.chars().count() < self.config.code_min_length {
            return Ok(CodeOutcome::Rejected(SubmissionIssue::TooShort {
                min_length: self.config.code_min_length,
            }));
        }

        let challenge = self.challenge(session).await?;
        let lesson_text = session.lesson.clone().unwrap_or_default();
        let prompt = prompts::grading(&session.subject, &lesson_text, &challenge, code);
        let grading = match self.content.generate(&prompt, &session.subject).await {
            Ok(text) => match validate::parse_grading(&text) {
                Validated::Valid(grading) => grading,
                Validated::Invalid(reason) => {
                    warn!(topic_id = session.topic.id, %reason, "grading reply rejected, marking incorrect");
                    Grading::fallback()
                }
            },
            Err(e) => {
                warn!(topic_id = session.topic.id, error = %e, "grading request failed, marking incorrect");
                Grading::fallback()
            }
        };

        let mut mastery = None;
        if grading.is_correct {
            if !self.topic_mastered(session).await? {
                mastery = Some(
                    bkt::record_evidence(
                        self.store.as_ref(),
                        &self.config.bkt,
                        session.student_id,
                        &session.subject,
                        session.topic.id,
                        true,
                        None,
                    )
                    .await?,
                );
            }
            self.log(session, LearningEvent::ChallengePass, &grading.feedback).await?;
            session.fire(Trigger::ChallengePassed)?;
        } else {
            self.log(session, LearningEvent::ChallengeFail, &grading.feedback).await?;
            session.fire(Trigger::ChallengeFailed)?;
        }

        session.grading = Some(grading.clone());
        Ok(CodeOutcome::Graded { grading, mastery })
    }

    /// Leaves the topic after a solved challenge, or from the lesson of a
    /// mastered topic. At the end of the path the global mastery check
    /// decides between unlocking the final assessment and a redirect.
    pub async fn advance(&self, session: &TutoringSession) -> Result<Advance, TutorError> {
        let ready = match session.state() {
            TutorState::CodingChallenge => session.challenge_solved(),
            TutorState::InitialLesson => self.topic_mastered(session).await?,
            TutorState::SkipPrompt | TutorState::UnderstandingQuiz | TutorState::FailedQuiz => false,
        };
        if !ready {
            return Err(TutorError::NotReadyToAdvance(session.state()));
        }

        let student_id = session.student_id;
        let subject = session.subject.as_str();
        let progress = self.store.get_progress(student_id, subject).await?;

        if let Some(next) = path::next_topic(self.store.as_ref(), subject, session.topic.id).await? {
            info!(student_id, from = session.topic.id, to = next.id, "advancing to next topic");
            self.log(session, LearningEvent::TopicAdvance, &next.id.to_string())
                .await?;
            let next_session = self
                .enter_topic(student_id, subject, next, &progress, session.review_mode)
                .await?;
            return Ok(Advance::NextTopic(next_session));
        }

        if bkt::all_topics_mastered(self.store.as_ref(), student_id, subject).await? {
            if progress.status != ProgressStatus::Completed {
                self.store
                    .save_progress(
                        student_id,
                        subject,
                        &ProgressUpdate {
                            status: Some(ProgressStatus::Assessing),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            self.log(session, LearningEvent::PathComplete, "").await?;
            info!(student_id, subject, "learning path complete");
            return Ok(Advance::PathComplete);
        }

        let target = path::first_unmastered(self.store.as_ref(), student_id, subject)
            .await?
            .ok_or_else(|| TutorError::EmptyPath(subject.to_string()))?;
        info!(student_id, topic_id = target.id, "path end reached with gaps, redirecting");
        let redirected = self
            .enter_topic(student_id, subject, target, &progress, session.review_mode)
            .await?;
        Ok(Advance::Redirect(redirected))
    }

    /// Free-form question to the tutor about the current topic.
    pub async fn ask(&self, session: &TutoringSession, question: &str) -> String {
        let prompt = prompts::chat(&session.topic.name, session.level, question);
        match self.content.generate(&prompt, &session.subject).await {
            Ok(answer) if !answer.trim().is_empty() => answer,
            outcome => {
                warn!(reason = %failure_reason(&outcome), "tutor chat failed");
                CHAT_UNAVAILABLE.to_string()
            }
        }
    }

    async fn canonical(
        &self,
        session: &TutoringSession,
        kind: ContentKind,
    ) -> Result<Option<String>, StoreError> {
        self.store.get_canonical_content(session.topic.id, kind).await
    }

    async fn canonical_quiz(&self, session: &TutoringSession) -> Result<QuizItem, TutorError> {
        self.canonical(session, ContentKind::QuizQuestion)
            .await?
            .and_then(|text| validate::parse_quiz(&text).ok())
            .ok_or(TutorError::MissingCanonicalContent {
                topic_id: session.topic.id,
                kind: ContentKind::QuizQuestion,
            })
    }

    /// Text that grounds quiz and challenge prompts: the session lesson,
    /// else the stored lesson, else just the topic name.
    async fn lesson_context(&self, session: &TutoringSession) -> Result<String, StoreError> {
        if let Some(lesson) = session.lesson.as_deref().filter(|l| validate::is_usable_lesson(l)) {
            return Ok(lesson.to_string());
        }
        Ok(self
            .canonical(session, ContentKind::Lesson)
            .await?
            .filter(|text| validate::is_usable_lesson(text))
            .unwrap_or_else(|| format!("Topic: {}", session.topic.name)))
    }

    async fn topic_mastered(&self, session: &TutoringSession) -> Result<bool, StoreError> {
        let entry = self
            .store
            .get_mastery(session.student_id, &session.subject, session.topic.id)
            .await?;
        Ok(bkt::is_mastered(entry.prob_knows))
    }

    /// Passive-learning credit, skipped for mastered topics and in review mode.
    async fn credit_exposure(&self, session: &TutoringSession) -> Result<(), StoreError> {
        if session.review_mode || self.topic_mastered(session).await? {
            return Ok(());
        }
        bkt::apply_learning(
            self.store.as_ref(),
            &self.config.bkt,
            session.student_id,
            &session.subject,
            session.topic.id,
        )
        .await?;
        Ok(())
    }

    async fn log(
        &self,
        session: &TutoringSession,
        event: LearningEvent,
        details: &str,
    ) -> Result<(), StoreError> {
        self.store
            .log_event(session.student_id, &session.subject, Some(session.topic.id), event, details)
            .await
    }
}

fn expect_state(session: &TutoringSession, expected: TutorState) -> Result<(), TutorError> {
    if session.state() == expected {
        Ok(())
    } else {
        Err(TutorError::WrongState {
            expected,
            actual: session.state(),
        })
    }
}

fn failure_reason(outcome: &Result<String, ContentError>) -> String {
    match outcome {
        Ok(_) => "degenerate output".to_string(),
        Err(e) => e.to_string(),
    }
}
