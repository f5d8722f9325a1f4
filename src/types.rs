use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type StudentId = i32;
pub type TopicId = i32;
pub type ItemId = i32;

/// A calibrated multiple-choice item under the three-parameter logistic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub topic_id: TopicId,
    pub discrimination: f64,
    pub difficulty: f64,
    pub guessing: f64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

impl Item {
    pub fn is_correct(&self, chosen_option_index: usize) -> bool {
        chosen_option_index == self.correct_option_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Placement,
    Final,
}

impl TestType {
    pub const fn as_str(self) -> &'static str {
        match self {
            TestType::Placement => "placement",
            TestType::Final => "final",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub student_id: StudentId,
    pub item_id: ItemId,
    pub test_type: TestType,
    pub chosen_option_index: usize,
    pub is_correct: bool,
    pub theta_after: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryEntry {
    pub student_id: StudentId,
    pub subject: String,
    pub topic_id: TopicId,
    pub prob_knows: f64,
    pub misconceptions: BTreeSet<String>,
    pub last_assessed: DateTime<Utc>,
}

impl MasteryEntry {
    pub fn new(student_id: StudentId, subject: &str, topic_id: TopicId) -> Self {
        Self {
            student_id,
            subject: subject.to_string(),
            topic_id,
            prob_knows: 0.0,
            misconceptions: BTreeSet::new(),
            last_assessed: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub subject: String,
    pub name: String,
    pub knowledge_unit_code: String,
    pub order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Learning,
    Assessing,
    Completed,
}

impl ProgressStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Learning => "learning",
            ProgressStatus::Assessing => "assessing",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "learning" => Some(Self::Learning),
            "assessing" => Some(Self::Assessing),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub student_id: StudentId,
    pub subject: String,
    pub theta_initial: Option<f64>,
    pub theta_final: Option<f64>,
    pub status: ProgressStatus,
    pub assignment_score: Option<i32>,
    pub final_attempt_count: i32,
}

impl ProgressRecord {
    pub fn new(student_id: StudentId, subject: &str) -> Self {
        Self {
            student_id,
            subject: subject.to_string(),
            theta_initial: None,
            theta_final: None,
            status: ProgressStatus::Learning,
            assignment_score: None,
            final_attempt_count: 0,
        }
    }

    /// A failed final assessment drops the student back to `learning` with a
    /// recorded result; every topic is then open for revision.
    pub fn failed_final_assessment(&self) -> bool {
        self.status == ProgressStatus::Learning
            && (self.assignment_score.is_some() || self.theta_final.is_some())
    }

    pub fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(theta) = update.theta_initial {
            self.theta_initial = Some(theta);
        }
        if let Some(theta) = update.theta_final {
            self.theta_final = theta;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(score) = update.assignment_score {
            self.assignment_score = Some(score);
        }
        if let Some(attempts) = update.final_attempt_count {
            self.final_attempt_count = attempts;
        }
    }
}

/// Partial update of a progress record; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub theta_initial: Option<f64>,
    /// `Some(None)` clears the stored final estimate.
    pub theta_final: Option<Option<f64>>,
    pub status: Option<ProgressStatus>,
    pub assignment_score: Option<i32>,
    pub final_attempt_count: Option<i32>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Lesson,
    QuizQuestion,
    CodeChallenge,
    SimpleExplanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityLevel {
    AbsoluteBeginner,
    Beginner,
    Intermediate,
    Proficient,
}

impl AbilityLevel {
    pub fn from_theta(theta: Option<f64>) -> Self {
        match theta {
            None => Self::AbsoluteBeginner,
            Some(t) if t < -1.0 => Self::AbsoluteBeginner,
            Some(t) if t < 0.0 => Self::Beginner,
            Some(t) if t < 1.0 => Self::Intermediate,
            Some(_) => Self::Proficient,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AbilityLevel::AbsoluteBeginner => "Absolute Beginner",
            AbilityLevel::Beginner => "Beginner",
            AbilityLevel::Intermediate => "Intermediate",
            AbilityLevel::Proficient => "Proficient",
        }
    }
}

impl fmt::Display for AbilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_level_bands() {
        assert_eq!(AbilityLevel::from_theta(None), AbilityLevel::AbsoluteBeginner);
        assert_eq!(AbilityLevel::from_theta(Some(-1.5)), AbilityLevel::AbsoluteBeginner);
        assert_eq!(AbilityLevel::from_theta(Some(-1.0)), AbilityLevel::Beginner);
        assert_eq!(AbilityLevel::from_theta(Some(0.0)), AbilityLevel::Intermediate);
        assert_eq!(AbilityLevel::from_theta(Some(1.0)), AbilityLevel::Proficient);
    }

    #[test]
    fn test_progress_update_leaves_unset_fields() {
        let mut record = ProgressRecord::new(1, "C");
        record.theta_initial = Some(0.4);
        record.apply(&ProgressUpdate {
            status: Some(ProgressStatus::Assessing),
            ..Default::default()
        });
        assert_eq!(record.theta_initial, Some(0.4));
        assert_eq!(record.status, ProgressStatus::Assessing);
    }

    #[test]
    fn test_progress_update_clears_final_theta() {
        let mut record = ProgressRecord::new(1, "C");
        record.theta_final = Some(0.2);
        record.apply(&ProgressUpdate {
            theta_final: Some(None),
            ..Default::default()
        });
        assert_eq!(record.theta_final, None);
    }

    #[test]
    fn test_failed_final_assessment_requires_learning_status() {
        let mut record = ProgressRecord::new(1, "C");
        assert!(!record.failed_final_assessment());
        record.theta_final = Some(0.3);
        assert!(record.failed_final_assessment());
        record.status = ProgressStatus::Completed;
        assert!(!record.failed_final_assessment());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ProgressStatus::Learning,
            ProgressStatus::Assessing,
            ProgressStatus::Completed,
        ] {
            assert_eq!(ProgressStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProgressStatus::parse("unknown"), None);
    }
}
