pub mod json;
pub mod llm;
pub mod prompts;
pub mod validate;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AbilityLevel;

pub use json::{extract_json, extract_object};
pub use llm::LlmProvider;
pub use validate::{Diagnosis, Grading, QuizItem, Validated};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content service not configured: {0}")]
    Unavailable(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyResponse,
    #[error("malformed content: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationStrategy {
    Analogy,
    StepByStep,
    CodeComparison,
    SimpleExplanation,
}

impl RemediationStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            RemediationStrategy::Analogy => "Analogy",
            RemediationStrategy::StepByStep => "Step_by_Step",
            RemediationStrategy::CodeComparison => "Code_Comparison",
            RemediationStrategy::SimpleExplanation => "Simple_Explanation",
        }
    }

    /// Accepts the canonical labels and their spaced or lower-case spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace([' ', '-'], "_").to_ascii_lowercase();
        match normalized.as_str() {
            "analogy" => Some(Self::Analogy),
            "step_by_step" => Some(Self::StepByStep),
            "code_comparison" => Some(Self::CodeComparison),
            "simple_explanation" => Some(Self::SimpleExplanation),
            _ => None,
        }
    }
}

impl fmt::Display for RemediationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wrong quiz answer, as handed to the diagnostic classifier and the
/// remediation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub topic: String,
    pub question: String,
    pub wrong_answer: String,
    pub correct_answer: String,
    pub explanation: String,
    pub level: AbilityLevel,
}

/// External text generator. Structured replies are embedded JSON that the
/// caller extracts and validates.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn generate(&self, prompt: &str, subject: &str) -> Result<String, ContentError>;

    /// Picks a remediation strategy for a wrong answer. Never fails: any
    /// service or parse failure yields [`Diagnosis::fallback`].
    async fn classify_error(&self, subject: &str, report: &ErrorReport) -> Diagnosis {
        let reply = self.generate(&prompts::diagnosis(report), subject).await;
        diagnosis_from_reply(reply)
    }
}

pub(crate) fn diagnosis_from_reply(reply: Result<String, ContentError>) -> Diagnosis {
    match reply {
        Ok(text) => match validate::parse_diagnosis(&text) {
            Validated::Valid(diagnosis) => diagnosis,
            Validated::Invalid(reason) => {
                tracing::warn!(%reason, "diagnosis reply rejected, using default strategy");
                Diagnosis::fallback()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "diagnosis request failed, using default strategy");
            Diagnosis::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl ContentService for Canned {
        async fn generate(&self, _prompt: &str, _subject: &str) -> Result<String, ContentError> {
            if self.0.is_empty() {
                Err(ContentError::EmptyResponse)
            } else {
                Ok(self.0.to_string())
            }
        }
    }

    fn report() -> ErrorReport {
        ErrorReport {
            topic: "Pointers".into(),
            question: "What does * do?".into(),
            wrong_answer: "Multiplies".into(),
            correct_answer: "Dereferences".into(),
            explanation: "* on a pointer reads the pointee".into(),
            level: AbilityLevel::Beginner,
        }
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(RemediationStrategy::parse("Step_by_Step"), Some(RemediationStrategy::StepByStep));
        assert_eq!(RemediationStrategy::parse("Simple Explanation"), Some(RemediationStrategy::SimpleExplanation));
        assert_eq!(RemediationStrategy::parse(" analogy "), Some(RemediationStrategy::Analogy));
        assert_eq!(RemediationStrategy::parse("Review"), None);
    }

    #[tokio::test]
    async fn test_classify_error_uses_reply() {
        let service = Canned(r#"{"diagnosis": "Operator confusion", "strategy": "Analogy"}"#);
        let diagnosis = service.classify_error("C", &report()).await;
        assert_eq!(diagnosis.strategy, RemediationStrategy::Analogy);
        assert_eq!(diagnosis.diagnosis, "Operator confusion");
    }

    #[tokio::test]
    async fn test_classify_error_falls_back() {
        assert_eq!(Canned("").classify_error("C", &report()).await, Diagnosis::fallback());
        assert_eq!(Canned("no idea").classify_error("C", &report()).await, Diagnosis::fallback());
    }
}
