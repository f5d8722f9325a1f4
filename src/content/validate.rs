//! Parse-then-validate for structured content-service replies.

use serde::{Deserialize, Serialize};

use crate::content::json::extract_object;
use crate::content::RemediationStrategy;

const MIN_LESSON_CHARS: usize = 20;
/// Prefix the content service puts on text it returns in place of a lesson.
pub const SERVICE_FAILURE_MARKER: &str = "Error connecting to AI:";
const GRADING_FALLBACK_FEEDBACK: &str = "Error processing code.";
const DIAGNOSIS_FALLBACK: &str = "General review needed.";

#[derive(Debug, Clone, PartialEq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(String),
}

impl<T> Validated<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Validated::Valid(value) => Some(value),
            Validated::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

impl QuizItem {
    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }

    pub fn is_correct(&self, chosen: &str) -> bool {
        chosen == self.correct_answer
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub is_correct: bool,
    pub feedback: String,
}

impl Grading {
    /// Conservative judgment used when no well-formed grading is available.
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            feedback: GRADING_FALLBACK_FEEDBACK.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub diagnosis: String,
    pub strategy: RemediationStrategy,
}

impl Diagnosis {
    pub fn fallback() -> Self {
        Self {
            diagnosis: DIAGNOSIS_FALLBACK.to_string(),
            strategy: RemediationStrategy::SimpleExplanation,
        }
    }
}

#[derive(Deserialize)]
struct RawQuiz {
    question: Option<String>,
    options: Option<Vec<String>>,
    correct_answer: Option<String>,
    explanation: Option<String>,
}

#[derive(Deserialize)]
struct RawGrading {
    is_correct: Option<bool>,
    feedback: Option<String>,
}

#[derive(Deserialize)]
struct RawDiagnosis {
    diagnosis: Option<String>,
    strategy: Option<String>,
}

fn parse_raw<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, String> {
    let object = extract_object(text).ok_or_else(|| "no JSON object in reply".to_string())?;
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| e.to_string())
}

fn non_empty(field: &str, value: Option<String>) -> Result<String, String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {field}"))
}

pub fn parse_quiz(text: &str) -> Validated<QuizItem> {
    let checked = parse_raw::<RawQuiz>(text).and_then(|raw| {
        let question = non_empty("question", raw.question)?;
        let options = raw.options.unwrap_or_default();
        if options.len() < 2 {
            return Err(format!("expected at least 2 options, got {}", options.len()));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err("empty option".to_string());
        }
        let correct_answer = raw.correct_answer.ok_or_else(|| "missing correct_answer".to_string())?;
        if !options.contains(&correct_answer) {
            return Err("correct_answer is not one of the options".to_string());
        }
        let explanation = non_empty("explanation", raw.explanation)?;
        Ok(QuizItem {
            question,
            options,
            correct_answer,
            explanation,
        })
    });
    into_validated(checked)
}

pub fn parse_grading(text: &str) -> Validated<Grading> {
    let checked = parse_raw::<RawGrading>(text).and_then(|raw| {
        let is_correct = raw.is_correct.ok_or_else(|| "missing is_correct".to_string())?;
        Ok(Grading {
            is_correct,
            feedback: raw.feedback.unwrap_or_default().trim().to_string(),
        })
    });
    into_validated(checked)
}

pub fn parse_diagnosis(text: &str) -> Validated<Diagnosis> {
    let checked = parse_raw::<RawDiagnosis>(text).and_then(|raw| {
        let strategy = raw.strategy.unwrap_or_default();
        let strategy = RemediationStrategy::parse(&strategy)
            .ok_or_else(|| format!("unknown strategy {strategy:?}"))?;
        Ok(Diagnosis {
            diagnosis: raw
                .diagnosis
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DIAGNOSIS_FALLBACK.to_string()),
            strategy,
        })
    });
    into_validated(checked)
}

/// Lesson text is degenerate when near-empty or a relayed service failure.
pub fn is_usable_lesson(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() > MIN_LESSON_CHARS && !text.starts_with(SERVICE_FAILURE_MARKER)
}

fn into_validated<T>(checked: Result<T, String>) -> Validated<T> {
    match checked {
        Ok(value) => Validated::Valid(value),
        Err(reason) => Validated::Invalid(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"Sure!
{"question": "Which type holds whole numbers?", "options": ["int", "float", "char", "void"],
 "correct_answer": "int", "explanation": "int stores integers"}"#;

    #[test]
    fn test_valid_quiz() {
        let quiz = parse_quiz(QUIZ).ok().unwrap();
        assert_eq!(quiz.options.len(), 4);
        assert!(quiz.is_correct("int"));
        assert!(!quiz.is_correct("float"));
        assert_eq!(quiz.option(1), Some("float"));
    }

    #[test]
    fn test_quiz_answer_must_be_an_option() {
        let reply = r#"{"question": "q?", "options": ["a", "b"], "correct_answer": "c", "explanation": "e"}"#;
        assert!(matches!(parse_quiz(reply), Validated::Invalid(_)));
    }

    #[test]
    fn test_quiz_needs_two_non_empty_options() {
        let one = r#"{"question": "q?", "options": ["a"], "correct_answer": "a", "explanation": "e"}"#;
        let blank = r#"{"question": "q?", "options": ["a", " "], "correct_answer": "a", "explanation": "e"}"#;
        assert!(parse_quiz(one).ok().is_none());
        assert!(parse_quiz(blank).ok().is_none());
    }

    #[test]
    fn test_quiz_needs_question_and_explanation() {
        let no_expl = r#"{"question": "q?", "options": ["a", "b"], "correct_answer": "a"}"#;
        let no_q = r#"{"options": ["a", "b"], "correct_answer": "a", "explanation": "e"}"#;
        assert!(parse_quiz(no_expl).ok().is_none());
        assert!(parse_quiz(no_q).ok().is_none());
        assert!(parse_quiz("no json here").ok().is_none());
    }

    #[test]
    fn test_quiz_wrong_field_type_is_invalid() {
        let reply = r#"{"question": "q?", "options": "a,b", "correct_answer": "a", "explanation": "e"}"#;
        assert!(matches!(parse_quiz(reply), Validated::Invalid(_)));
    }

    #[test]
    fn test_grading() {
        let grading = parse_grading(r#"{"is_correct": true, "feedback": "Nice"}"#).ok().unwrap();
        assert!(grading.is_correct);
        assert_eq!(grading.feedback, "Nice");
        assert!(parse_grading(r#"{"feedback": "?"}"#).ok().is_none());
        assert!(parse_grading(r#"{"is_correct": "yes"}"#).ok().is_none());
        assert!(!Grading::fallback().is_correct);
    }

    #[test]
    fn test_diagnosis_strategy_variants() {
        let d = parse_diagnosis(r#"{"diagnosis": "Confused = with ==", "strategy": "Code_Comparison"}"#)
            .ok()
            .unwrap();
        assert_eq!(d.strategy, RemediationStrategy::CodeComparison);
        let d = parse_diagnosis(r#"{"strategy": "Step by Step"}"#).ok().unwrap();
        assert_eq!(d.strategy, RemediationStrategy::StepByStep);
        assert_eq!(d.diagnosis, DIAGNOSIS_FALLBACK);
        assert!(parse_diagnosis(r#"{"strategy": "Interpretive dance"}"#).ok().is_none());
    }

    #[test]
    fn test_lesson_usability() {
        assert!(is_usable_lesson("Variables hold values of a declared type in C."));
        assert!(!is_usable_lesson("   short   "));
        assert!(!is_usable_lesson("Error connecting to AI: upstream timed out"));
        assert!(!is_usable_lesson("  Error connecting to AI: 503 Service Unavailable"));
    }

    #[test]
    fn test_lessons_about_errors_are_usable() {
        assert!(is_usable_lesson(
            "In C, a compile error is reported when a variable is used before it is declared."
        ));
        assert!(is_usable_lesson("Error handling in C relies on return codes and errno."));
    }
}
