#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use adaptive_tutor::assessment::Assessment;
use adaptive_tutor::config::Config;
use adaptive_tutor::content::{ContentError, ContentService};
use adaptive_tutor::db::MemoryStore;
use adaptive_tutor::tutor::TutorAgent;
use adaptive_tutor::types::{ContentKind, Item, TestType, Topic, TopicId};

pub const SUBJECT: &str = "C";
pub const TOPIC_IDS: [TopicId; 3] = [1, 2, 3];

pub const LESSON_TEXT: &str = "Variables name a region of memory that holds a typed value.";
pub const STORED_LESSON: &str = "Stored lesson: a variable is a named, typed storage location.";
pub const STORED_EXPLANATION: &str = "Stored explanation: read the declaration from right to left.";
pub const STORED_CHALLENGE: &str = "Stored challenge: declare an int, assign 5 and print it.";
pub const QUIZ_EXPLANATION: &str = "confuses declaration with assignment";
pub const PASSING_CODE: &str = "#include <stdio.h>\nint main() { int x = 5; printf(\"%d\", x); return 0; }";

/// Which prompt builder produced a request, recovered from its opening words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Lesson,
    Quiz,
    Diagnosis,
    Remediation,
    Challenge,
    Grading,
    Chat,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Option<Self> {
        let routes = [
            ("Generate a multiple-choice question", PromptKind::Quiz),
            ("Context:", PromptKind::Diagnosis),
            ("The student failed a question", PromptKind::Remediation),
            ("Act as a computer science examiner", PromptKind::Challenge),
            ("You are a context-aware code evaluator", PromptKind::Grading),
            ("You are a personalized tutor", PromptKind::Chat),
            ("You are an expert tutor for", PromptKind::Lesson),
        ];
        routes
            .into_iter()
            .find(|(prefix, _)| prompt.starts_with(prefix))
            .map(|(_, kind)| kind)
    }
}

/// Content service answering each prompt kind with a fixed reply. Kinds
/// without a reply fail as if the service were down.
#[derive(Default)]
pub struct ScriptedContent {
    replies: Mutex<HashMap<PromptKind, String>>,
    prompts: Mutex<Vec<(Option<PromptKind>, String)>>,
}

impl ScriptedContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that answers every kind sensibly.
    pub fn cooperative() -> Self {
        let content = Self::new();
        content.reply(PromptKind::Lesson, LESSON_TEXT);
        content.reply(PromptKind::Quiz, &quiz_json("int x = 5;"));
        content.reply(
            PromptKind::Diagnosis,
            r#"Diagnosis: {"diagnosis": "Mixed up declaring and assigning.", "strategy": "Analogy"}"#,
        );
        content.reply(PromptKind::Remediation, "Think of a declaration as labelling an empty box.");
        content.reply(PromptKind::Challenge, "Declare an int named x, assign 5 and print it.");
        content.reply(PromptKind::Grading, r#"{"is_correct": true, "feedback": "Correct and tidy."}"#);
        content.reply(PromptKind::Chat, "A pointer stores an address.");
        content
    }

    pub fn reply(&self, kind: PromptKind, text: &str) {
        self.replies.lock().insert(kind, text.to_string());
    }

    pub fn fail(&self, kind: PromptKind) {
        self.replies.lock().remove(&kind);
    }

    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.prompts
            .lock()
            .iter()
            .filter(|(k, _)| *k == Some(kind))
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ContentService for ScriptedContent {
    async fn generate(&self, prompt: &str, _subject: &str) -> Result<String, ContentError> {
        let kind = PromptKind::of(prompt);
        self.prompts.lock().push((kind, prompt.to_string()));
        kind.and_then(|k| self.replies.lock().get(&k).cloned())
            .ok_or(ContentError::Unavailable("scripted outage"))
    }
}

pub fn quiz_json(correct: &str) -> String {
    serde_json::json!({
        "question": "Which line declares and initializes an int?",
        "options": [correct, "x == 5;", "int = x 5;", "5 = int x;"],
        "correct_answer": correct,
        "explanation": QUIZ_EXPLANATION,
    })
    .to_string()
}

fn bank(prefix: i32, count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| {
            let spread = if count > 1 { i as f64 / (count - 1) as f64 } else { 0.5 };
            Item {
                id: prefix + i as i32,
                topic_id: TOPIC_IDS[i % TOPIC_IDS.len()],
                discrimination: 1.2,
                difficulty: -2.0 + 4.0 * spread,
                guessing: 0.2,
                text: format!("Question {i}"),
                options: vec!["right".into(), "wrong a".into(), "wrong b".into(), "wrong c".into()],
                correct_option_index: 0,
            }
        })
        .collect()
}

/// Three-topic C path with calibrated banks and canonical material for
/// every topic except the last, which has no stored quiz.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let names = ["Variables", "Loops", "Pointers"];
    for (order, (id, name)) in TOPIC_IDS.iter().zip(names).enumerate() {
        store.insert_topic(Topic {
            id: *id,
            subject: SUBJECT.into(),
            name: name.into(),
            knowledge_unit_code: "SDF".into(),
            order: order as i32 + 1,
        });
        store.insert_content(*id, ContentKind::Lesson, STORED_LESSON);
        store.insert_content(*id, ContentKind::SimpleExplanation, STORED_EXPLANATION);
        store.insert_content(*id, ContentKind::CodeChallenge, STORED_CHALLENGE);
    }
    store.insert_content(1, ContentKind::QuizQuestion, quiz_json("int y = 1;"));
    store.insert_content(2, ContentKind::QuizQuestion, quiz_json("int z = 2;"));

    store.insert_items(SUBJECT, TestType::Placement, bank(100, 12));
    store.insert_items(SUBJECT, TestType::Final, bank(200, 24));
    Arc::new(store)
}

pub fn set_all_mastery(store: &MemoryStore, student_id: i32, prob_knows: f64) {
    for id in TOPIC_IDS {
        store.set_mastery(student_id, SUBJECT, id, prob_knows);
    }
}

pub fn tutor(store: Arc<MemoryStore>, content: Arc<ScriptedContent>) -> TutorAgent {
    TutorAgent::new(store, content, Config::default().tutor)
}

pub fn assessment(store: Arc<MemoryStore>) -> Assessment {
    let config = Config::default();
    Assessment::new(store, config.assessment, config.tutor.bkt)
}
