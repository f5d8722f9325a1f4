//! Prompt builders. Every prompt is personalized by the student's ability level.

use crate::content::{Diagnosis, ErrorReport};
use crate::types::AbilityLevel;

const CHALLENGE_CONTEXT_CHARS: usize = 1000;
const GRADING_CONTEXT_CHARS: usize = 500;

pub fn system_message(subject: &str) -> String {
    format!(
        "You are an expert tutor for the {} programming language. Provide clear, concise, and accurate information.",
        capitalize(subject)
    )
}

pub const DIAGNOSIS_SYSTEM_MESSAGE: &str =
    "You are a senior pedagogical agent. Your goal is to diagnose student misconceptions accurately.";

/// Rewrites stored lesson text for the student's level, or writes one from
/// scratch when there is no usable base text.
pub fn lesson(subject: &str, level: AbilityLevel, topic: &str, base: Option<&str>) -> String {
    match base {
        Some(base) => format!(
            "You are an expert tutor for {subject}.\n\
             Target student level: {level}.\n\n\
             BASE CONTENT: \"{base}\"\n\n\
             INSTRUCTIONS:\n\
             Rewrite the base content to match the student's level.\n\
             - Absolute Beginner: use analogies and simple English.\n\
             - Proficient: concise, technical, focus on efficiency.\n\
             - Keep the facts identical to the base content."
        ),
        None => format!(
            "You are an expert tutor for {subject}.\n\
             Target student level: {level}.\n\
             Topic: {topic}\n\n\
             INSTRUCTIONS:\n\
             Write a comprehensive lesson on this topic.\n\
             - Provide clear explanations.\n\
             - Include code examples.\n\
             - Adapt the complexity to the student's level."
        ),
    }
}

pub fn quiz<S: AsRef<str>>(subject: &str, topic: &str, lesson_text: &str, misconceptions: &[S]) -> String {
    let memory = if misconceptions.is_empty() {
        "Generate a standard application-level question.".to_string()
    } else {
        let joined: Vec<&str> = misconceptions.iter().map(AsRef::as_ref).collect();
        format!(
            "This student has previously struggled with: {}.\n\
             Generate a question that specifically tests these weaknesses.",
            joined.join(", ")
        )
    };
    format!(
        "Generate a multiple-choice question for {subject}: {topic}.\n\n\
         CONTEXT: {lesson_text}\n\n\
         STUDENT HISTORY:\n{memory}\n\n\
         Return JSON:\n\
         {{\"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"correct_answer\": \"...\", \"explanation\": \"...\"}}"
    )
}

pub fn diagnosis(report: &ErrorReport) -> String {
    format!(
        "Context:\n\
         - Topic: {topic}\n\
         - Student level: {level}\n\n\
         - Question asked: \"{question}\"\n\
         - The student answered: \"{wrong}\"\n\
         - The correct answer is: \"{correct}\"\n\n\
         TASK:\n\
         1. Compare the student answer to the correct answer.\n\
         2. Identify why they differ (logic error, syntax, guessing).\n\
         3. Select the one best remediation strategy:\n\
            - 'Analogy': for abstract concepts.\n\
            - 'Step_by_Step': for logic or math errors.\n\
            - 'Code_Comparison': for syntax errors.\n\
            - 'Simple_Explanation': for facts and definitions.\n\n\
         OUTPUT JSON ONLY:\n\
         {{\"diagnosis\": \"A short sentence explaining the specific mistake.\", \"strategy\": \"The_Selected_Strategy\"}}",
        topic = report.topic,
        level = report.level,
        question = report.question,
        wrong = report.wrong_answer,
        correct = report.correct_answer,
    )
}

pub fn remediation(report: &ErrorReport, diagnosis: &Diagnosis) -> String {
    format!(
        "The student failed a question on {topic}.\n\
         Student level: {level}.\n\n\
         QUESTION: {question}\n\
         STUDENT ANSWER: {wrong}\n\
         CORRECT ANSWER: {correct}\n\
         EXPLANATION: {explanation}\n\n\
         DIAGNOSIS: {diag}\n\
         STRATEGY: {strategy}\n\n\
         Task: provide a short explanation or example using ONLY the '{strategy}' method.\n\
         Keep it strictly relevant to the diagnosis.",
        topic = report.topic,
        level = report.level,
        question = report.question,
        wrong = report.wrong_answer,
        correct = report.correct_answer,
        explanation = report.explanation,
        diag = diagnosis.diagnosis,
        strategy = diagnosis.strategy,
    )
}

pub fn challenge(subject: &str, topic: &str, level: AbilityLevel, lesson_text: &str) -> String {
    let context = truncate_chars(lesson_text, CHALLENGE_CONTEXT_CHARS);
    format!(
        "Act as a computer science examiner.\n\
         Create a coding problem for {subject} on the topic '{topic}'.\n\
         Target difficulty: {level}.\n\n\
         LESSON CONTEXT (the student just learned this):\n\
         ------------------------------------------------\n\
         {context}\n\
         ------------------------------------------------\n\n\
         STRICT RULES:\n\
         1. The problem must be solvable using ONLY the concepts taught in the lesson context above.\n\
         2. Describe the problem scenario clearly.\n\
         3. Show an example output.\n\
         4. Do NOT write the solution code.\n\
         5. Output the problem statement only, in Markdown."
    )
}

pub fn grading(subject: &str, lesson_text: &str, challenge: &str, code: &str) -> String {
    let context = truncate_chars(lesson_text, GRADING_CONTEXT_CHARS);
    format!(
        "You are a context-aware code evaluator.\n\n\
         CONTEXT (what was taught):\n{context}\n\n\
         THE CHALLENGE: \"{challenge}\"\n\
         THE STUDENT'S SOLUTION:\n{code}\n\n\
         GRADING RULES:\n\
         1. If the code is empty or comments only, return is_correct: false.\n\
         2. Is it valid {subject} code?\n\
         3. Does it solve the problem?\n\n\
         Return JSON: {{\"is_correct\": true/false, \"feedback\": \"Specific feedback...\"}}"
    )
}

pub fn chat(topic: &str, level: AbilityLevel, question: &str) -> String {
    format!(
        "You are a personalized tutor.\n\
         Current topic: {topic}.\n\
         Student level: {level}.\n\
         Question: {question}"
    )
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
