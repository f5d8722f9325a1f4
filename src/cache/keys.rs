use std::time::Duration;

use crate::types::{ContentKind, StudentId, TestType, TopicId};

pub const TOPICS_TTL: Duration = Duration::from_secs(60 * 60);
pub const ITEMS_TTL: Duration = Duration::from_secs(60 * 60);
pub const CONTENT_TTL: Duration = Duration::from_secs(10 * 60);
pub const MASTERY_VECTOR_TTL: Duration = Duration::from_secs(60);
pub const SUBJECTS_TTL: Duration = Duration::from_secs(60 * 60);

pub const TOPICS_CAPACITY: usize = 64;
pub const ITEMS_CAPACITY: usize = 128;
pub const CONTENT_CAPACITY: usize = 2_048;
pub const MASTERY_VECTOR_CAPACITY: usize = 10_000;

pub const SUBJECTS_KEY: &str = "subjects";

pub fn topics_key(subject: &str) -> String {
    format!("topics:{}", subject)
}

pub fn items_key(subject: &str, test_type: TestType) -> String {
    format!("items:{}:{}", subject, test_type.as_str())
}

pub fn content_key(topic_id: TopicId, kind: ContentKind) -> String {
    format!("content:{}:{:?}", topic_id, kind)
}

pub fn mastery_vector_key(student_id: StudentId, subject: &str) -> String {
    format!("mastery:{}:{}", student_id, subject)
}
