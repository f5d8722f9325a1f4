use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::db::{LearningEvent, Store, StoreError};
use crate::types::{
    ContentKind, Item, MasteryEntry, ProgressRecord, ProgressUpdate, ResponseEvent, StudentId,
    TestType, Topic, TopicId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub student_id: StudentId,
    pub subject: String,
    pub topic_id: Option<TopicId>,
    pub event: LearningEvent,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

type MasteryKey = (StudentId, String, TopicId);
type ProgressKey = (StudentId, String);

#[derive(Default)]
struct Inner {
    topics: Vec<Topic>,
    items: HashMap<(String, TestType), Vec<Item>>,
    content: HashMap<(TopicId, ContentKind), String>,
    mastery: HashMap<MasteryKey, MasteryEntry>,
    progress: HashMap<ProgressKey, ProgressRecord>,
    responses: Vec<ResponseEvent>,
    events: Vec<LoggedEvent>,
}

/// In-process store. Reference data is loaded through the `insert_*` methods.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_topic(&self, topic: Topic) {
        let mut inner = self.inner.write();
        inner.topics.retain(|t| t.id != topic.id);
        inner.topics.push(topic);
    }

    pub fn insert_items(&self, subject: &str, test_type: TestType, items: Vec<Item>) {
        self.inner
            .write()
            .items
            .insert((subject.to_string(), test_type), items);
    }

    pub fn insert_content(&self, topic_id: TopicId, kind: ContentKind, content: impl Into<String>) {
        self.inner.write().content.insert((topic_id, kind), content.into());
    }

    pub fn responses(&self) -> Vec<ResponseEvent> {
        self.inner.read().responses.clone()
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.inner.read().events.clone()
    }

    pub fn set_mastery(&self, student_id: StudentId, subject: &str, topic_id: TopicId, prob_knows: f64) {
        let mut inner = self.inner.write();
        let entry = inner
            .mastery
            .entry((student_id, subject.to_string(), topic_id))
            .or_insert_with(|| MasteryEntry::new(student_id, subject, topic_id));
        entry.prob_knows = prob_knows;
    }

    fn subject_topics(inner: &Inner, subject: &str) -> Vec<Topic> {
        let mut topics: Vec<Topic> = inner
            .topics
            .iter()
            .filter(|t| t.subject == subject)
            .cloned()
            .collect();
        topics.sort_by_key(|t| t.order);
        topics
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: TopicId,
    ) -> Result<MasteryEntry, StoreError> {
        let key = (student_id, subject.to_string(), topic_id);
        if let Some(entry) = self.inner.read().mastery.get(&key) {
            return Ok(entry.clone());
        }
        let mut inner = self.inner.write();
        Ok(inner
            .mastery
            .entry(key)
            .or_insert_with(|| MasteryEntry::new(student_id, subject, topic_id))
            .clone())
    }

    async fn save_mastery(&self, entry: &MasteryEntry) -> Result<(), StoreError> {
        let key = (entry.student_id, entry.subject.clone(), entry.topic_id);
        self.inner.write().mastery.insert(key, entry.clone());
        Ok(())
    }

    async fn list_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<Vec<MasteryEntry>, StoreError> {
        let inner = self.inner.read();
        Ok(Self::subject_topics(&inner, subject)
            .into_iter()
            .map(|topic| {
                inner
                    .mastery
                    .get(&(student_id, subject.to_string(), topic.id))
                    .cloned()
                    .unwrap_or_else(|| MasteryEntry::new(student_id, subject, topic.id))
            })
            .collect())
    }

    async fn seed_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        prob_knows: f64,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let topics = Self::subject_topics(&inner, subject);
        for topic in &topics {
            let entry = inner
                .mastery
                .entry((student_id, subject.to_string(), topic.id))
                .or_insert_with(|| MasteryEntry::new(student_id, subject, topic.id));
            entry.prob_knows = prob_knows;
        }
        Ok(topics.len())
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<ProgressRecord, StoreError> {
        let mut inner = self.inner.write();
        Ok(inner
            .progress
            .entry((student_id, subject.to_string()))
            .or_insert_with(|| ProgressRecord::new(student_id, subject))
            .clone())
    }

    async fn list_progress(&self, student_id: StudentId) -> Result<Vec<ProgressRecord>, StoreError> {
        let mut records: Vec<ProgressRecord> = self
            .inner
            .read()
            .progress
            .values()
            .filter(|record| record.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.subject.cmp(&b.subject));
        Ok(records)
    }

    async fn save_progress(
        &self,
        student_id: StudentId,
        subject: &str,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .progress
            .entry((student_id, subject.to_string()))
            .or_insert_with(|| ProgressRecord::new(student_id, subject));
        record.apply(update);
        Ok(record.clone())
    }

    async fn append_response_log(&self, event: &ResponseEvent) -> Result<(), StoreError> {
        self.inner.write().responses.push(event.clone());
        Ok(())
    }

    async fn get_items(&self, subject: &str, test_type: TestType) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .inner
            .read()
            .items
            .get(&(subject.to_string(), test_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_subjects(&self) -> Result<Vec<String>, StoreError> {
        let subjects: BTreeSet<String> = self
            .inner
            .read()
            .topics
            .iter()
            .map(|t| t.subject.clone())
            .collect();
        Ok(subjects.into_iter().collect())
    }

    async fn get_topics(&self, subject: &str) -> Result<Vec<Topic>, StoreError> {
        Ok(Self::subject_topics(&self.inner.read(), subject))
    }

    async fn get_canonical_content(
        &self,
        topic_id: TopicId,
        kind: ContentKind,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().content.get(&(topic_id, kind)).cloned())
    }

    async fn log_event(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: Option<TopicId>,
        event: LearningEvent,
        details: &str,
    ) -> Result<(), StoreError> {
        self.inner.write().events.push(LoggedEvent {
            student_id,
            subject: subject.to_string(),
            topic_id,
            event,
            details: details.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: TopicId, order: i32) -> Topic {
        Topic {
            id,
            subject: "C".into(),
            name: format!("topic {id}"),
            knowledge_unit_code: "SDF".into(),
            order,
        }
    }

    #[tokio::test]
    async fn test_get_mastery_creates_zero_entry_and_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.get_mastery(1, "C", 10).await.unwrap();
        let second = store.get_mastery(1, "C", 10).await.unwrap();
        assert_eq!(first.prob_knows, 0.0);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_mastery_follows_topic_order_without_creating_rows() {
        let store = MemoryStore::new();
        store.insert_topic(topic(2, 2));
        store.insert_topic(topic(1, 1));
        store.set_mastery(7, "C", 2, 0.4);

        let entries = store.list_mastery(7, "C").await.unwrap();
        let ids: Vec<TopicId> = entries.iter().map(|e| e.topic_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(entries[0].prob_knows, 0.0);
        assert_eq!(entries[1].prob_knows, 0.4);
        assert_eq!(store.inner.read().mastery.len(), 1);
    }

    #[tokio::test]
    async fn test_seed_mastery_sets_every_topic() {
        let store = MemoryStore::new();
        store.insert_topic(topic(1, 1));
        store.insert_topic(topic(2, 2));
        store.set_mastery(3, "C", 1, 0.9);

        assert_eq!(store.seed_mastery(3, "C", 0.6).await.unwrap(), 2);
        for entry in store.list_mastery(3, "C").await.unwrap() {
            assert_eq!(entry.prob_knows, 0.6);
        }
    }

    #[tokio::test]
    async fn test_progress_created_on_first_touch() {
        let store = MemoryStore::new();
        let record = store.get_progress(4, "C").await.unwrap();
        assert_eq!(record, ProgressRecord::new(4, "C"));
    }

    #[tokio::test]
    async fn test_list_progress_and_subjects() {
        let store = MemoryStore::new();
        store.insert_topic(topic(1, 1));
        store.insert_topic(Topic {
            subject: "Python".into(),
            ..topic(2, 1)
        });
        store.get_progress(8, "Python").await.unwrap();
        store.get_progress(8, "C").await.unwrap();
        store.get_progress(9, "C").await.unwrap();

        let subjects: Vec<String> = store
            .list_progress(8)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.subject)
            .collect();
        assert_eq!(subjects, vec!["C", "Python"]);
        assert_eq!(store.list_subjects().await.unwrap(), vec!["C", "Python"]);
    }
}
