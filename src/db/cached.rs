use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::keys;
use crate::cache::TtlCache;
use crate::db::{LearningEvent, Store, StoreError};
use crate::types::{
    ContentKind, Item, MasteryEntry, ProgressRecord, ProgressUpdate, ResponseEvent, StudentId,
    TestType, Topic, TopicId,
};

/// Read-through cache over another store. Reference data (topics, items,
/// canonical content) and the per-subject mastery vector are cached; every
/// mastery write drops the affected vector.
pub struct CachedStore {
    inner: Arc<dyn Store>,
    topics: TtlCache<Vec<Topic>>,
    items: TtlCache<Vec<Item>>,
    content: TtlCache<Option<String>>,
    mastery_vectors: TtlCache<Vec<MasteryEntry>>,
    subjects: TtlCache<Vec<String>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            topics: TtlCache::new(keys::TOPICS_CAPACITY),
            items: TtlCache::new(keys::ITEMS_CAPACITY),
            content: TtlCache::new(keys::CONTENT_CAPACITY),
            mastery_vectors: TtlCache::new(keys::MASTERY_VECTOR_CAPACITY),
            subjects: TtlCache::new(1),
        }
    }

    fn invalidate_mastery(&self, student_id: StudentId, subject: &str) {
        self.mastery_vectors
            .delete(&keys::mastery_vector_key(student_id, subject));
    }
}

#[async_trait]
impl Store for CachedStore {
    async fn get_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: TopicId,
    ) -> Result<MasteryEntry, StoreError> {
        self.inner.get_mastery(student_id, subject, topic_id).await
    }

    async fn save_mastery(&self, entry: &MasteryEntry) -> Result<(), StoreError> {
        self.inner.save_mastery(entry).await?;
        self.invalidate_mastery(entry.student_id, &entry.subject);
        Ok(())
    }

    async fn list_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<Vec<MasteryEntry>, StoreError> {
        let key = keys::mastery_vector_key(student_id, subject);
        if let Some(entries) = self.mastery_vectors.get(&key) {
            return Ok(entries);
        }
        let entries = self.inner.list_mastery(student_id, subject).await?;
        self.mastery_vectors
            .set(key, entries.clone(), keys::MASTERY_VECTOR_TTL);
        Ok(entries)
    }

    async fn seed_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        prob_knows: f64,
    ) -> Result<usize, StoreError> {
        let seeded = self.inner.seed_mastery(student_id, subject, prob_knows).await?;
        self.invalidate_mastery(student_id, subject);
        Ok(seeded)
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<ProgressRecord, StoreError> {
        self.inner.get_progress(student_id, subject).await
    }

    async fn list_progress(&self, student_id: StudentId) -> Result<Vec<ProgressRecord>, StoreError> {
        self.inner.list_progress(student_id).await
    }

    async fn save_progress(
        &self,
        student_id: StudentId,
        subject: &str,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StoreError> {
        self.inner.save_progress(student_id, subject, update).await
    }

    async fn append_response_log(&self, event: &ResponseEvent) -> Result<(), StoreError> {
        self.inner.append_response_log(event).await
    }

    async fn get_items(&self, subject: &str, test_type: TestType) -> Result<Vec<Item>, StoreError> {
        let key = keys::items_key(subject, test_type);
        if let Some(items) = self.items.get(&key) {
            return Ok(items);
        }
        let items = self.inner.get_items(subject, test_type).await?;
        self.items.set(key, items.clone(), keys::ITEMS_TTL);
        Ok(items)
    }

    async fn list_subjects(&self) -> Result<Vec<String>, StoreError> {
        if let Some(subjects) = self.subjects.get(keys::SUBJECTS_KEY) {
            return Ok(subjects);
        }
        let subjects = self.inner.list_subjects().await?;
        self.subjects
            .set(keys::SUBJECTS_KEY, subjects.clone(), keys::SUBJECTS_TTL);
        Ok(subjects)
    }

    async fn get_topics(&self, subject: &str) -> Result<Vec<Topic>, StoreError> {
        let key = keys::topics_key(subject);
        if let Some(topics) = self.topics.get(&key) {
            return Ok(topics);
        }
        let topics = self.inner.get_topics(subject).await?;
        self.topics.set(key, topics.clone(), keys::TOPICS_TTL);
        Ok(topics)
    }

    async fn get_canonical_content(
        &self,
        topic_id: TopicId,
        kind: ContentKind,
    ) -> Result<Option<String>, StoreError> {
        let key = keys::content_key(topic_id, kind);
        if let Some(content) = self.content.get(&key) {
            return Ok(content);
        }
        let content = self.inner.get_canonical_content(topic_id, kind).await?;
        self.content.set(key, content.clone(), keys::CONTENT_TTL);
        Ok(content)
    }

    async fn log_event(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: Option<TopicId>,
        event: LearningEvent,
        details: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .log_event(student_id, subject, topic_id, event, details)
            .await
    }
}
