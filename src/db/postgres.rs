use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::db::{LearningEvent, Store, StoreError};
use crate::types::{
    ContentKind, Item, MasteryEntry, ProgressRecord, ProgressStatus, ProgressUpdate, ResponseEvent,
    StudentId, TestType, Topic, TopicId,
};

const DEFAULT_DISCRIMINATION: f64 = 1.0;
const DEFAULT_DIFFICULTY: f64 = 0.0;
const DEFAULT_GUESSING: f64 = 0.25;

/// Store backed by the tutoring Postgres schema. Probabilities and ability
/// estimates are stored as `REAL`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn content_key(kind: ContentKind) -> (&'static str, &'static str) {
    match kind {
        ContentKind::Lesson => ("Explain", "Lesson"),
        ContentKind::QuizQuestion => ("Apply", "Quiz_Question_Apply"),
        ContentKind::CodeChallenge => ("Develop", "Code_Challenge"),
        ContentKind::SimpleExplanation => ("Explain", "Simple_Explanation"),
    }
}

fn parse_misconceptions(raw: Option<String>) -> BTreeSet<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .map(|v| v.into_iter().collect())
        .unwrap_or_default()
}

fn map_mastery(row: &PgRow, student_id: StudentId, subject: &str) -> Result<MasteryEntry, StoreError> {
    let prob_knows: Option<f32> = row.try_get("prob_knows")?;
    let misconceptions: Option<String> = row.try_get("misconceptions")?;
    let last_assessed: Option<DateTime<Utc>> = row.try_get("last_assessed")?;
    Ok(MasteryEntry {
        student_id,
        subject: subject.to_string(),
        topic_id: row.try_get("topic_id")?,
        prob_knows: prob_knows.map(f64::from).unwrap_or(0.0),
        misconceptions: parse_misconceptions(misconceptions),
        last_assessed: last_assessed.unwrap_or_else(Utc::now),
    })
}

fn map_progress(row: &PgRow) -> Result<ProgressRecord, StoreError> {
    let status: Option<String> = row.try_get("status")?;
    let status = match status.as_deref() {
        None => ProgressStatus::Learning,
        Some(raw) => ProgressStatus::parse(raw)
            .ok_or_else(|| StoreError::Decode(format!("unknown progress status {raw:?}")))?,
    };
    let theta_initial: Option<f32> = row.try_get("irt_theta_initial")?;
    let theta_final: Option<f32> = row.try_get("irt_theta_final")?;
    let attempts: Option<i32> = row.try_get("final_assessment_attempts")?;
    Ok(ProgressRecord {
        student_id: row.try_get("user_id")?,
        subject: row.try_get("subject")?,
        theta_initial: theta_initial.map(f64::from),
        theta_final: theta_final.map(f64::from),
        status,
        assignment_score: row.try_get("assignment_score")?,
        final_attempt_count: attempts.unwrap_or(0),
    })
}

fn map_item(row: &PgRow) -> Result<Item, StoreError> {
    let options: serde_json::Value = row.try_get("options")?;
    let options: Vec<String> =
        serde_json::from_value(options).map_err(|e| StoreError::Decode(e.to_string()))?;
    let correct: i32 = row.try_get("correct_option_index")?;
    let correct_option_index = usize::try_from(correct)
        .map_err(|_| StoreError::Decode(format!("negative correct_option_index {correct}")))?;
    let a: Option<f32> = row.try_get("irt_discrimination_a")?;
    let b: Option<f32> = row.try_get("irt_difficulty_b")?;
    let c: Option<f32> = row.try_get("irt_guessing_c")?;
    Ok(Item {
        id: row.try_get("id")?,
        topic_id: row.try_get("topic_id")?,
        discrimination: a.map(f64::from).unwrap_or(DEFAULT_DISCRIMINATION),
        difficulty: b.map(f64::from).unwrap_or(DEFAULT_DIFFICULTY),
        guessing: c.map(f64::from).unwrap_or(DEFAULT_GUESSING),
        text: row.try_get("question_text")?,
        options,
        correct_option_index,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn get_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: TopicId,
    ) -> Result<MasteryEntry, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bkt_model (user_id, subject, topic_id, prob_knows)
            VALUES ($1, $2, $3, 0.0)
            ON CONFLICT (user_id, subject, topic_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .bind(topic_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT topic_id, prob_knows, misconceptions, last_assessed
            FROM bkt_model
            WHERE user_id = $1 AND subject = $2 AND topic_id = $3
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await?;

        map_mastery(&row, student_id, subject)
    }

    async fn save_mastery(&self, entry: &MasteryEntry) -> Result<(), StoreError> {
        let misconceptions: Vec<&String> = entry.misconceptions.iter().collect();
        let misconceptions =
            serde_json::to_string(&misconceptions).map_err(|e| StoreError::Decode(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO bkt_model (user_id, subject, topic_id, prob_knows, misconceptions, last_assessed)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, subject, topic_id) DO UPDATE
            SET prob_knows = EXCLUDED.prob_knows,
                misconceptions = EXCLUDED.misconceptions,
                last_assessed = EXCLUDED.last_assessed
            "#,
        )
        .bind(entry.student_id)
        .bind(&entry.subject)
        .bind(entry.topic_id)
        .bind(entry.prob_knows as f32)
        .bind(misconceptions)
        .bind(entry.last_assessed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<Vec<MasteryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id AS topic_id, b.prob_knows, b.misconceptions, b.last_assessed
            FROM topics t
            LEFT JOIN bkt_model b
              ON t.id = b.topic_id AND b.user_id = $1 AND b.subject = $2
            WHERE t.subject = $2
            ORDER BY t.topic_order, t.id
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| map_mastery(row, student_id, subject))
            .collect()
    }

    async fn seed_mastery(
        &self,
        student_id: StudentId,
        subject: &str,
        prob_knows: f64,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bkt_model (user_id, subject, topic_id, prob_knows)
            SELECT $1::int4, $2::text, t.id, $3::real
            FROM topics t
            WHERE t.subject = $2::text
            ON CONFLICT (user_id, subject, topic_id) DO UPDATE
            SET prob_knows = EXCLUDED.prob_knows
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .bind(prob_knows as f32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        subject: &str,
    ) -> Result<ProgressRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO progress (user_id, subject)
            VALUES ($1, $2)
            ON CONFLICT (user_id, subject) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, subject, irt_theta_initial, irt_theta_final, status,
                   assignment_score, final_assessment_attempts
            FROM progress
            WHERE user_id = $1 AND subject = $2
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;

        map_progress(&row)
    }

    async fn list_progress(&self, student_id: StudentId) -> Result<Vec<ProgressRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, subject, irt_theta_initial, irt_theta_final, status,
                   assignment_score, final_assessment_attempts
            FROM progress
            WHERE user_id = $1
            ORDER BY subject
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_progress).collect()
    }

    async fn save_progress(
        &self,
        student_id: StudentId,
        subject: &str,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StoreError> {
        let current = self.get_progress(student_id, subject).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE progress SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(theta) = update.theta_initial {
                fields.push("irt_theta_initial = ");
                fields.push_bind_unseparated(theta as f32);
            }
            match update.theta_final {
                Some(Some(theta)) => {
                    fields.push("irt_theta_final = ");
                    fields.push_bind_unseparated(theta as f32);
                }
                Some(None) => {
                    fields.push("irt_theta_final = NULL");
                }
                None => {}
            }
            if let Some(status) = update.status {
                fields.push("status = ");
                fields.push_bind_unseparated(status.as_str());
            }
            if let Some(score) = update.assignment_score {
                fields.push("assignment_score = ");
                fields.push_bind_unseparated(score);
            }
            if let Some(attempts) = update.final_attempt_count {
                fields.push("final_assessment_attempts = ");
                fields.push_bind_unseparated(attempts);
            }
        }
        builder.push(" WHERE user_id = ");
        builder.push_bind(student_id);
        builder.push(" AND subject = ");
        builder.push_bind(subject.to_string());
        builder.build().execute(&self.pool).await?;

        let mut record = current;
        record.apply(update);
        Ok(record)
    }

    async fn append_response_log(&self, event: &ResponseEvent) -> Result<(), StoreError> {
        let response_index = i32::try_from(event.chosen_option_index)
            .map_err(|_| StoreError::Decode(format!("option index {} out of range", event.chosen_option_index)))?;
        sqlx::query(
            r#"
            INSERT INTO student_cat_responses
                (user_id, question_id, test_type, response_index, is_correct, theta_estimate_after, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.student_id)
        .bind(event.item_id)
        .bind(event.test_type.as_str())
        .bind(response_index)
        .bind(event.is_correct)
        .bind(event.theta_after as f32)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_items(&self, subject: &str, test_type: TestType) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic_id, irt_difficulty_b, irt_discrimination_a, irt_guessing_c,
                   question_text, options, correct_option_index
            FROM question_bank
            WHERE topic_id IN (SELECT id FROM topics WHERE subject = $1)
              AND test_type = $2
            ORDER BY id
            "#,
        )
        .bind(subject)
        .bind(test_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_item).collect()
    }

    async fn list_subjects(&self) -> Result<Vec<String>, StoreError> {
        let subjects: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT subject FROM topics ORDER BY subject")
                .fetch_all(&self.pool)
                .await?;
        Ok(subjects)
    }

    async fn get_topics(&self, subject: &str) -> Result<Vec<Topic>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.subject, t.topic_name, ku.ku_code, t.topic_order
            FROM topics t
            JOIN knowledge_units ku ON t.ku_id = ku.id
            WHERE t.subject = $1
            ORDER BY t.topic_order, t.id
            "#,
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Topic, StoreError> {
                let order: Option<i32> = row.try_get("topic_order")?;
                Ok(Topic {
                    id: row.try_get("id")?,
                    subject: row.try_get("subject")?,
                    name: row.try_get("topic_name")?,
                    knowledge_unit_code: row.try_get("ku_code")?,
                    order: order.unwrap_or(0),
                })
            })
            .collect()
    }

    async fn get_canonical_content(
        &self,
        topic_id: TopicId,
        kind: ContentKind,
    ) -> Result<Option<String>, StoreError> {
        let (bloom_level, intention_type) = content_key(kind);
        let row = sqlx::query(
            r#"
            SELECT content FROM pedagogical_content
            WHERE topic_id = $1
              AND bloom_level::text = $2
              AND intention_type::text = $3
            LIMIT 1
            "#,
        )
        .bind(topic_id)
        .bind(bloom_level)
        .bind(intention_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("content")?),
            None => None,
        })
    }

    async fn log_event(
        &self,
        student_id: StudentId,
        subject: &str,
        topic_id: Option<TopicId>,
        event: LearningEvent,
        details: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO learning_log (user_id, subject, topic_id, event_type, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .bind(topic_id)
        .bind(event.as_str())
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misconceptions_parse_tolerates_garbage() {
        assert!(parse_misconceptions(None).is_empty());
        assert!(parse_misconceptions(Some("not json".into())).is_empty());
        let parsed = parse_misconceptions(Some(r#"["a","b","a"]"#.into()));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_content_keys_match_schema_enums() {
        assert_eq!(content_key(ContentKind::Lesson), ("Explain", "Lesson"));
        assert_eq!(content_key(ContentKind::QuizQuestion).1, "Quiz_Question_Apply");
    }
}
