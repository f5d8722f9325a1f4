use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{Store, StoreError};
use crate::types::{StudentId, TopicId};

/// Probability above which a topic counts as learned everywhere in the system.
pub const MASTERY_THRESHOLD: f64 = 0.95;

const DEFAULT_P_TRANSIT: f64 = 0.15;
const DEFAULT_P_GUESS: f64 = 0.20;
const DEFAULT_P_SLIP: f64 = 0.10;
const SEED_MIN: f64 = 0.01;
const SEED_MAX: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BktParams {
    pub p_transit: f64,
    pub p_guess: f64,
    pub p_slip: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_transit: DEFAULT_P_TRANSIT,
            p_guess: DEFAULT_P_GUESS,
            p_slip: DEFAULT_P_SLIP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MasteryUpdate {
    pub before: f64,
    pub after: f64,
}

impl MasteryUpdate {
    pub fn delta(&self) -> f64 {
        self.after - self.before
    }
}

/// Posterior probability of knowing the topic after one graded response.
pub fn evidence_update(p: f64, is_correct: bool, params: &BktParams) -> f64 {
    let (known, unknown) = if is_correct {
        (p * (1.0 - params.p_slip), (1.0 - p) * params.p_guess)
    } else {
        (p * params.p_slip, (1.0 - p) * (1.0 - params.p_guess))
    };
    let denom = known + unknown;
    if denom <= 0.0 {
        // 0/0 only happens at p = 0 or p = 1 with a degenerate emission; the
        // prior is already certain.
        return p;
    }
    known / denom
}

/// Learning credit for one instructional exposure.
pub fn passive_update(p: f64, params: &BktParams) -> f64 {
    p + (1.0 - p) * params.p_transit
}

/// Maps an IRT ability estimate onto a BKT prior.
pub fn seed_from_theta(theta: f64) -> f64 {
    let p = 1.0 / (1.0 + (-theta).exp());
    p.clamp(SEED_MIN, SEED_MAX)
}

/// Strictly above the threshold; drives locking icons and state-machine branches.
pub fn is_mastered(p: f64) -> bool {
    p > MASTERY_THRESHOLD
}

/// Inclusive variant used by the frontier and global-completion checks.
pub fn meets_mastery(p: f64) -> bool {
    p >= MASTERY_THRESHOLD
}

pub async fn record_evidence(
    store: &dyn Store,
    params: &BktParams,
    student_id: StudentId,
    subject: &str,
    topic_id: TopicId,
    is_correct: bool,
    misconception: Option<&str>,
) -> Result<MasteryUpdate, StoreError> {
    let mut entry = store.get_mastery(student_id, subject, topic_id).await?;
    let before = entry.prob_knows;
    entry.prob_knows = evidence_update(before, is_correct, params);
    if let Some(label) = misconception.map(str::trim).filter(|s| !s.is_empty()) {
        entry.misconceptions.insert(label.to_string());
    }
    entry.last_assessed = Utc::now();
    store.save_mastery(&entry).await?;

    tracing::debug!(
        student_id,
        subject,
        topic_id,
        is_correct,
        before,
        after = entry.prob_knows,
        "bkt evidence applied"
    );

    Ok(MasteryUpdate {
        before,
        after: entry.prob_knows,
    })
}

pub async fn apply_learning(
    store: &dyn Store,
    params: &BktParams,
    student_id: StudentId,
    subject: &str,
    topic_id: TopicId,
) -> Result<MasteryUpdate, StoreError> {
    let mut entry = store.get_mastery(student_id, subject, topic_id).await?;
    let before = entry.prob_knows;
    entry.prob_knows = passive_update(before, params);
    entry.last_assessed = Utc::now();
    store.save_mastery(&entry).await?;

    tracing::debug!(student_id, subject, topic_id, before, after = entry.prob_knows, "passive learning applied");

    Ok(MasteryUpdate {
        before,
        after: entry.prob_knows,
    })
}

/// Seeds every topic of the subject from the placement estimate and returns the prior used.
pub async fn seed_subject(
    store: &dyn Store,
    student_id: StudentId,
    subject: &str,
    theta: f64,
) -> Result<f64, StoreError> {
    let prior = seed_from_theta(theta);
    let seeded = store.seed_mastery(student_id, subject, prior).await?;
    if seeded == 0 {
        tracing::warn!(student_id, subject, "no topics found to seed mastery");
    }
    Ok(prior)
}

pub async fn all_topics_mastered(
    store: &dyn Store,
    student_id: StudentId,
    subject: &str,
) -> Result<bool, StoreError> {
    let entries = store.list_mastery(student_id, subject).await?;
    Ok(!entries.is_empty() && entries.iter().all(|e| meets_mastery(e.prob_knows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_answer_raises_mastery() {
        let params = BktParams::default();
        let p = evidence_update(0.5, true, &params);
        assert!((p - 0.45 / 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_incorrect_answer_lowers_mastery() {
        let params = BktParams::default();
        let p = evidence_update(0.5, false, &params);
        assert!((p - 0.05 / 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_certain_priors_are_fixed_points() {
        let params = BktParams::default();
        assert_eq!(evidence_update(0.0, false, &params), 0.0);
        assert_eq!(evidence_update(0.0, true, &params), 0.0);
        assert_eq!(evidence_update(1.0, true, &params), 1.0);
        assert_eq!(evidence_update(1.0, false, &params), 1.0);
    }

    #[test]
    fn test_degenerate_emission_does_not_nan() {
        let params = BktParams {
            p_transit: 0.15,
            p_guess: 0.0,
            p_slip: 0.1,
        };
        assert_eq!(evidence_update(0.0, true, &params), 0.0);
        let params = BktParams {
            p_transit: 0.15,
            p_guess: 0.2,
            p_slip: 0.0,
        };
        assert_eq!(evidence_update(1.0, false, &params), 1.0);
    }

    #[test]
    fn test_passive_update() {
        let params = BktParams::default();
        assert!((passive_update(0.0, &params) - 0.15).abs() < 1e-12);
        assert!((passive_update(0.5, &params) - 0.575).abs() < 1e-12);
        assert_eq!(passive_update(1.0, &params), 1.0);
    }

    #[test]
    fn test_seed_is_clipped() {
        assert_eq!(seed_from_theta(0.0), 0.5);
        assert_eq!(seed_from_theta(100.0), 0.99);
        assert_eq!(seed_from_theta(-100.0), 0.01);
        assert!(seed_from_theta(1.0) > 0.73);
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(is_mastered(0.951));
        assert!(!is_mastered(0.949));
        assert!(!is_mastered(0.95));
        assert!(meets_mastery(0.95));
        assert!(meets_mastery(0.951));
        assert!(!meets_mastery(0.949));
    }
}
