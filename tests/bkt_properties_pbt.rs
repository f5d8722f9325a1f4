//! Property-Based Tests for the learner models
//!
//! Tests the following invariants:
//! - BKT evidence updates stay inside [0, 1] and move in the answer's direction
//! - Passive learning credit never lowers the estimate
//! - Placement seeding is monotone in theta and clipped to [0.01, 0.99]
//! - A CAT run administers exactly the test length, never repeating an item
//! - Ability estimation is deterministic and bounded

use proptest::prelude::*;

use adaptive_tutor::bkt::{self, BktParams};
use adaptive_tutor::cat::{self, CatSession, CatState, THETA_MAX, THETA_MIN};
use adaptive_tutor::irt;
use adaptive_tutor::types::Item;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_f64_0_1() -> impl Strategy<Value = f64> {
    (0u64..=1000u64).prop_map(|v| v as f64 / 1000.0)
}

fn arb_bkt_params() -> impl Strategy<Value = BktParams> {
    (0.01f64..0.5, 0.01f64..0.45, 0.01f64..0.45).prop_map(|(p_transit, p_guess, p_slip)| BktParams {
        p_transit,
        p_guess,
        p_slip,
    })
}

fn arb_item() -> impl Strategy<Value = Item> {
    (0.3f64..2.5, -3.0f64..3.0, 0.0f64..0.35).prop_map(|(discrimination, difficulty, guessing)| Item {
        id: 0,
        topic_id: 1,
        discrimination,
        difficulty,
        guessing,
        text: String::new(),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct_option_index: 0,
    })
}

fn arb_bank(min: usize, max: usize) -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(arb_item(), min..=max).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Item { id: i as i32, ..item })
            .collect()
    })
}

// ============================================================================
// BKT
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10_000))]

    #[test]
    fn prop_evidence_update_stays_in_unit_interval(
        p in arb_f64_0_1(),
        correct in any::<bool>(),
        params in arb_bkt_params(),
    ) {
        let next = bkt::evidence_update(p, correct, &params);
        prop_assert!((0.0..=1.0).contains(&next), "p={p} correct={correct} -> {next}");
    }
}

proptest! {
    #[test]
    fn prop_evidence_moves_with_the_answer(p in 0.01f64..0.99) {
        let params = BktParams::default();
        prop_assert!(bkt::evidence_update(p, true, &params) >= p);
        prop_assert!(bkt::evidence_update(p, false, &params) <= p);
    }

    #[test]
    fn prop_passive_update_is_monotone(p in arb_f64_0_1(), params in arb_bkt_params()) {
        let next = bkt::passive_update(p, &params);
        prop_assert!(next >= p);
        prop_assert!(next <= 1.0);
    }

    #[test]
    fn prop_seed_is_monotone_and_clipped(a in -10.0f64..10.0, b in -10.0f64..10.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (seed_lo, seed_hi) = (bkt::seed_from_theta(lo), bkt::seed_from_theta(hi));
        prop_assert!(seed_lo <= seed_hi);
        for seed in [seed_lo, seed_hi] {
            prop_assert!((0.01..=0.99).contains(&seed));
        }
    }

    #[test]
    fn prop_mastery_predicates_agree_off_threshold(p in arb_f64_0_1()) {
        if p != bkt::MASTERY_THRESHOLD {
            prop_assert_eq!(bkt::is_mastered(p), bkt::meets_mastery(p));
        }
    }
}

// ============================================================================
// IRT / CAT
// ============================================================================

proptest! {
    #[test]
    fn prop_probability_bounded_below_by_guessing(item in arb_item(), theta in -4.0f64..4.0) {
        let p = irt::probability(&item, theta);
        prop_assert!(p >= item.guessing - 1e-12);
        prop_assert!(p <= 1.0);
        prop_assert!(irt::information(&item, theta) >= 0.0);
    }

    #[test]
    fn prop_cat_administers_distinct_items(
        bank in arb_bank(5, 25),
        answers in prop::collection::vec(any::<bool>(), 25),
        length_seed in 1usize..=25,
    ) {
        let length = length_seed.min(bank.len());
        let mut session = CatSession::initialize(bank, length).unwrap();

        let mut step = 0;
        while session.state() != CatState::Complete {
            session.next_item().unwrap();
            let theta = session.answer_pending(answers[step]).unwrap();
            prop_assert!((THETA_MIN..=THETA_MAX).contains(&theta));
            step += 1;
        }

        let mut administered = session.administered().to_vec();
        prop_assert_eq!(administered.len(), length);
        administered.sort_unstable();
        administered.dedup();
        prop_assert_eq!(administered.len(), length);
        prop_assert!(session.final_theta().is_some());
    }

    #[test]
    fn prop_estimate_is_deterministic(
        bank in arb_bank(3, 12),
        answers in prop::collection::vec(any::<bool>(), 12),
    ) {
        let administered: Vec<usize> = (0..bank.len()).collect();
        let responses = &answers[..bank.len()];
        let first = cat::estimate_theta(&bank, &administered, responses, 0.0);
        let second = cat::estimate_theta(&bank, &administered, responses, 0.0);
        prop_assert_eq!(first, second);
        prop_assert!((THETA_MIN..=THETA_MAX).contains(&first));

        if responses.iter().all(|&r| r) {
            prop_assert_eq!(first, THETA_MAX);
        }
        if responses.iter().all(|&r| !r) {
            prop_assert_eq!(first, THETA_MIN);
        }
    }
}
