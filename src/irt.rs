use crate::types::Item;

const INFO_EPSILON: f64 = 1e-9;

/// Probability that a student of ability `theta` answers the item correctly (3PL).
pub fn probability(item: &Item, theta: f64) -> f64 {
    probability_3pl(item.discrimination, item.difficulty, item.guessing, theta)
}

pub fn probability_3pl(a: f64, b: f64, c: f64, theta: f64) -> f64 {
    c + (1.0 - c) / (1.0 + (-a * (theta - b)).exp())
}

/// Fisher information of the item at `theta`. Zero whenever the guessing
/// floor leaves no room for discrimination.
pub fn information(item: &Item, theta: f64) -> f64 {
    information_3pl(item.discrimination, item.difficulty, item.guessing, theta)
}

pub fn information_3pl(a: f64, b: f64, c: f64, theta: f64) -> f64 {
    let headroom = 1.0 - c;
    if headroom <= INFO_EPSILON {
        return 0.0;
    }
    let p = probability_3pl(a, b, c, theta);
    if p <= INFO_EPSILON || (p - c).abs() <= INFO_EPSILON {
        return 0.0;
    }
    let info = a * a * (p - c).powi(2) * (1.0 - p) / (headroom * headroom * p);
    if info.is_finite() {
        info.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(a: f64, b: f64, c: f64) -> Item {
        Item {
            id: 1,
            topic_id: 1,
            discrimination: a,
            difficulty: b,
            guessing: c,
            text: "q".into(),
            options: vec!["x".into(), "y".into()],
            correct_option_index: 0,
        }
    }

    #[test]
    fn test_probability_at_difficulty() {
        let p = probability(&item(1.0, 0.0, 0.25), 0.0);
        assert!((p - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_probability_bounded_by_guessing_floor() {
        let it = item(1.5, 0.0, 0.2);
        assert!(probability(&it, -40.0) >= 0.2);
        assert!(probability(&it, 40.0) <= 1.0);
    }

    #[test]
    fn test_probability_increases_with_theta() {
        let it = item(1.2, 0.5, 0.1);
        assert!(probability(&it, 1.0) > probability(&it, 0.0));
    }

    #[test]
    fn test_information_peaks_near_difficulty() {
        let it = item(1.0, 0.0, 0.0);
        let at_b = information(&it, 0.0);
        assert!((at_b - 0.25).abs() < 1e-12);
        assert!(at_b > information(&it, 2.0));
        assert!(at_b > information(&it, -2.0));
    }

    #[test]
    fn test_information_zero_when_guessing_saturates() {
        assert_eq!(information(&item(1.0, 0.0, 1.0), 0.0), 0.0);
        assert_eq!(information(&item(1.0, 0.0, 1.0 - 1e-12), 0.0), 0.0);
    }

    #[test]
    fn test_information_zero_far_below_difficulty() {
        let info = information(&item(2.0, 0.0, 0.25), -400.0);
        assert_eq!(info, 0.0);
    }

    #[test]
    fn test_higher_discrimination_more_informative() {
        assert!(information(&item(2.0, 0.0, 0.2), 0.0) > information(&item(0.5, 0.0, 0.2), 0.0));
    }
}
