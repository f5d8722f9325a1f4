//! Computerized adaptive testing over a calibrated 3PL item bank.
//!
//! Items are chosen by maximum Fisher information at the running ability
//! estimate; the estimate is recomputed after every response by a bounded,
//! deterministic maximum-likelihood search on `[THETA_MIN, THETA_MAX]`.

use thiserror::Error;

use crate::irt;
use crate::types::Item;

pub const THETA_MIN: f64 = -4.0;
pub const THETA_MAX: f64 = 4.0;
pub const INITIAL_THETA: f64 = 0.0;

const GRID_STEP: f64 = 0.05;
const REFINE_TOLERANCE: f64 = 1e-7;
const REFINE_MAX_ITERS: usize = 200;
const PROB_FLOOR: f64 = 1e-12;
const GOLDEN: f64 = 0.618_033_988_749_894_9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatState {
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Error, PartialEq)]
pub enum CatError {
    #[error("item bank has {available} calibrated items, test needs {required}")]
    InsufficientItemBank { available: usize, required: usize },
    #[error("test length must be at least one item")]
    InvalidTestLength,
    #[error("every item in the bank has been administered")]
    ItemBankExhausted,
    #[error("test session already complete")]
    SessionComplete,
    #[error("item index {0} is not in the bank")]
    UnknownItem(usize),
    #[error("item index {0} was already administered")]
    AlreadyAdministered(usize),
    #[error("no item is awaiting a response")]
    NoPendingItem,
}

#[derive(Debug, Clone)]
pub struct CatSession {
    items: Vec<Item>,
    test_length: usize,
    theta: f64,
    administered: Vec<usize>,
    responses: Vec<bool>,
    pending: Option<usize>,
    state: CatState,
}

impl CatSession {
    pub fn initialize(items: Vec<Item>, test_length: usize) -> Result<Self, CatError> {
        if test_length == 0 {
            return Err(CatError::InvalidTestLength);
        }
        if items.len() < test_length {
            return Err(CatError::InsufficientItemBank {
                available: items.len(),
                required: test_length,
            });
        }
        Ok(Self {
            items,
            test_length,
            theta: INITIAL_THETA,
            administered: Vec::with_capacity(test_length),
            responses: Vec::with_capacity(test_length),
            pending: None,
            state: CatState::NotStarted,
        })
    }

    /// Starts the search from a prior estimate instead of the population mean.
    pub fn with_initial_theta(mut self, theta: f64) -> Self {
        if self.state == CatState::NotStarted {
            self.theta = clamp_theta(theta);
        }
        self
    }

    pub fn state(&self) -> CatState {
        self.state
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn test_length(&self) -> usize {
        self.test_length
    }

    pub fn administered(&self) -> &[usize] {
        &self.administered
    }

    pub fn responses(&self) -> &[bool] {
        &self.responses
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn pending_item(&self) -> Option<(usize, &Item)> {
        let index = self.pending?;
        self.items.get(index).map(|item| (index, item))
    }

    /// 1-based number of the question currently being asked.
    pub fn question_number(&self) -> usize {
        self.administered.len() + 1
    }

    pub fn final_theta(&self) -> Option<f64> {
        (self.state == CatState::Complete).then_some(self.theta)
    }

    /// Returns the item to ask next. Repeated calls without a response return
    /// the same item.
    pub fn next_item(&mut self) -> Result<usize, CatError> {
        if self.state == CatState::Complete {
            return Err(CatError::SessionComplete);
        }
        if let Some(index) = self.pending {
            return Ok(index);
        }
        let index = select_next_item(&self.items, &self.administered, self.theta)?;
        self.pending = Some(index);
        self.state = CatState::InProgress;
        Ok(index)
    }

    /// Answers the item handed out by [`CatSession::next_item`].
    pub fn answer_pending(&mut self, is_correct: bool) -> Result<f64, CatError> {
        let index = self.pending.ok_or(CatError::NoPendingItem)?;
        self.record_response(index, is_correct)
    }

    /// Records a response and returns the re-estimated ability.
    pub fn record_response(&mut self, item_index: usize, is_correct: bool) -> Result<f64, CatError> {
        if self.state == CatState::Complete {
            return Err(CatError::SessionComplete);
        }
        if item_index >= self.items.len() {
            return Err(CatError::UnknownItem(item_index));
        }
        if self.administered.contains(&item_index) {
            return Err(CatError::AlreadyAdministered(item_index));
        }

        self.administered.push(item_index);
        self.responses.push(is_correct);
        if self.pending == Some(item_index) {
            self.pending = None;
        }

        self.theta = estimate_theta(&self.items, &self.administered, &self.responses, self.theta);
        self.state = if self.administered.len() >= self.test_length {
            CatState::Complete
        } else {
            CatState::InProgress
        };

        tracing::debug!(
            item_index,
            is_correct,
            theta = self.theta,
            answered = self.administered.len(),
            "cat response recorded"
        );

        Ok(self.theta)
    }
}

/// Picks the not-yet-administered item with maximum information at `theta`.
/// Ties resolve to the lowest index.
pub fn select_next_item(items: &[Item], administered: &[usize], theta: f64) -> Result<usize, CatError> {
    let mut best: Option<(usize, f64)> = None;

    for (index, item) in items.iter().enumerate() {
        if administered.contains(&index) {
            continue;
        }
        let info = irt::information(item, theta);
        let info = if info.is_nan() { 0.0 } else { info };
        match best {
            Some((_, best_info)) if info <= best_info => {}
            _ => best = Some((index, info)),
        }
    }

    best.map(|(index, _)| index).ok_or(CatError::ItemBankExhausted)
}

pub fn log_likelihood(items: &[Item], administered: &[usize], responses: &[bool], theta: f64) -> f64 {
    administered
        .iter()
        .zip(responses)
        .filter_map(|(&index, &correct)| items.get(index).map(|item| (item, correct)))
        .map(|(item, correct)| {
            let p = irt::probability(item, theta).clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
            if correct {
                p.ln()
            } else {
                (1.0 - p).ln()
            }
        })
        .sum()
}

/// Maximum-likelihood ability estimate over the bounded domain.
///
/// Uniform response vectors have no interior maximum and resolve to the
/// matching domain bound. Otherwise a coarse grid locates the best bracket,
/// which golden-section search then refines. `prior_theta` is returned when
/// nothing has been answered and breaks exact ties on the grid.
pub fn estimate_theta(
    items: &[Item],
    administered: &[usize],
    responses: &[bool],
    prior_theta: f64,
) -> f64 {
    let seed = clamp_theta(prior_theta);
    let answered = administered.len().min(responses.len());
    if answered == 0 {
        return seed;
    }
    let administered = &administered[..answered];
    let responses = &responses[..answered];

    if responses.iter().all(|&r| r) {
        return THETA_MAX;
    }
    if responses.iter().all(|&r| !r) {
        return THETA_MIN;
    }

    let ll = |theta: f64| log_likelihood(items, administered, responses, theta);

    let mut best_theta = seed;
    let mut best_ll = ll(seed);
    let steps = ((THETA_MAX - THETA_MIN) / GRID_STEP).round() as usize;
    for step in 0..=steps {
        let theta = (THETA_MIN + step as f64 * GRID_STEP).min(THETA_MAX);
        let value = ll(theta);
        let closer_tie = value == best_ll && (theta - seed).abs() < (best_theta - seed).abs();
        if value > best_ll || closer_tie {
            best_theta = theta;
            best_ll = value;
        }
    }

    let lo = (best_theta - GRID_STEP).max(THETA_MIN);
    let hi = (best_theta + GRID_STEP).min(THETA_MAX);
    let refined = golden_section_max(&ll, lo, hi);
    if ll(refined) >= best_ll {
        refined
    } else {
        best_theta
    }
}

fn golden_section_max(f: &impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let mut x1 = hi - GOLDEN * (hi - lo);
    let mut x2 = lo + GOLDEN * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);

    for _ in 0..REFINE_MAX_ITERS {
        if (hi - lo).abs() <= REFINE_TOLERANCE {
            break;
        }
        if f1 < f2 {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + GOLDEN * (hi - lo);
            f2 = f(x2);
        } else {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - GOLDEN * (hi - lo);
            f1 = f(x1);
        }
    }

    clamp_theta((lo + hi) / 2.0)
}

fn clamp_theta(theta: f64) -> f64 {
    if theta.is_nan() {
        INITIAL_THETA
    } else {
        theta.clamp(THETA_MIN, THETA_MAX)
    }
}
