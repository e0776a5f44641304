//! Logits post-processing and token selection
//!
//! Processing order is fixed: repetition penalty, then (only when sampling)
//! temperature, top-k and top-p, then softmax. Given the same seed the whole
//! chain is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::inference::config::GenerationConfig;

/// Penalizes every distinct token already present in `sequence`.
///
/// Positive scores are divided by `penalty`, negative ones multiplied, so the
/// token always becomes less likely.
pub fn apply_repetition_penalty(scores: &mut [f32], sequence: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    let mut seen = vec![false; scores.len()];
    for &token in sequence {
        let idx = token as usize;
        if idx >= scores.len() || seen[idx] {
            continue;
        }
        seen[idx] = true;
        if scores[idx] > 0.0 {
            scores[idx] /= penalty;
        } else {
            scores[idx] *= penalty;
        }
    }
}

/// Divides scores by `temperature` (> 0).
pub fn apply_temperature(scores: &mut [f32], temperature: f32) {
    if temperature == 1.0 || temperature <= 0.0 {
        return;
    }
    let t = f64::from(temperature);
    for score in scores.iter_mut() {
        *score = (f64::from(*score) / t) as f32;
    }
}

/// Masks everything below the `k`-th highest score. Ties at the boundary are kept.
pub fn apply_top_k(scores: &mut [f32], k: usize) {
    if k == 0 || k >= scores.len() {
        return;
    }
    let mut sorted: Vec<f32> = scores.iter().copied().map(finite_or_min).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    for score in scores.iter_mut() {
        if finite_or_min(*score) < threshold {
            *score = f32::NEG_INFINITY;
        }
    }
}

/// Keeps the smallest set of most probable tokens whose mass reaches `top_p`.
/// At least one token always survives.
pub fn apply_top_p(scores: &mut [f32], top_p: f32) {
    if top_p >= 1.0 || scores.is_empty() {
        return;
    }
    let order = descending_order(scores);
    let probs = softmax(scores);

    let mut cumulative = 0.0f64;
    let mut keep = order.len();
    for (rank, &idx) in order.iter().enumerate() {
        cumulative += probs[idx];
        if cumulative >= f64::from(top_p) {
            keep = rank + 1;
            break;
        }
    }
    for &idx in &order[keep..] {
        scores[idx] = f32::NEG_INFINITY;
    }
}

/// Shift-invariant softmax computed in f64.
///
/// Scores that overflowed to +inf under a tiny temperature share all of the
/// mass; NaN is treated as -inf.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    let values: Vec<f64> = scores
        .iter()
        .map(|&s| if s.is_nan() { f64::NEG_INFINITY } else { f64::from(s) })
        .collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let weights: Vec<f64> = if max == f64::INFINITY {
        values.iter().map(|&v| if v == f64::INFINITY { 1.0 } else { 0.0 }).collect()
    } else if max == f64::NEG_INFINITY {
        vec![1.0; values.len()]
    } else {
        values.iter().map(|&v| (v - max).exp()).collect()
    };

    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Index of the highest probability; ties go to the lowest token id.
pub fn argmax(probs: &[f64]) -> u32 {
    let mut best_idx = 0usize;
    let mut best = f64::NEG_INFINITY;
    for (idx, &p) in probs.iter().enumerate() {
        if p > best {
            best = p;
            best_idx = idx;
        }
    }
    best_idx as u32
}

/// Draws one index from `probs`.
pub fn sample<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> u32 {
    let r: f64 = rng.gen();
    let mut cumulative = 0.0;
    let mut last_nonzero = 0usize;
    for (idx, &p) in probs.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        last_nonzero = idx;
        cumulative += p;
        if cumulative > r {
            return idx as u32;
        }
    }
    // Rounding left the cumulative mass just short of r.
    last_nonzero as u32
}

fn finite_or_min(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn descending_order(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort keeps lower ids first among equal scores.
    order.sort_by(|&a, &b| finite_or_min(scores[b]).total_cmp(&finite_or_min(scores[a])));
    order
}

/// Picks the next token from raw scores according to a generation config.
pub struct TokenSelector {
    repetition_penalty: f32,
    temperature: f32,
    top_k: usize,
    top_p: f32,
    rng: Option<StdRng>,
}

impl TokenSelector {
    pub fn from_config(config: &GenerationConfig) -> Self {
        let rng = config.sampling_enabled().then(|| match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        Self {
            repetition_penalty: config.repetition_penalty,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            rng,
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.rng.is_some()
    }

    /// Runs the processing chain over `scores` and returns the chosen token.
    pub fn select(&mut self, sequence: &[u32], mut scores: Vec<f32>) -> u32 {
        apply_repetition_penalty(&mut scores, sequence, self.repetition_penalty);
        match self.rng.as_mut() {
            Some(rng) => {
                apply_temperature(&mut scores, self.temperature);
                apply_top_k(&mut scores, self.top_k);
                apply_top_p(&mut scores, self.top_p);
                sample(&softmax(&scores), rng)
            }
            None => argmax(&softmax(&scores)),
        }
    }
}
