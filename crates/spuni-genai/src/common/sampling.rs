//! Stateless sampling and logit-adjustment functions.
//!
//! Every function here transforms a logit vector (or picks a token from
//! one); no state is carried between calls. Randomness always comes from a
//! caller-supplied generator so deterministic callers stay deterministic.

use anyhow::Result;
use ndarray::Array1;
use rand::Rng;

use crate::common::DecodingStrategy;

/// Index of the maximum logit; ties break toward the lowest index.
pub fn argmax(logits: &Array1<f32>) -> u32 {
    let mut best_idx = 0usize;
    let mut best = f32::NEG_INFINITY;
    for (idx, &value) in logits.iter().enumerate() {
        if value > best {
            best = value;
            best_idx = idx;
        }
    }
    best_idx as u32
}

/// Divides every logit by `t`. The caller guarantees `t > 0`.
pub fn apply_temperature(logits: &mut Array1<f32>, t: f32) {
    if t == 1.0 {
        return;
    }
    logits.mapv_inplace(|x| x / t);
}

/// Scales the logit of every token already present in the history:
/// positive logits are divided by the penalty, negative ones multiplied,
/// so the effective probability always drops for `penalty > 1`.
pub fn apply_repetition_penalty(logits: &mut Array1<f32>, history: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    for &token in history {
        let idx = token as usize;
        if idx < logits.len() {
            let score = logits[idx];
            if score > 0.0 {
                logits[idx] = score / penalty;
            } else {
                logits[idx] = score * penalty;
            }
        }
    }
}

/// Masks tokens that would complete a banned sequence.
///
/// Single-token sequences are always masked. For longer sequences the last
/// token is masked whenever the generated suffix matches everything before
/// it.
pub fn apply_banned_sequences(logits: &mut Array1<f32>, history: &[u32], banned: &[Vec<u32>]) {
    for sequence in banned {
        let Some((&last, prefix)) = sequence.split_last() else {
            continue;
        };
        if prefix.is_empty() || history.ends_with(prefix) {
            let idx = last as usize;
            if idx < logits.len() {
                logits[idx] = f32::NEG_INFINITY;
            }
        }
    }
}

/// Numerically stable in-place softmax.
pub fn softmax_inplace(logits: &mut Array1<f32>) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    logits.mapv_inplace(|x| {
        let e = (x - max).exp();
        sum += e;
        e
    });
    if sum > 0.0 {
        logits.mapv_inplace(|x| x / sum);
    }
}

/// Keeps the `k` highest logits (rest set to -inf), converts the remainder
/// to a probability distribution and samples from it.
pub fn sample_top_k<R: Rng>(mut logits: Array1<f32>, k: usize, rng: &mut R) -> Result<u32> {
    anyhow::ensure!(k > 0, "top-k requires k > 0");
    if k < logits.len() {
        let mut indices: Vec<usize> = (0..logits.len()).collect();
        indices.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));
        for &idx in &indices[k..] {
            logits[idx] = f32::NEG_INFINITY;
        }
    }
    softmax_inplace(&mut logits);
    Ok(sample_from_probs(&logits, rng))
}

/// Nucleus sampling: sorts descending, accumulates probability mass until it
/// reaches `p`, discards the remainder and samples from the retained set.
pub fn sample_top_p<R: Rng>(mut logits: Array1<f32>, p: f32, rng: &mut R) -> Result<u32> {
    anyhow::ensure!(p > 0.0 && p <= 1.0, "top-p requires p in (0, 1]");

    let mut indices: Vec<usize> = (0..logits.len()).collect();
    indices.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));

    let mut probs = logits.clone();
    softmax_inplace(&mut probs);

    let mut cumulative = 0.0f32;
    let mut cutoff = indices.len();
    for (rank, &idx) in indices.iter().enumerate() {
        cumulative += probs[idx];
        if cumulative >= p {
            cutoff = rank + 1;
            break;
        }
    }
    for &idx in &indices[cutoff..] {
        logits[idx] = f32::NEG_INFINITY;
    }

    softmax_inplace(&mut logits);
    Ok(sample_from_probs(&logits, rng))
}

/// Categorical draw from a probability distribution.
pub fn sample_from_probs<R: Rng>(probs: &Array1<f32>, rng: &mut R) -> u32 {
    let uniform: f32 = rng.gen();
    let mut cumulative = 0.0f32;
    for (idx, &prob) in probs.iter().enumerate() {
        cumulative += prob;
        if uniform <= cumulative {
            return idx as u32;
        }
    }
    // Floating-point shortfall: fall back to the last nonzero bucket.
    (probs.len().saturating_sub(1)) as u32
}

/// Picks the next token according to the configured strategy. Temperature
/// must already have been applied by the caller.
pub fn sample_token<R: Rng>(
    logits: Array1<f32>,
    strategy: &DecodingStrategy,
    rng: &mut R,
) -> Result<u32> {
    match strategy {
        DecodingStrategy::Greedy => Ok(argmax(&logits)),
        DecodingStrategy::TopK(k) => sample_top_k(logits, *k, rng),
        DecodingStrategy::TopP(p) => sample_top_p(logits, *p, rng),
    }
}
