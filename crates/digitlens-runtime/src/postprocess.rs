//! Logits to class probabilities.

use digitlens_core::{PipelineError, PipelineResult};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub prediction: usize,
    pub probs: Vec<f32>,
}

/// Numerically stable softmax: `exp(x_i - max(x)) / sum_j exp(x_j - max(x))`.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value. Ties go to the lowest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

pub fn classify(logits: &[f32]) -> PipelineResult<Classification> {
    if logits.is_empty() {
        return Err(PipelineError::EmptyLogits);
    }
    let probs = softmax(logits);
    // All-NaN probabilities have no maximum; fall back to the first class.
    let prediction = argmax(&probs).unwrap_or(0);
    Ok(Classification { prediction, probs })
}

/// Whole-number percentages for the probability chart; non-finite values
/// show as 0.
pub fn percentages(probs: &[f32]) -> Vec<u32> {
    probs
        .iter()
        .map(|&p| {
            if p.is_finite() {
                (p * 100.0).round().max(0.0) as u32
            } else {
                0
            }
        })
        .collect()
}
