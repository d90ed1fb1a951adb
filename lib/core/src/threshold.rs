//! Operating threshold selection.
//!
//! Both entry points sweep every distinct observed score as a cutoff
//! (`score >= t` predicts a match) and keep the cutoff maximizing
//! `F_β = (1+β²)·P·R / (β²·P + R)` with `β² = recall_weight`.

use crate::pair::Label;
use crate::{Error, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The selected cutoff and its precision/recall at that point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChoice {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdOptimizer {
    recall_weight: f64,
}

impl ThresholdOptimizer {
    pub fn new(recall_weight: f64) -> Result<Self> {
        if !recall_weight.is_finite() || recall_weight <= 0.0 {
            return Err(Error::configuration(format!(
                "recall weight must be a positive number, got {}",
                recall_weight
            )));
        }
        Ok(Self { recall_weight })
    }

    #[inline]
    pub fn recall_weight(&self) -> f64 {
        self.recall_weight
    }

    /// Weighted F-measure for a precision/recall point.
    pub fn f_measure(&self, precision: f64, recall: f64) -> f64 {
        let beta2 = self.recall_weight;
        let denom = beta2 * precision + recall;
        if denom <= 0.0 {
            0.0
        } else {
            (1.0 + beta2) * precision * recall / denom
        }
    }

    /// Pick the cutoff against known labels. Ties keep the higher threshold.
    pub fn optimize(&self, scored: &[(f64, Label)]) -> Result<ThresholdChoice> {
        let mut sorted: Vec<(f64, f64)> = scored
            .iter()
            .filter(|(s, _)| s.is_finite())
            .map(|(s, l)| (*s, if *l == Label::Match { 1.0 } else { 0.0 }))
            .collect();
        let positives: f64 = sorted.iter().map(|(_, m)| m).sum();
        if positives == 0.0 {
            return Err(no_matches());
        }
        sorted.sort_by_key(|(s, _)| std::cmp::Reverse(OrderedFloat(*s)));
        self.sweep(&sorted, positives)
    }

    /// Pick the cutoff with no labels, treating each score as the
    /// probability that its pair is a match.
    pub fn estimate(&self, scores: &[f64]) -> Result<ThresholdChoice> {
        let mut sorted: Vec<(f64, f64)> = scores
            .iter()
            .filter(|s| s.is_finite())
            .map(|s| {
                let p = s.clamp(0.0, 1.0);
                (p, p)
            })
            .collect();
        let expected: f64 = sorted.iter().map(|(_, p)| p).sum();
        if expected <= 0.0 {
            return Err(no_matches());
        }
        sorted.sort_by_key(|(s, _)| std::cmp::Reverse(OrderedFloat(*s)));
        self.sweep(&sorted, expected)
    }

    /// Walk a descending list of `(score, true-positive mass)` and keep the
    /// best cutoff. `positives` is the total true-positive mass.
    fn sweep(&self, sorted: &[(f64, f64)], positives: f64) -> Result<ThresholdChoice> {
        let mut best: Option<ThresholdChoice> = None;
        let mut tp = 0.0;
        let mut i = 0;
        while i < sorted.len() {
            let threshold = sorted[i].0;
            while i < sorted.len() && sorted[i].0 == threshold {
                tp += sorted[i].1;
                i += 1;
            }
            let precision = tp / i as f64;
            let recall = tp / positives;
            let f_measure = self.f_measure(precision, recall);
            if best.map_or(true, |b| f_measure > b.f_measure) {
                best = Some(ThresholdChoice {
                    threshold,
                    precision,
                    recall,
                    f_measure,
                });
            }
        }

        let choice = best.ok_or_else(no_matches)?;
        debug!(
            threshold = choice.threshold,
            precision = choice.precision,
            recall = choice.recall,
            recall_weight = self.recall_weight,
            "threshold selected"
        );
        Ok(choice)
    }
}

fn no_matches() -> Error {
    Error::InsufficientData {
        class: Label::Match,
        found: 0,
        required: 1,
    }
}

impl Default for ThresholdOptimizer {
    fn default() -> Self {
        Self { recall_weight: 1.0 }
    }
}
