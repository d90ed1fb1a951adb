//! Explainability for pair scores
//!
//! Breaks a match score down into per-field contributions to the linear
//! term so a reviewer can see which fields drove a decision.

use relink_core::{RecordPair, ScoredPairs};
use serde::Serialize;

/// Contribution of one field to a pair's score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldContribution {
    pub field: String,
    /// Field similarity, absent when undefined
    pub similarity: Option<f64>,
    /// Additive contribution to the linear term
    pub contribution: f64,
}

/// A scored pair with its per-field score breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainedPair {
    pub pair: RecordPair,
    pub score: f64,
    pub bias: f64,
    pub fields: Vec<FieldContribution>,
}

impl ExplainedPair {
    /// Field with the largest absolute contribution.
    pub fn top_contributing_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .max_by(|a, b| a.contribution.abs().total_cmp(&b.contribution.abs()))
            .map(|f| f.field.as_str())
    }
}

/// Summary statistics for a scoring run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStats {
    /// Number of pairs scored
    pub candidates_count: usize,
    /// Number of pairs at or above the threshold
    pub above_threshold: usize,
    pub mean_score: f64,
    pub best_score: f64,
}

impl ScoreStats {
    pub fn compute(scored: &ScoredPairs, threshold: f64) -> Self {
        if scored.is_empty() {
            return Self {
                candidates_count: 0,
                above_threshold: 0,
                mean_score: 0.0,
                best_score: 0.0,
            };
        }

        let scores = scored.scores();
        let mean_score = scores.iter().sum::<f64>() / scores.len() as f64;
        let best_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let above_threshold = scores.iter().filter(|&&s| s >= threshold).count();

        Self {
            candidates_count: scores.len(),
            above_threshold,
            mean_score,
            best_score,
        }
    }
}
