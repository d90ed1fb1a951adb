//! Distance and similarity functions for different field types
//!
//! String metrics return a similarity in [0.0, 1.0] where 1.0 means
//! identical. All string comparisons are case-insensitive.

use crate::schema::DistanceType;
use std::collections::HashSet;

/// Calculate text similarity between two strings
pub fn text_similarity(a: &str, b: &str, method: DistanceType) -> f64 {
    match method {
        DistanceType::Levenshtein => levenshtein_similarity(a, b),
        DistanceType::Trigram => trigram_similarity(a, b),
        DistanceType::Overlap => jaccard_tokens(a, b),
        DistanceType::Exact => exact_similarity(a, b),
    }
}

/// 1.0 if the values are equal ignoring case, 0.0 otherwise
pub fn exact_similarity(a: &str, b: &str) -> f64 {
    if a.to_lowercase() == b.to_lowercase() {
        1.0
    } else {
        0.0
    }
}

/// Normalized Levenshtein similarity: `1 - distance / max_len`
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Calculate Jaccard similarity between token sets
///
/// Tokenizes strings by whitespace and computes Jaccard index
pub fn jaccard_tokens(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let tokens_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    jaccard(&tokens_a, &tokens_b)
}

/// Calculate trigram similarity between two strings
///
/// Uses character trigrams for fuzzy text matching
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let trigrams_a = generate_trigrams(&a.to_lowercase());
    let trigrams_b = generate_trigrams(&b.to_lowercase());
    jaccard(&trigrams_a, &trigrams_b)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Generate character trigrams from a string
fn generate_trigrams(s: &str) -> HashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();
    chars.windows(3).map(|w| w.iter().collect::<String>()).collect()
}

/// `|ln a - ln b|`: 0 for equal values, growing with their ratio.
///
/// Undefined when either value is not strictly positive.
pub fn log_ratio_distance(a: f64, b: f64) -> Option<f64> {
    if a <= 0.0 || b <= 0.0 || !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some((a.ln() - b.ln()).abs())
}

/// Relative similarity: `1 - |a - b| / max(|a|, |b|)`, floored at 0
pub fn relative_number_similarity(a: f64, b: f64) -> f64 {
    let max = a.abs().max(b.abs());
    if max == 0.0 {
        1.0
    } else {
        (1.0 - (a - b).abs() / max).max(0.0)
    }
}
