use serde::{Deserialize, Serialize};

/// Sentinel stored in a slot whose similarity is undefined.
pub const MISSING_SENTINEL: f64 = 0.0;

/// Per-field similarity scores for one record pair.
///
/// `values` and `missing` always have the same length, one slot per
/// configured field. An undefined similarity is stored as
/// [`MISSING_SENTINEL`] with its `missing` flag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
    missing: Vec<bool>,
}

impl FeatureVector {
    #[inline]
    #[must_use]
    pub fn from_similarities(similarities: impl IntoIterator<Item = Option<f64>>) -> Self {
        let (values, missing) = similarities
            .into_iter()
            .map(|s| match s {
                Some(v) if v.is_finite() => (v, false),
                _ => (MISSING_SENTINEL, true),
            })
            .unzip();
        Self { values, missing }
    }

    /// A vector with every slot defined.
    #[inline]
    #[must_use]
    pub fn dense(values: Vec<f64>) -> Self {
        Self::from_similarities(values.into_iter().map(Some))
    }

    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    #[must_use]
    pub fn missing(&self) -> &[bool] {
        &self.missing
    }

    /// Similarity in slot `i`, or `None` when undefined or out of range.
    #[inline]
    pub fn get(&self, i: usize) -> Option<f64> {
        match self.missing.get(i) {
            Some(false) => Some(self.values[i]),
            _ => None,
        }
    }

    #[inline]
    pub fn is_missing(&self, i: usize) -> bool {
        self.missing.get(i).copied().unwrap_or(true)
    }

    /// Design row for a linear model: values, then missing indicators, then 1.
    pub fn design_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.arity() * 2 + 1);
        row.extend_from_slice(&self.values);
        row.extend(self.missing.iter().map(|&m| if m { 1.0 } else { 0.0 }));
        row.push(1.0);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_slots_are_tagged() {
        let v = FeatureVector::from_similarities(vec![Some(0.8), None, Some(f64::NAN)]);
        assert_eq!(v.arity(), 3);
        assert_eq!(v.values(), &[0.8, MISSING_SENTINEL, MISSING_SENTINEL]);
        assert_eq!(v.missing(), &[false, true, true]);
        assert_eq!(v.get(0), Some(0.8));
        assert_eq!(v.get(1), None);
    }

    #[test]
    fn test_design_row_layout() {
        let v = FeatureVector::from_similarities(vec![Some(0.5), None]);
        assert_eq!(v.design_row(), vec![0.5, 0.0, 0.0, 1.0, 1.0]);
    }
}
