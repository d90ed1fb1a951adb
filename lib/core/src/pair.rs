use crate::record::{RecordId, Source};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A pair of records to compare.
///
/// Same-source pairs (deduplication) are stored with `left < right`, so the
/// pair is unordered. Cross-source pairs (linkage) always keep the
/// [`Source::Left`] record on the left.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPair {
    pub left: RecordId,
    pub right: RecordId,
}

impl RecordPair {
    #[must_use]
    pub fn new(a: RecordId, b: RecordId) -> Self {
        let swap = if a.source == b.source {
            b < a
        } else {
            a.source == Source::Right
        };
        if swap {
            Self { left: b, right: a }
        } else {
            Self { left: a, right: b }
        }
    }

    #[inline]
    pub fn is_self_pair(&self) -> bool {
        self.left == self.right
    }
}

impl std::fmt::Display for RecordPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Ground-truth label for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Match,
    Distinct,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Match => write!(f, "match"),
            Label::Distinct => write!(f, "distinct"),
        }
    }
}

/// The labeled training pool: two disjoint, insertion-ordered sets.
#[derive(Debug, Clone, Default)]
pub struct TrainingPool {
    matches: Vec<RecordPair>,
    distinct: Vec<RecordPair>,
    labels: AHashMap<RecordPair, Label>,
}

impl TrainingPool {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label for a pair.
    ///
    /// Relabeling a pair moves it to the other set, so the latest label wins.
    /// Returns `false` if the pair already carried this label.
    pub fn insert(&mut self, pair: RecordPair, label: Label) -> bool {
        match self.labels.get(&pair).copied() {
            Some(existing) if existing == label => return false,
            Some(existing) => self.bucket_mut(existing).retain(|p| p != &pair),
            None => {}
        }
        self.labels.insert(pair.clone(), label);
        self.bucket_mut(label).push(pair);
        true
    }

    pub fn extend(&mut self, other: &TrainingPool) {
        for (pair, label) in other.iter() {
            self.insert(pair.clone(), label);
        }
    }

    fn bucket_mut(&mut self, label: Label) -> &mut Vec<RecordPair> {
        match label {
            Label::Match => &mut self.matches,
            Label::Distinct => &mut self.distinct,
        }
    }

    #[inline]
    pub fn label_of(&self, pair: &RecordPair) -> Option<Label> {
        self.labels.get(pair).copied()
    }

    #[inline]
    pub fn contains(&self, pair: &RecordPair) -> bool {
        self.labels.contains_key(pair)
    }

    #[inline]
    pub fn matches(&self) -> &[RecordPair] {
        &self.matches
    }

    #[inline]
    pub fn distinct(&self) -> &[RecordPair] {
        &self.distinct
    }

    pub fn count(&self, label: Label) -> usize {
        match label {
            Label::Match => self.matches.len(),
            Label::Distinct => self.distinct.len(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Matches first, then distinct pairs, each in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordPair, Label)> {
        self.matches
            .iter()
            .map(|p| (p, Label::Match))
            .chain(self.distinct.iter().map(|p| (p, Label::Distinct)))
    }
}

/// A candidate pair with its match score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub pair: RecordPair,
    pub score: f64,
}

/// Output of pairwise scoring: scores in candidate order with pair lookup.
#[derive(Debug, Clone, Default)]
pub struct ScoredPairs {
    pairs: Vec<ScoredPair>,
    index: AHashMap<RecordPair, usize>,
}

impl ScoredPairs {
    pub fn new(pairs: Vec<ScoredPair>) -> Self {
        let index = pairs
            .iter()
            .enumerate()
            .map(|(i, sp)| (sp.pair.clone(), i))
            .collect();
        Self { pairs, index }
    }

    #[inline]
    pub fn get(&self, pair: &RecordPair) -> Option<f64> {
        self.index.get(pair).map(|&i| self.pairs[i].score)
    }

    #[inline]
    pub fn as_slice(&self) -> &[ScoredPair] {
        &self.pairs
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredPair> {
        self.pairs.iter()
    }

    #[inline]
    pub fn scores(&self) -> Vec<f64> {
        self.pairs.iter().map(|sp| sp.score).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<ScoredPair> for ScoredPairs {
    fn from_iter<T: IntoIterator<Item = ScoredPair>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ScoredPairs {
    type Item = &'a ScoredPair;
    type IntoIter = std::slice::Iter<'a, ScoredPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_pair_is_unordered() {
        let a = RecordPair::new(RecordId::left("2"), RecordId::left("1"));
        let b = RecordPair::new(RecordId::left("1"), RecordId::left("2"));
        assert_eq!(a, b);
        assert_eq!(a.left, RecordId::left("1"));
    }

    #[test]
    fn test_link_pair_keeps_left_source_first() {
        let pair = RecordPair::new(RecordId::right("a"), RecordId::left("z"));
        assert_eq!(pair.left, RecordId::left("z"));
        assert_eq!(pair.right, RecordId::right("a"));
    }

    #[test]
    fn test_pool_sets_stay_disjoint() {
        let mut pool = TrainingPool::new();
        let pair = RecordPair::new(RecordId::left("1"), RecordId::right("1"));

        assert!(pool.insert(pair.clone(), Label::Match));
        assert!(!pool.insert(pair.clone(), Label::Match));
        assert!(pool.insert(pair.clone(), Label::Distinct));

        assert_eq!(pool.count(Label::Match), 0);
        assert_eq!(pool.count(Label::Distinct), 1);
        assert_eq!(pool.label_of(&pair), Some(Label::Distinct));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_scored_pairs_lookup() {
        let pair = RecordPair::new(RecordId::left("1"), RecordId::left("2"));
        let scored: ScoredPairs = vec![ScoredPair { pair: pair.clone(), score: 0.7 }]
            .into_iter()
            .collect();
        assert_eq!(scored.get(&pair), Some(0.7));
        assert_eq!(scored.len(), 1);
    }
}
