//! Block index and candidate generation

use crate::predicate::{Predicate, PredicateSet};
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use relink_core::{Dataset, DatasetKind, RecordId, RecordPair, Source};
use tracing::debug;

/// Record positions sharing one block-key, per side.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl Block {
    /// Pairs this block contributes for the given dataset kind.
    pub fn pair_count(&self, kind: DatasetKind) -> u64 {
        match kind {
            DatasetKind::Dedup => {
                let n = self.left.len() as u64;
                n * n.saturating_sub(1) / 2
            }
            DatasetKind::Link => self.left.len() as u64 * self.right.len() as u64,
        }
    }
}

/// Block-key to record positions for one predicate.
pub fn blocks(predicate: &Predicate, data: &Dataset) -> AHashMap<String, Block> {
    let mut blocks: AHashMap<String, Block> = AHashMap::new();
    for source in [Source::Left, Source::Right] {
        for (i, record) in data.side(source).iter().enumerate() {
            for key in predicate.keys(record) {
                let block = blocks.entry(key).or_default();
                match source {
                    Source::Left => block.left.push(i),
                    Source::Right => block.right.push(i),
                }
            }
        }
    }
    blocks
}

/// Candidate pairs a predicate set would generate, counted per block.
///
/// Pairs sharing several keys are counted once per key.
pub fn estimated_pairs(blocks: &AHashMap<String, Block>, kind: DatasetKind) -> u64 {
    blocks.values().map(|b| b.pair_count(kind)).sum()
}

/// Blocks for every predicate of a set over one dataset.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    kind: DatasetKind,
    per_predicate: Vec<AHashMap<String, Block>>,
    left_ids: Vec<RecordId>,
    right_ids: Vec<RecordId>,
}

impl BlockIndex {
    pub fn build(predicates: &PredicateSet, data: &Dataset) -> Self {
        let per_predicate: Vec<_> = predicates.predicates().par_iter().map(|p| blocks(p, data)).collect();
        let ids = |source: Source| -> Vec<RecordId> {
            (0..data.side(source).len()).map(|i| data.id_at(source, i)).collect()
        };
        let index = Self {
            kind: data.kind(),
            per_predicate,
            left_ids: ids(Source::Left),
            right_ids: ids(Source::Right),
        };
        debug!(
            predicates = predicates.len(),
            blocks = index.block_count(),
            "block index built"
        );
        index
    }

    /// Total number of blocks across predicates.
    pub fn block_count(&self) -> usize {
        self.per_predicate.iter().map(|b| b.len()).sum()
    }

    /// Upper bound on the candidate count; pairs in several blocks count more than once.
    pub fn estimated_pairs(&self) -> u64 {
        self.per_predicate.iter().map(|b| estimated_pairs(b, self.kind)).sum()
    }

    /// Every pair sharing a block under any predicate, sorted and de-duplicated.
    ///
    /// Self-pairs are never produced. Linkage pairs always cross collections.
    pub fn candidate_pairs(&self) -> Vec<RecordPair> {
        let mut seen: AHashSet<(usize, usize)> = AHashSet::new();
        for blocks in &self.per_predicate {
            for block in blocks.values() {
                match self.kind {
                    DatasetKind::Dedup => {
                        for (n, &i) in block.left.iter().enumerate() {
                            for &j in &block.left[n + 1..] {
                                if i != j {
                                    seen.insert((i.min(j), i.max(j)));
                                }
                            }
                        }
                    }
                    DatasetKind::Link => {
                        for &i in &block.left {
                            for &j in &block.right {
                                seen.insert((i, j));
                            }
                        }
                    }
                }
            }
        }

        let partners = match self.kind {
            DatasetKind::Dedup => &self.left_ids,
            DatasetKind::Link => &self.right_ids,
        };
        let mut pairs: Vec<RecordPair> = seen
            .into_iter()
            .map(|(i, j)| RecordPair::new(self.left_ids[i].clone(), partners[j].clone()))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}
