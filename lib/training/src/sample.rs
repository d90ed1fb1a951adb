//! Working sample of unlabeled pairs
//!
//! Drawn once from the full comparison space, independent of blocking, so
//! the trainer sees comparator values the way they are really distributed.

use ahash::AHashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relink_core::{Dataset, DatasetKind, RecordPair, Source};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSample {
    pairs: Vec<RecordPair>,
}

impl WorkingSample {
    /// Draw up to `sample_size` distinct pairs uniformly without replacement.
    ///
    /// Enumerates the whole space when it fits in the budget. The same seed
    /// over the same dataset always yields the same sample, in draw order.
    pub fn draw(data: &Dataset, sample_size: usize, seed: u64) -> Self {
        let population = data.total_pairs();
        let positions = if population <= sample_size as u64 {
            enumerate(data)
        } else {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut seen = AHashSet::with_capacity(sample_size);
            let mut drawn = Vec::with_capacity(sample_size);
            while drawn.len() < sample_size {
                let position = random_position(data, &mut rng);
                if seen.insert(position) {
                    drawn.push(position);
                }
            }
            drawn
        };

        let sample = Self::from_pairs(positions.into_iter().map(|p| pair_at(data, p)).collect());
        debug!(population, sampled = sample.len(), "working sample drawn");
        sample
    }

    #[inline]
    #[must_use]
    pub fn from_pairs(pairs: Vec<RecordPair>) -> Self {
        Self { pairs }
    }

    #[inline]
    pub fn pairs(&self) -> &[RecordPair] {
        &self.pairs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordPair> {
        self.pairs.iter()
    }

    pub fn into_pairs(self) -> Vec<RecordPair> {
        self.pairs
    }
}

/// Position pair to record pair: (left index, partner index).
pub(crate) fn pair_at(data: &Dataset, (i, j): (usize, usize)) -> RecordPair {
    RecordPair::new(
        data.id_at(Source::Left, i),
        data.id_at(data.partner_source(), j),
    )
}

/// One uniformly random comparable position pair.
///
/// Dedup positions come back as (smaller, larger). The dataset must hold at
/// least one comparable pair.
pub(crate) fn random_position(data: &Dataset, rng: &mut StdRng) -> (usize, usize) {
    let n = data.side(Source::Left).len();
    match data.kind() {
        DatasetKind::Dedup => {
            let i = rng.random_range(0..n);
            let mut j = rng.random_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            (i.min(j), i.max(j))
        }
        DatasetKind::Link => {
            let m = data.side(Source::Right).len();
            (rng.random_range(0..n), rng.random_range(0..m))
        }
    }
}

fn enumerate(data: &Dataset) -> Vec<(usize, usize)> {
    let n = data.side(Source::Left).len();
    match data.kind() {
        DatasetKind::Dedup => (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect(),
        DatasetKind::Link => {
            let m = data.side(Source::Right).len();
            (0..n).flat_map(|i| (0..m).map(move |j| (i, j))).collect()
        }
    }
}
