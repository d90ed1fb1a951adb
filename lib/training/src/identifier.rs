//! Seed pools from a shared identifier field

use crate::sample::{pair_at, random_position};
use rand::rngs::StdRng;
use rand::SeedableRng;
use relink_core::{Dataset, DatasetKind, Error, Label, Result, Source, TrainingPool};
use std::collections::BTreeMap;
use tracing::debug;

/// Random draws allowed per requested distinct pair before giving up.
const DRAWS_PER_DISTINCT: usize = 20;

/// Build a training pool from records that already carry a common identifier.
///
/// Every pair whose identifiers are equal (and present) is a match. Up to
/// `distinct_budget` random pairs whose identifiers differ are labeled
/// distinct. Records without an identifier take part in neither.
pub fn training_pairs_from_identifier(
    data: &Dataset,
    field: &str,
    distinct_budget: usize,
    seed: u64,
) -> Result<TrainingPool> {
    if field.is_empty() {
        return Err(Error::configuration("identifier field name is empty"));
    }

    let identifiers = |source: Source| -> Vec<Option<String>> {
        data.side(source)
            .iter()
            .map(|r| r.get(field).as_text().map(|t| t.into_owned()))
            .collect()
    };
    let left = identifiers(Source::Left);
    let partner = match data.kind() {
        DatasetKind::Dedup => left.clone(),
        DatasetKind::Link => identifiers(Source::Right),
    };

    let mut groups: BTreeMap<&str, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, id) in left.iter().enumerate() {
        if let Some(id) = id {
            groups.entry(id.as_str()).or_default().0.push(i);
        }
    }
    if data.is_linkage() {
        for (j, id) in partner.iter().enumerate() {
            if let Some(id) = id {
                groups.entry(id.as_str()).or_default().1.push(j);
            }
        }
    }

    let mut pool = TrainingPool::new();
    for (lefts, rights) in groups.values() {
        match data.kind() {
            DatasetKind::Dedup => {
                for (n, &i) in lefts.iter().enumerate() {
                    for &j in &lefts[n + 1..] {
                        pool.insert(pair_at(data, (i, j)), Label::Match);
                    }
                }
            }
            DatasetKind::Link => {
                for &i in lefts {
                    for &j in rights {
                        pool.insert(pair_at(data, (i, j)), Label::Match);
                    }
                }
            }
        }
    }

    if distinct_budget > 0 && data.total_pairs() > 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut found = 0;
        for _ in 0..distinct_budget.saturating_mul(DRAWS_PER_DISTINCT) {
            if found == distinct_budget {
                break;
            }
            let (i, j) = random_position(data, &mut rng);
            let differs = matches!((&left[i], &partner[j]), (Some(a), Some(b)) if a != b);
            if differs && pool.insert(pair_at(data, (i, j)), Label::Distinct) {
                found += 1;
            }
        }
    }

    debug!(
        field,
        matches = pool.count(Label::Match),
        distinct = pool.count(Label::Distinct),
        "training pairs derived from identifier"
    );
    Ok(pool)
}
