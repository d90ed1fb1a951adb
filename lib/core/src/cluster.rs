//! Entity clustering over scored pairs.
//!
//! Hierarchical mode first groups records by connected component over the
//! edges at or above the threshold, then re-partitions each component with
//! average-linkage merging. A merge is only taken when the average linkage
//! clears the threshold and no scored cross pair falls below the
//! consistency threshold, so a chain `A-B`, `B-C` with a weak `A-C` is cut
//! at its weakest point instead of collapsing into one entity.

use crate::pair::{RecordPair, ScoredPairs};
use crate::record::RecordId;
use crate::{Error, Result};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How scored pairs are resolved into clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Connected components refined by consistency-constrained average linkage
    #[default]
    Hierarchical,
    /// Greedy one-to-one assignment, strongest pairs first
    OneToOne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Consistency threshold as a fraction of the match threshold
    pub consistency_ratio: f64,
    pub mode: ClusterMode,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            consistency_ratio: 0.5,
            mode: ClusterMode::Hierarchical,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.consistency_ratio) {
            return Err(Error::configuration(format!(
                "consistency_ratio must be within [0, 1], got {}",
                self.consistency_ratio
            )));
        }
        Ok(())
    }
}

/// A set of records believed to denote one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cluster(BTreeSet<RecordId>);

impl Cluster {
    #[inline]
    #[must_use]
    pub fn singleton(id: RecordId) -> Self {
        Self(BTreeSet::from([id]))
    }

    #[inline]
    pub fn members(&self) -> &BTreeSet<RecordId> {
        &self.0
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RecordId> {
        self.0.iter()
    }

    #[inline]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.0.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.0.len() == 1
    }

    /// Smallest member; clusters are ordered by it.
    #[inline]
    pub fn first(&self) -> Option<&RecordId> {
        self.0.iter().next()
    }
}

impl FromIterator<RecordId> for Cluster {
    fn from_iter<T: IntoIterator<Item = RecordId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One clustering run: every record of the universe in exactly one cluster.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    clusters: Vec<Cluster>,
    index: AHashMap<RecordId, usize>,
}

impl Partition {
    fn new(mut clusters: Vec<Cluster>) -> Self {
        clusters.retain(|c| !c.is_empty());
        clusters.sort_by(|a, b| a.first().cmp(&b.first()));
        let index = clusters
            .iter()
            .enumerate()
            .flat_map(|(i, c)| c.iter().map(move |id| (id.clone(), i)))
            .collect();
        Self { clusters, index }
    }

    #[inline]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Cluster> {
        self.clusters.iter()
    }

    pub fn cluster_of(&self, id: &RecordId) -> Option<&Cluster> {
        self.index.get(id).map(|&i| &self.clusters[i])
    }

    /// Whether two records ended up in the same cluster.
    pub fn same_cluster(&self, a: &RecordId, b: &RecordId) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Clusters with more than one member.
    pub fn non_singletons(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| !c.is_singleton())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of records covered.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.index.len()
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.clusters == other.clusters
    }
}

impl<'a> IntoIterator for &'a Partition {
    type Item = &'a Cluster;
    type IntoIter = std::slice::Iter<'a, Cluster>;

    fn into_iter(self) -> Self::IntoIter {
        self.clusters.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: ClusterConfig,
}

impl Clusterer {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Partition `universe` (plus every record named by a scored pair)
    /// using the pairs scoring at or above `threshold`.
    ///
    /// Scoring is not repeated, so the same scored pairs can be clustered
    /// again under a different threshold.
    pub fn cluster(
        &self,
        scored: &ScoredPairs,
        universe: impl IntoIterator<Item = RecordId>,
        threshold: f64,
    ) -> Partition {
        let mut nodes: BTreeSet<RecordId> = universe.into_iter().collect();
        for sp in scored {
            nodes.insert(sp.pair.left.clone());
            nodes.insert(sp.pair.right.clone());
        }
        let nodes: Vec<RecordId> = nodes.into_iter().collect();
        let position: AHashMap<&RecordId, usize> =
            nodes.iter().enumerate().map(|(i, id)| (id, i)).collect();

        // Strongest score per unordered node pair, self-pairs dropped.
        let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for sp in scored {
            if !sp.score.is_finite() || sp.pair.is_self_pair() {
                continue;
            }
            let (a, b) = (position[&sp.pair.left], position[&sp.pair.right]);
            let key = (a.min(b), a.max(b));
            let entry = edges.entry(key).or_insert(sp.score);
            if sp.score > *entry {
                *entry = sp.score;
            }
        }

        let groups = match self.config.mode {
            ClusterMode::Hierarchical => self.hierarchical(nodes.len(), &edges, threshold),
            ClusterMode::OneToOne => one_to_one(scored, &position, threshold),
        };

        let mut assigned = vec![false; nodes.len()];
        let mut clusters: Vec<Cluster> = Vec::with_capacity(nodes.len());
        for group in groups {
            for &i in &group {
                assigned[i] = true;
            }
            clusters.push(group.into_iter().map(|i| nodes[i].clone()).collect());
        }
        for (i, id) in nodes.iter().enumerate() {
            if !assigned[i] {
                clusters.push(Cluster::singleton(id.clone()));
            }
        }

        let partition = Partition::new(clusters);
        debug!(
            records = partition.record_count(),
            clusters = partition.len(),
            threshold,
            "clustering complete"
        );
        partition
    }

    fn hierarchical(
        &self,
        node_count: usize,
        edges: &BTreeMap<(usize, usize), f64>,
        threshold: f64,
    ) -> Vec<Vec<usize>> {
        let mut components = UnionFind::<usize>::new(node_count);
        for (&(a, b), &score) in edges {
            if score >= threshold {
                components.union(a, b);
            }
        }

        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, root) in components.into_labeling().into_iter().enumerate() {
            grouped.entry(root).or_default().push(node);
        }

        let consistency = threshold * self.config.consistency_ratio;
        let mut groups = Vec::new();
        for (_, members) in grouped {
            if members.len() <= 2 {
                groups.push(members);
            } else {
                groups.extend(average_linkage(&members, edges, threshold, consistency));
            }
        }
        groups
    }
}

/// Agglomerative merging within one component.
///
/// Slot `s` always holds local member `s` as its smallest member, so
/// scanning slots in order breaks linkage ties toward smaller record ids.
fn average_linkage(
    members: &[usize],
    edges: &BTreeMap<(usize, usize), f64>,
    threshold: f64,
    consistency: f64,
) -> Vec<Vec<usize>> {
    let k = members.len();
    let local: AHashMap<usize, usize> = members.iter().enumerate().map(|(l, &g)| (g, l)).collect();

    let mut sum = vec![vec![0.0_f64; k]; k];
    let mut count = vec![vec![0_u32; k]; k];
    let mut weakest = vec![vec![f64::INFINITY; k]; k];
    for (&(a, b), &score) in edges {
        if let (Some(&i), Some(&j)) = (local.get(&a), local.get(&b)) {
            sum[i][j] = score;
            sum[j][i] = score;
            count[i][j] = 1;
            count[j][i] = 1;
            weakest[i][j] = score;
            weakest[j][i] = score;
        }
    }

    let mut slots: Vec<Option<Vec<usize>>> = (0..k).map(|i| Some(vec![i])).collect();
    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..k {
            if slots[i].is_none() {
                continue;
            }
            for j in (i + 1)..k {
                if slots[j].is_none() || count[i][j] == 0 {
                    continue;
                }
                let linkage = sum[i][j] / f64::from(count[i][j]);
                if linkage < threshold || weakest[i][j] < consistency {
                    continue;
                }
                if best.map_or(true, |(_, _, b)| linkage > b) {
                    best = Some((i, j, linkage));
                }
            }
        }

        let Some((i, j, _)) = best else { break };
        let absorbed = slots[j].take().unwrap_or_default();
        if let Some(into) = slots[i].as_mut() {
            into.extend(absorbed);
        }
        for other in 0..k {
            if other == i || other == j || slots[other].is_none() {
                continue;
            }
            sum[i][other] += sum[j][other];
            sum[other][i] = sum[i][other];
            count[i][other] += count[j][other];
            count[other][i] = count[i][other];
            weakest[i][other] = weakest[i][other].min(weakest[j][other]);
            weakest[other][i] = weakest[i][other];
        }
    }

    slots
        .into_iter()
        .flatten()
        .map(|group| group.into_iter().map(|l| members[l]).collect())
        .collect()
}

/// Greedy one-to-one matching: descending score, ties by pair order.
fn one_to_one(
    scored: &ScoredPairs,
    position: &AHashMap<&RecordId, usize>,
    threshold: f64,
) -> Vec<Vec<usize>> {
    let mut ranked: Vec<(&RecordPair, f64)> = scored
        .iter()
        .filter(|sp| sp.score.is_finite() && sp.score >= threshold && !sp.pair.is_self_pair())
        .map(|sp| (&sp.pair, sp.score))
        .collect();
    ranked.sort_by(|a, b| {
        OrderedFloat(b.1)
            .cmp(&OrderedFloat(a.1))
            .then_with(|| a.0.cmp(b.0))
    });

    let mut matched = vec![false; position.len()];
    let mut groups = Vec::new();
    for (pair, _) in ranked {
        let (a, b) = (position[&pair.left], position[&pair.right]);
        if matched[a] || matched[b] {
            continue;
        }
        matched[a] = true;
        matched[b] = true;
        groups.push(vec![a, b]);
    }
    groups
}
