//! Blocking predicate learner
//!
//! Greedy weighted set cover: every known match pair should share a block
//! under at least one selected predicate, while the number of candidate
//! pairs the predicates generate stays small. This is a heuristic and does
//! not guarantee the cheapest cover.

use crate::index::{blocks, estimated_pairs};
use crate::predicate::{catalogue, Predicate, PredicateSet, SimplePredicate};
use rayon::prelude::*;
use relink_core::{Dataset, Error, Record, Result, TrainingPool};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    /// A predicate is acceptable when its cost is at most this share of all pairs
    pub max_cost_ratio: f64,
    /// Also try conjunctions of two simple predicates on different fields
    pub compound_predicates: bool,
    /// Simple predicates considered as compound components
    pub compound_candidates: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            max_cost_ratio: 0.25,
            compound_predicates: true,
            compound_candidates: 8,
        }
    }
}

impl BlockingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_cost_ratio > 0.0 && self.max_cost_ratio <= 1.0) {
            return Err(Error::configuration(format!(
                "max_cost_ratio must be within (0, 1], got {}",
                self.max_cost_ratio
            )));
        }
        Ok(())
    }
}

/// Why the learner fell back to the full cross product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateReason {
    /// The training pool holds no usable match pairs
    NoMatches,
    /// Every predicate covering a match was too expensive
    NoAcceptablePredicate,
    /// The predicate budget ran out with matches still uncovered
    IncompleteCoverage,
}

/// Blocking degraded to comparing every pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingDegenerateWarning {
    pub reason: DegenerateReason,
    /// Match pairs no acceptable predicate set covered
    pub uncovered: usize,
    /// Candidate pairs the fallback will generate
    pub estimated_pairs: u64,
}

impl std::fmt::Display for BlockingDegenerateWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            DegenerateReason::NoMatches => "no labeled matches to learn from",
            DegenerateReason::NoAcceptablePredicate => "no predicate met the cost target",
            DegenerateReason::IncompleteCoverage => "predicate budget exhausted before covering every match",
        };
        write!(
            f,
            "blocking fell back to the full cross product ({}): {} match pair(s) uncovered, {} candidate pairs",
            reason, self.uncovered, self.estimated_pairs
        )
    }
}

/// Result of a learning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingOutcome {
    pub predicates: PredicateSet,
    /// Share of match pairs the predicates cover
    pub coverage: f64,
    /// Upper bound on the candidate pairs the predicates generate
    pub estimated_pairs: u64,
    pub warning: Option<BlockingDegenerateWarning>,
}

impl BlockingOutcome {
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.warning.is_some()
    }
}

/// One predicate scored against the match pairs
#[derive(Debug)]
struct Evaluation {
    predicate: Predicate,
    covered: Vec<bool>,
    cost: u64,
}

impl Evaluation {
    fn coverage(&self) -> usize {
        self.covered.iter().filter(|&&c| c).count()
    }
}

#[derive(Debug, Clone)]
pub struct BlockingLearner {
    config: BlockingConfig,
    max_predicates: usize,
}

impl BlockingLearner {
    pub fn new(config: BlockingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            max_predicates: 8,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_max_predicates(mut self, max_predicates: usize) -> Self {
        self.max_predicates = max_predicates;
        self
    }

    /// Learn a predicate set over `fields` from the pool's match pairs.
    ///
    /// Never fails: when no acceptable cover exists the outcome carries a
    /// [`BlockingDegenerateWarning`] and [`PredicateSet::always_true`].
    pub fn learn<'a>(
        &self,
        data: &Dataset,
        pool: &TrainingPool,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> BlockingOutcome {
        let matches: Vec<(&Record, &Record)> = pool
            .matches()
            .iter()
            .filter_map(|pair| match (data.get(&pair.left), data.get(&pair.right)) {
                (Some(l), Some(r)) => Some((l, r)),
                _ => {
                    warn!(pair = %pair, "labeled match not in dataset, ignored for blocking");
                    None
                }
            })
            .collect();
        if matches.is_empty() {
            return self.degenerate(data, DegenerateReason::NoMatches, 0);
        }

        let simple = catalogue(fields);
        let mut evaluations: Vec<Evaluation> = simple
            .par_iter()
            .map(|p| evaluate(Predicate::Simple(p.clone()), data, &matches))
            .collect();

        if self.config.compound_predicates {
            let compounds = self.compound_candidates(&evaluations);
            let extra: Vec<Evaluation> = compounds
                .into_par_iter()
                .map(|(a, b)| evaluate(Predicate::Compound(a, b), data, &matches))
                .collect();
            evaluations.extend(extra);
        }

        let budget = self.config.max_cost_ratio * data.total_pairs() as f64;
        let acceptable: Vec<&Evaluation> = evaluations
            .iter()
            .filter(|e| e.coverage() > 0 && e.cost as f64 <= budget)
            .collect();
        debug!(
            evaluated = evaluations.len(),
            acceptable = acceptable.len(),
            budget,
            "predicates evaluated"
        );
        if acceptable.is_empty() {
            return self.degenerate(data, DegenerateReason::NoAcceptablePredicate, matches.len());
        }

        let mut uncovered = vec![true; matches.len()];
        let mut selected: Vec<&Evaluation> = Vec::new();
        while selected.len() < self.max_predicates && uncovered.iter().any(|&u| u) {
            let mut best: Option<(&Evaluation, f64)> = None;
            for &candidate in &acceptable {
                let gain = candidate
                    .covered
                    .iter()
                    .zip(&uncovered)
                    .filter(|&(&c, &u)| c && u)
                    .count();
                if gain == 0 {
                    continue;
                }
                let score = gain as f64 / candidate.cost.max(1) as f64;
                let better = match best {
                    None => true,
                    Some((current, best_score)) => {
                        score > best_score || (score == best_score && candidate.cost < current.cost)
                    }
                };
                if better {
                    best = Some((candidate, score));
                }
            }

            let Some((chosen, _)) = best else { break };
            for (u, &c) in uncovered.iter_mut().zip(&chosen.covered) {
                if c {
                    *u = false;
                }
            }
            debug!(predicate = %chosen.predicate, cost = chosen.cost, "predicate selected");
            selected.push(chosen);
        }

        let remaining = uncovered.iter().filter(|&&u| u).count();
        if remaining > 0 {
            return self.degenerate(data, DegenerateReason::IncompleteCoverage, remaining);
        }

        let estimated: u64 = selected.iter().map(|e| e.cost).sum();
        let predicates = PredicateSet::new(selected.iter().map(|e| e.predicate.clone()).collect());
        info!(
            predicates = %predicates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            estimated_pairs = estimated,
            total_pairs = data.total_pairs(),
            "blocking predicates learned"
        );
        BlockingOutcome {
            predicates,
            coverage: 1.0,
            estimated_pairs: estimated,
            warning: None,
        }
    }

    /// Pairs of simple predicates on different fields to try as conjunctions.
    ///
    /// Components are the best-covering simple predicates (coverage, then
    /// cost, then catalogue order), taken round-robin across fields.
    fn compound_candidates(&self, evaluations: &[Evaluation]) -> Vec<(SimplePredicate, SimplePredicate)> {
        let mut ranked: Vec<(&SimplePredicate, usize, u64)> = evaluations
            .iter()
            .filter_map(|e| match &e.predicate {
                Predicate::Simple(p) if e.coverage() > 0 => Some((p, e.coverage(), e.cost)),
                _ => None,
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut fields: Vec<&str> = Vec::new();
        for (p, _, _) in &ranked {
            if !fields.contains(&p.field.as_str()) {
                fields.push(&p.field);
            }
        }
        if fields.len() < 2 {
            return Vec::new();
        }

        let mut per_field: Vec<std::collections::VecDeque<&SimplePredicate>> = fields
            .iter()
            .map(|f| ranked.iter().filter(|(p, _, _)| p.field == *f).map(|(p, _, _)| *p).collect())
            .collect();
        let mut chosen: Vec<&SimplePredicate> = Vec::new();
        while chosen.len() < self.config.compound_candidates && per_field.iter().any(|q| !q.is_empty()) {
            for queue in per_field.iter_mut() {
                if chosen.len() >= self.config.compound_candidates {
                    break;
                }
                if let Some(p) = queue.pop_front() {
                    chosen.push(p);
                }
            }
        }

        let mut compounds = Vec::new();
        for (i, a) in chosen.iter().enumerate() {
            for b in &chosen[i + 1..] {
                if a.field != b.field {
                    compounds.push(((*a).clone(), (*b).clone()));
                }
            }
        }
        compounds
    }

    fn degenerate(&self, data: &Dataset, reason: DegenerateReason, uncovered: usize) -> BlockingOutcome {
        let warning = BlockingDegenerateWarning {
            reason,
            uncovered,
            estimated_pairs: data.total_pairs(),
        };
        warn!("{}", warning);
        BlockingOutcome {
            predicates: PredicateSet::always_true(),
            coverage: 1.0,
            estimated_pairs: data.total_pairs(),
            warning: Some(warning),
        }
    }
}

impl Default for BlockingLearner {
    fn default() -> Self {
        Self {
            config: BlockingConfig::default(),
            max_predicates: 8,
        }
    }
}

fn evaluate(predicate: Predicate, data: &Dataset, matches: &[(&Record, &Record)]) -> Evaluation {
    let cost = estimated_pairs(&blocks(&predicate, data), data.kind());
    let covered = matches
        .iter()
        .map(|(l, r)| {
            let right = predicate.keys(r);
            predicate.keys(l).iter().any(|k| right.binary_search(k).is_ok())
        })
        .collect();
    Evaluation {
        predicate,
        covered,
        cost,
    }
}
