//! Labeling collaborators
//!
//! The trainer hands each query to a [`Labeler`] and blocks until it answers.
//! Humans sit behind a console implementation; tests and gold-standard runs
//! use the programmatic ones here.

use relink_core::{Label, Record, RecordPair};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Answer to a label query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelResponse {
    Match,
    Distinct,
    /// Unsure; the pair is dropped without a label
    Skip,
    /// Stop training and keep every label given so far
    Finished,
}

impl LabelResponse {
    /// The pool label this response records, if any.
    pub fn label(self) -> Option<Label> {
        match self {
            LabelResponse::Match => Some(Label::Match),
            LabelResponse::Distinct => Some(Label::Distinct),
            LabelResponse::Skip | LabelResponse::Finished => None,
        }
    }
}

impl From<Label> for LabelResponse {
    fn from(label: Label) -> Self {
        match label {
            Label::Match => LabelResponse::Match,
            Label::Distinct => LabelResponse::Distinct,
        }
    }
}

/// Everything a labeler needs to judge one pair
#[derive(Debug, Clone, Copy)]
pub struct LabelQuery<'a> {
    pub pair: &'a RecordPair,
    pub left: &'a Record,
    pub right: &'a Record,
    /// Compared fields, in schema order
    pub fields: &'a [String],
    /// Current model score, absent before the first fit
    pub score: Option<f64>,
    pub labeled_matches: usize,
    pub labeled_distinct: usize,
    /// Unlabeled pairs left in the working sample
    pub remaining: usize,
}

pub trait Labeler {
    fn label(&mut self, query: &LabelQuery<'_>) -> LabelResponse;
}

/// Labeler backed by a closure, e.g. a ground-truth lookup.
pub struct OracleLabeler<F> {
    oracle: F,
    limit: Option<usize>,
    answered: usize,
}

impl<F> OracleLabeler<F>
where
    F: FnMut(&LabelQuery<'_>) -> LabelResponse,
{
    #[inline]
    #[must_use]
    pub fn new(oracle: F) -> Self {
        Self {
            oracle,
            limit: None,
            answered: 0,
        }
    }

    /// Answer `Finished` once this many queries have been answered.
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    pub fn answered(&self) -> usize {
        self.answered
    }
}

impl<F> Labeler for OracleLabeler<F>
where
    F: FnMut(&LabelQuery<'_>) -> LabelResponse,
{
    fn label(&mut self, query: &LabelQuery<'_>) -> LabelResponse {
        if self.limit.is_some_and(|limit| self.answered >= limit) {
            return LabelResponse::Finished;
        }
        self.answered += 1;
        (self.oracle)(query)
    }
}

/// Replays a fixed queue of responses, then answers `Finished`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLabeler {
    responses: VecDeque<LabelResponse>,
    asked: Vec<RecordPair>,
}

impl ScriptedLabeler {
    pub fn new(responses: impl IntoIterator<Item = LabelResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Pairs queried so far, in order.
    pub fn asked(&self) -> &[RecordPair] {
        &self.asked
    }
}

impl Labeler for ScriptedLabeler {
    fn label(&mut self, query: &LabelQuery<'_>) -> LabelResponse {
        self.asked.push(query.pair.clone());
        self.responses.pop_front().unwrap_or(LabelResponse::Finished)
    }
}
