//! # relink Blocking
//!
//! Learned blocking for record linkage.
//!
//! Comparing every record against every other record is quadratic. Blocking
//! groups records by cheap keys (a prefix, a shared token, a numeric bucket)
//! so only records sharing a key are scored in full.
//!
//! - [`Predicate`] / [`PredicateSet`] - record to block-keys rules
//! - [`BlockingLearner`] - greedy set cover over the predicate catalogue,
//!   driven by labeled match pairs
//! - [`BlockIndex`] - block-key to records, and the candidate pairs it yields
//!
//! ## Example
//!
//! ```rust
//! use relink_blocking::{BlockIndex, BlockingLearner};
//! use relink_core::{Dataset, Label, Record, RecordId, RecordPair, TrainingPool};
//!
//! let titled = |k: &str, t: &str| Record::new(k).with_field("title", t);
//! let data = Dataset::link(
//!     vec![titled("a1", "foo"), titled("a2", "bar"), titled("a3", "qux")],
//!     vec![titled("b1", "foo"), titled("b2", "baz"), titled("b3", "zzz")],
//! )
//! .unwrap();
//!
//! let mut pool = TrainingPool::new();
//! pool.insert(RecordPair::new(RecordId::left("a1"), RecordId::right("b1")), Label::Match);
//!
//! let outcome = BlockingLearner::default().learn(&data, &pool, ["title"]);
//! let candidates = BlockIndex::build(&outcome.predicates, &data).candidate_pairs();
//! assert_eq!(candidates, vec![RecordPair::new(RecordId::left("a1"), RecordId::right("b1"))]);
//! ```

pub mod index;
pub mod learner;
pub mod predicate;

pub use index::{Block, BlockIndex};
pub use learner::{BlockingConfig, BlockingDegenerateWarning, BlockingLearner, BlockingOutcome, DegenerateReason};
pub use predicate::{catalogue, BlockKeys, Predicate, PredicateKind, PredicateSet, SimplePredicate};
