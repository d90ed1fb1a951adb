//! # relink Training
//!
//! Active learning for the match classifier.
//!
//! - [`WorkingSample`] - a bounded, seeded random sample of unlabeled pairs
//! - [`TrainingSession`] - the labeling state machine over that sample
//! - [`Labeler`] - whoever answers the queries: a person at a console, a
//!   ground-truth oracle, or a scripted queue in tests
//! - [`training_pairs_from_identifier`] - seed pairs from a shared id column
//!
//! ## Example
//!
//! ```rust
//! use relink_core::{ClassifierConfig, Dataset, Record};
//! use relink_similarity::{FeatureBuilder, FieldSpec, SimilaritySchema};
//! use relink_training::{
//!     LabelQuery, LabelResponse, OracleLabeler, Trainer, TrainingSession, WorkingSample,
//! };
//!
//! let titled = |k: &str, t: &str| Record::new(k).with_field("title", t);
//! let data = Dataset::link(
//!     vec![titled("a1", "foo"), titled("a2", "bar")],
//!     vec![titled("b1", "foo"), titled("b2", "baz")],
//! )
//! .unwrap();
//! let schema = SimilaritySchema::new(vec![FieldSpec::string("title")]).unwrap();
//!
//! let config = ClassifierConfig { min_examples_per_class: 1, ..Default::default() };
//! let sample = WorkingSample::draw(&data, 100, 42);
//! let session = TrainingSession::new(&data, FeatureBuilder::new(&schema), sample, config).unwrap();
//!
//! let mut oracle = OracleLabeler::new(|q: &LabelQuery<'_>| {
//!     if q.left.get("title") == q.right.get("title") {
//!         LabelResponse::Match
//!     } else {
//!         LabelResponse::Distinct
//!     }
//! });
//! let session = Trainer::train(session, &mut oracle).unwrap();
//! let classifier = session.finish().unwrap();
//! assert_eq!(classifier.arity(), 1);
//! ```

pub mod identifier;
pub mod labeler;
pub mod sample;
pub mod trainer;

pub use identifier::training_pairs_from_identifier;
pub use labeler::{LabelQuery, LabelResponse, Labeler, OracleLabeler, ScriptedLabeler};
pub use sample::WorkingSample;
pub use trainer::{Trainer, TrainerState, TrainingSession};
