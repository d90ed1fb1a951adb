//! # relink
//!
//! Record linkage and deduplication for in-memory collections of structured
//! records.
//!
//! relink learns what "the same entity" means from a handful of labeled
//! pairs, learns cheap blocking rules so it never compares everything with
//! everything, picks a score threshold for a chosen precision/recall
//! trade-off, and resolves pairwise scores into entity clusters.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! relink --left shop_a.json --right shop_b.json --fields fields.json \
//!        --training training.json --settings settings.bin --interactive -v
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use relink::prelude::*;
//!
//! let titled = |k: &str, t: &str| Record::new(k).with_field("title", t);
//! let data = Dataset::link(
//!     vec![titled("a1", "foo"), titled("a2", "bar"), titled("a3", "qux")],
//!     vec![titled("b1", "foo"), titled("b2", "baz"), titled("b3", "zzz")],
//! )?;
//!
//! let schema = SimilaritySchema::new(vec![
//!     FieldSpec::string("title").with_distance(DistanceType::Exact),
//! ])?;
//! let mut config = LinkerConfig::default();
//! config.classifier.min_examples_per_class = 1;
//!
//! let mut seeds = TrainingPool::new();
//! seeds.insert(RecordPair::new(RecordId::left("a1"), RecordId::right("b1")), Label::Match);
//! seeds.insert(RecordPair::new(RecordId::left("a2"), RecordId::right("b2")), Label::Distinct);
//!
//! let linker = Linker::new(schema, config)?;
//! let partition = linker.fit(&data, &seeds)?.into_static()?.match_records(&data)?;
//! assert!(partition.same_cluster(&RecordId::left("a1"), &RecordId::right("b1")));
//! assert_eq!(partition.len(), 5);
//! # Ok::<(), relink::Error>(())
//! ```
//!
//! ## Crate Structure
//!
//! - `relink-core` - records, pairs, classifier, threshold optimizer, clusterer
//! - `relink-similarity` - field schema, comparators, feature vectors, scoring
//! - `relink-blocking` - predicate catalogue, blocking learner, block index
//! - `relink-training` - working sample, active-learning session, labelers
//! - `relink-storage` - settings artifacts and training files

pub mod console;
pub mod pipeline;

pub use pipeline::{
    Linker, LinkerConfig, MatchRun, StaticLinker, ThresholdSelection, ThresholdSource, TrainedModel,
};

// Re-export core types
pub use relink_core::{
    Classifier, ClassifierConfig, Cluster, ClusterConfig, ClusterMode, Clusterer, Dataset,
    DatasetKind, Error, FeatureVector, FieldValue, Label, Partition, Record, RecordId, RecordKey,
    RecordPair, Result, ScoredPair, ScoredPairs, Source, ThresholdChoice, ThresholdOptimizer,
    TrainingPool,
};

pub use relink_similarity::{
    CustomComparator, DistanceType, ExplainedPair, FeatureBuilder, FieldSpec, FieldType,
    PairwiseScorer, ScoreStats, SimilaritySchema,
};

pub use relink_blocking::{
    BlockIndex, BlockingConfig, BlockingDegenerateWarning, BlockingLearner, BlockingOutcome,
    Predicate, PredicateKind, PredicateSet, SimplePredicate,
};

pub use relink_training::{
    training_pairs_from_identifier, LabelQuery, LabelResponse, Labeler, OracleLabeler,
    ScriptedLabeler, Trainer, TrainerState, TrainingSession, WorkingSample,
};

pub use relink_storage::{load_settings, load_training, save_settings, save_training, Settings};

pub use console::ConsoleLabeler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ClassifierConfig, ClusterMode, ConsoleLabeler, Dataset, DistanceType, Error, FieldSpec,
        Label, LabelResponse, Labeler, Linker, LinkerConfig, Partition, Record, RecordId,
        RecordPair, Result, SimilaritySchema, StaticLinker, TrainingPool,
    };
}
