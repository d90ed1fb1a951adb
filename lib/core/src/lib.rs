//! # relink Core
//!
//! Core data model and learning algorithms for the relink record-linkage
//! engine.
//!
//! - [`Record`] / [`Dataset`] - ingested records from one or two collections
//! - [`RecordPair`] / [`TrainingPool`] - candidate and labeled pairs
//! - [`FeatureVector`] - per-field similarities with a missing mask
//! - [`Classifier`] - regularized logistic regression over feature vectors
//! - [`ThresholdOptimizer`] - recall-weighted F-measure threshold sweep
//! - [`Clusterer`] - scored pairs to an entity [`Partition`]
//!
//! ## Example
//!
//! ```rust
//! use relink_core::{Classifier, ClassifierConfig, FeatureVector, Label};
//!
//! let examples = vec![
//!     (FeatureVector::dense(vec![1.0]), Label::Match),
//!     (FeatureVector::dense(vec![0.0]), Label::Distinct),
//! ];
//! let config = ClassifierConfig {
//!     min_examples_per_class: 1,
//!     ..ClassifierConfig::default()
//! };
//! let model = Classifier::fit(&examples, &config).unwrap();
//! assert!(model.score(&FeatureVector::dense(vec![1.0])) > 0.5);
//! ```

pub mod classifier;
pub mod cluster;
pub mod dataset;
pub mod error;
pub mod feature;
pub mod pair;
pub mod record;
pub mod threshold;

pub use classifier::{Classifier, ClassifierConfig};
pub use cluster::{Cluster, ClusterConfig, ClusterMode, Clusterer, Partition};
pub use dataset::{Dataset, DatasetKind};
pub use error::{Error, Result};
pub use feature::{FeatureVector, MISSING_SENTINEL};
pub use pair::{Label, RecordPair, ScoredPair, ScoredPairs, TrainingPool};
pub use record::{FieldValue, Record, RecordId, RecordKey, Source};
pub use threshold::{ThresholdChoice, ThresholdOptimizer};
