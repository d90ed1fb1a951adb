//! # relink Similarity
//!
//! Schema-driven field comparison for record pairs.
//!
//! ## Features
//!
//! - **Field Schema**: Declares which fields are compared, how, and whether they may be missing
//! - **Comparator Registry**: One resolved comparator per field, in schema order
//! - **Feature Builder**: Record pair to feature vector, undefined slots tagged
//! - **Pairwise Scorer**: Feature vectors through a trained classifier, in parallel
//! - **Explainability**: Per-field contribution breakdown for a pair's score
//!
//! ## Example
//!
//! ```rust
//! use relink_similarity::{FeatureBuilder, FieldSpec, SimilaritySchema};
//! use relink_core::Record;
//!
//! let schema = SimilaritySchema::new(vec![
//!     FieldSpec::string("name"),
//!     FieldSpec::categorical("category").allow_missing(),
//! ])
//! .unwrap();
//!
//! let builder = FeatureBuilder::new(&schema);
//! let a = Record::new("1").with_field("name", "Prosciutto cotto");
//! let b = Record::new("2").with_field("name", "Prosciutto cotto").with_field("category", "salumi");
//! let vector = builder.build(&a, &b);
//! assert_eq!(vector.arity(), 2);
//! assert_eq!(vector.get(0), Some(1.0));
//! assert!(vector.is_missing(1));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Schema    │────>│ Comparators │────>│  Features   │
//! │  (fields)   │     │ (per field) │     │ (pair → v)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                      ┌─────────────┐           │
//!                      │   Scorer    │<──────────┘
//!                      │ (v → score) │
//!                      └─────────────┘
//!                             │
//!                      ┌─────────────┐
//!                      │  Explain    │
//!                      │  (per field)│
//!                      └─────────────┘
//! ```

pub mod comparator;
pub mod distance;
pub mod explain;
pub mod features;
pub mod schema;
pub mod scorer;

// Re-export main types for convenience
pub use comparator::{Comparator, ComparatorRegistry};
pub use explain::{ExplainedPair, FieldContribution, ScoreStats};
pub use features::FeatureBuilder;
pub use schema::{
    CompareFn,
    CustomComparator,
    DistanceType,
    FieldDescriptor,
    FieldSpec,
    FieldType,
    SchemaDescriptor,
    SchemaError,
    SimilaritySchema,
};
pub use scorer::PairwiseScorer;
