//! Pairwise scorer
//!
//! Applies the feature builder and a trained classifier to candidate pairs.
//! Both are shared read-only, so scoring fans out across pairs with rayon.

use crate::explain::{ExplainedPair, FieldContribution};
use crate::features::FeatureBuilder;
use rayon::prelude::*;
use relink_core::{Classifier, Dataset, Error, RecordPair, Result, ScoredPair, ScoredPairs};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PairwiseScorer {
    features: FeatureBuilder,
    classifier: Arc<Classifier>,
}

impl PairwiseScorer {
    /// Pair a feature builder with a model of the same arity.
    pub fn new(features: FeatureBuilder, classifier: Arc<Classifier>) -> Result<Self> {
        if features.arity() != classifier.arity() {
            return Err(Error::configuration(format!(
                "model expects {} fields but the schema has {}",
                classifier.arity(),
                features.arity()
            )));
        }
        Ok(Self { features, classifier })
    }

    #[inline]
    pub fn features(&self) -> &FeatureBuilder {
        &self.features
    }

    #[inline]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn score_pair(&self, data: &Dataset, pair: &RecordPair) -> Result<f64> {
        Ok(self.classifier.score(&self.features.build_pair(data, pair)?))
    }

    /// Score every candidate pair, keeping candidate order.
    pub fn score(&self, data: &Dataset, candidates: &[RecordPair]) -> Result<ScoredPairs> {
        let scored: Vec<ScoredPair> = candidates
            .par_iter()
            .map(|pair| {
                Ok(ScoredPair {
                    pair: pair.clone(),
                    score: self.score_pair(data, pair)?,
                })
            })
            .collect::<Result<_>>()?;
        debug!(pairs = scored.len(), "scored candidate pairs");
        Ok(ScoredPairs::new(scored))
    }

    /// Per-field breakdown of one pair's score.
    pub fn explain(&self, data: &Dataset, pair: &RecordPair) -> Result<ExplainedPair> {
        let vector = self.features.build_pair(data, pair)?;
        let contributions = self.classifier.contributions(&vector);
        let fields = self
            .features
            .registry()
            .field_names()
            .zip(contributions)
            .enumerate()
            .map(|(i, (field, contribution))| FieldContribution {
                field: field.to_string(),
                similarity: vector.get(i),
                contribution,
            })
            .collect();

        Ok(ExplainedPair {
            pair: pair.clone(),
            score: self.classifier.score(&vector),
            bias: self.classifier.bias(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DistanceType, FieldSpec, SimilaritySchema};
    use relink_core::{Record, RecordId};

    fn setup() -> (Dataset, PairwiseScorer) {
        let schema = SimilaritySchema::new(vec![
            FieldSpec::string("title").with_distance(DistanceType::Exact),
            FieldSpec::string("color").allow_missing(),
        ])
        .unwrap();
        let classifier = Classifier::from_parts(vec![6.0, 1.0], vec![0.0, -0.5], -3.0, 0.01).unwrap();
        let scorer = PairwiseScorer::new(FeatureBuilder::new(&schema), Arc::new(classifier)).unwrap();
        let data = Dataset::link(
            vec![
                Record::new("a1").with_field("title", "foo").with_field("color", "red"),
                Record::new("a2").with_field("title", "bar"),
            ],
            vec![
                Record::new("b1").with_field("title", "foo").with_field("color", "red"),
                Record::new("b2").with_field("title", "baz"),
            ],
        )
        .unwrap();
        (data, scorer)
    }

    #[test]
    fn test_score_keeps_candidate_order() {
        let (data, scorer) = setup();
        let candidates = vec![
            RecordPair::new(RecordId::left("a2"), RecordId::right("b2")),
            RecordPair::new(RecordId::left("a1"), RecordId::right("b1")),
        ];
        let scored = scorer.score(&data, &candidates).unwrap();
        assert_eq!(scored.as_slice()[0].pair, candidates[0]);
        assert!(scored.as_slice()[0].score < 0.1);
        assert!(scored.as_slice()[1].score > 0.9);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let schema = SimilaritySchema::new(vec![FieldSpec::string("title")]).unwrap();
        let classifier = Classifier::from_parts(vec![1.0, 1.0], vec![0.0, 0.0], 0.0, 0.0).unwrap();
        assert!(PairwiseScorer::new(FeatureBuilder::new(&schema), Arc::new(classifier)).is_err());
    }

    #[test]
    fn test_explain_sums_to_linear_term() {
        let (data, scorer) = setup();
        let pair = RecordPair::new(RecordId::left("a2"), RecordId::right("b2"));
        let explained = scorer.explain(&data, &pair).unwrap();

        assert_eq!(explained.fields.len(), 2);
        assert_eq!(explained.fields[1].similarity, None);
        assert_eq!(explained.fields[1].contribution, -0.5);
        let linear = explained.bias + explained.fields.iter().map(|f| f.contribution).sum::<f64>();
        assert!((1.0 / (1.0 + (-linear).exp()) - explained.score).abs() < 1e-12);
    }
}
