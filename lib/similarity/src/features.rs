//! Pair feature builder

use crate::comparator::ComparatorRegistry;
use crate::schema::SimilaritySchema;
use rayon::prelude::*;
use relink_core::{Dataset, FeatureVector, Record, RecordPair, Result};
use std::sync::Arc;

/// Turns record pairs into feature vectors, one slot per configured field.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    registry: Arc<ComparatorRegistry>,
}

impl FeatureBuilder {
    pub fn new(schema: &SimilaritySchema) -> Self {
        Self::from_registry(Arc::new(ComparatorRegistry::new(schema)))
    }

    pub fn from_registry(registry: Arc<ComparatorRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &ComparatorRegistry {
        &self.registry
    }

    /// Number of slots in every vector this builder produces.
    #[inline]
    pub fn arity(&self) -> usize {
        self.registry.len()
    }

    pub fn build(&self, left: &Record, right: &Record) -> FeatureVector {
        FeatureVector::from_similarities(
            self.registry
                .iter()
                .map(|(field, comparator)| comparator.compare(left.get(field), right.get(field))),
        )
    }

    pub fn build_pair(&self, data: &Dataset, pair: &RecordPair) -> Result<FeatureVector> {
        Ok(self.build(data.require(&pair.left)?, data.require(&pair.right)?))
    }

    /// Build vectors for many pairs in parallel, keeping input order.
    pub fn build_many(&self, data: &Dataset, pairs: &[RecordPair]) -> Result<Vec<FeatureVector>> {
        pairs.par_iter().map(|pair| self.build_pair(data, pair)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DistanceType, FieldSpec};
    use relink_core::{FieldValue, RecordId};

    fn builder() -> FeatureBuilder {
        let schema = SimilaritySchema::new(vec![
            FieldSpec::string("title").with_distance(DistanceType::Exact),
            FieldSpec::categorical("brand").allow_missing(),
        ])
        .unwrap();
        FeatureBuilder::new(&schema)
    }

    #[test]
    fn test_vector_has_schema_arity() {
        let a = Record::new("1").with_field("title", "foo").with_field("brand", "x");
        let b = Record::new("2").with_field("title", "foo");
        let v = builder().build(&a, &b);
        assert_eq!(v.arity(), 2);
        assert_eq!(v.get(0), Some(1.0));
        assert!(v.is_missing(1));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let a = Record::new("1").with_field("title", "foo").with_field("noise", "zzz");
        let b = Record::new("2").with_field("title", "bar").with_field("brand", FieldValue::Missing);
        assert_eq!(builder().build(&a, &b).arity(), 2);
    }

    #[test]
    fn test_build_many_keeps_order() {
        let data = Dataset::dedup(vec![
            Record::new("1").with_field("title", "foo"),
            Record::new("2").with_field("title", "foo"),
            Record::new("3").with_field("title", "bar"),
        ])
        .unwrap();
        let pairs = vec![
            RecordPair::new(RecordId::left("1"), RecordId::left("3")),
            RecordPair::new(RecordId::left("1"), RecordId::left("2")),
        ];
        let vectors = builder().build_many(&data, &pairs).unwrap();
        assert_eq!(vectors[0].get(0), Some(0.0));
        assert_eq!(vectors[1].get(0), Some(1.0));
    }

    #[test]
    fn test_unknown_record_is_an_error() {
        let data = Dataset::dedup(vec![Record::new("1").with_field("title", "foo")]).unwrap();
        let pair = RecordPair::new(RecordId::left("1"), RecordId::left("9"));
        assert!(builder().build_pair(&data, &pair).is_err());
    }
}
