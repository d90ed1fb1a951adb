//! Field comparator registry
//!
//! Each field specification is resolved once into a [`Comparator`]; the
//! registry keeps them in schema order so feature slot `i` always comes from
//! comparator `i`.

use crate::distance::{exact_similarity, text_similarity};
use crate::schema::{CustomComparator, DistanceType, FieldSpec, FieldType, SimilaritySchema};
use relink_core::FieldValue;

/// A resolved per-field comparison
#[derive(Debug, Clone)]
pub enum Comparator {
    Text(DistanceType),
    Categorical,
    Custom(CustomComparator),
}

impl Comparator {
    pub fn resolve(spec: &FieldSpec) -> Self {
        match (spec.field_type, &spec.comparator) {
            (FieldType::Custom, Some(custom)) => Comparator::Custom(custom.clone()),
            (FieldType::Categorical, _) => Comparator::Categorical,
            _ => Comparator::Text(spec.effective_distance().unwrap_or(DistanceType::Levenshtein)),
        }
    }

    /// Similarity of two values, `None` when undefined.
    ///
    /// Undefined whenever either side is missing or the comparator yields a
    /// non-finite number.
    pub fn compare(&self, a: &FieldValue, b: &FieldValue) -> Option<f64> {
        if a.is_missing() || b.is_missing() {
            return None;
        }
        let score = match self {
            Comparator::Text(distance) => text_similarity(&a.as_text()?, &b.as_text()?, *distance),
            Comparator::Categorical => exact_similarity(&a.as_text()?, &b.as_text()?),
            Comparator::Custom(custom) => custom.compare(a, b)?,
        };
        score.is_finite().then_some(score)
    }
}

/// Ordered comparators for every configured field
#[derive(Debug, Clone)]
pub struct ComparatorRegistry {
    fields: Vec<(String, Comparator)>,
}

impl ComparatorRegistry {
    pub fn new(schema: &SimilaritySchema) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|spec| (spec.name.clone(), Comparator::resolve(spec)))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Comparator)> {
        self.fields.iter().map(|(name, c)| (name.as_str(), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    #[test]
    fn test_missing_is_undefined() {
        let c = Comparator::resolve(&FieldSpec::string("title"));
        assert_eq!(c.compare(&FieldValue::Missing, &"foo".into()), None);
        assert_eq!(c.compare(&FieldValue::Missing, &FieldValue::Missing), None);
    }

    #[test]
    fn test_categorical_exact() {
        let c = Comparator::resolve(&FieldSpec::categorical("brand"));
        assert_eq!(c.compare(&"Acme".into(), &"ACME".into()), Some(1.0));
        assert_eq!(c.compare(&"Acme".into(), &"Other".into()), Some(0.0));
    }

    #[test]
    fn test_numbers_compare_as_text() {
        let c = Comparator::resolve(&FieldSpec::string("year").with_distance(DistanceType::Exact));
        assert_eq!(c.compare(&FieldValue::Number(1999.0), &"1999".into()), Some(1.0));
    }

    #[test]
    fn test_non_finite_custom_output_is_undefined() {
        let spec = FieldSpec::custom("x", CustomComparator::new("nan", |_, _| Some(f64::NAN)));
        let c = Comparator::resolve(&spec);
        assert_eq!(c.compare(&"a".into(), &"b".into()), None);
    }

    #[test]
    fn test_custom_receives_raw_values() {
        let spec = FieldSpec::custom(
            "price",
            CustomComparator::new("diff", |a, b| Some((a.as_number()? - b.as_number()?).abs())),
        );
        let c = Comparator::resolve(&spec);
        assert_eq!(c.compare(&FieldValue::Number(3.0), &"5".into()), Some(2.0));
    }

    #[test]
    fn test_registry_keeps_schema_order() {
        let schema = SimilaritySchema::new(vec![
            FieldSpec::string("b"),
            FieldSpec::categorical("a"),
        ])
        .unwrap();
        let registry = ComparatorRegistry::new(&schema);
        assert_eq!(registry.field_names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(matches!(registry.iter().nth(1), Some((_, Comparator::Categorical))));
    }
}
