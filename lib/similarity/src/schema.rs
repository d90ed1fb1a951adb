//! Field specification schema
//!
//! Declares the fields the engine compares, how each one is compared and
//! whether it may be missing. The schema is fixed at configuration time and
//! fixes the arity of every feature vector.

use crate::distance::{log_ratio_distance, relative_number_similarity};
use relink_core::FieldValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;

/// Signature shared by every comparator: `None` means undefined.
pub type CompareFn = dyn Fn(&FieldValue, &FieldValue) -> Option<f64> + Send + Sync;

/// Field type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text compared by edit distance (or another string metric)
    String,
    /// Closed vocabulary compared by exact match
    Categorical,
    /// Compared by a user-supplied function
    Custom,
}

/// Similarity metric for string and categorical fields
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DistanceType {
    /// Normalized Levenshtein similarity
    Levenshtein,
    /// Jaccard similarity over padded character trigrams
    Trigram,
    /// Jaccard similarity over whitespace tokens
    Overlap,
    /// 1 if equal (case-insensitive), 0 otherwise
    Exact,
}

impl FieldType {
    /// Metric used when a field does not name one.
    pub fn default_distance(self) -> Option<DistanceType> {
        match self {
            FieldType::String => Some(DistanceType::Levenshtein),
            FieldType::Categorical => Some(DistanceType::Exact),
            FieldType::Custom => None,
        }
    }

    fn accepts(self, distance: DistanceType) -> bool {
        match self {
            FieldType::String => true,
            FieldType::Categorical => distance == DistanceType::Exact,
            FieldType::Custom => false,
        }
    }
}

/// A named user-supplied comparator.
///
/// Serializes as its name. Only the built-in helpers (`log_ratio`,
/// `relative_number`) can be restored from a name; other closures have to be
/// attached in code.
#[derive(Clone)]
pub struct CustomComparator {
    name: String,
    func: Arc<CompareFn>,
}

impl CustomComparator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&FieldValue, &FieldValue) -> Option<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Look up a built-in comparator by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "log_ratio" => Some(Self::new(name, |a, b| {
                log_ratio_distance(a.as_number()?, b.as_number()?)
            })),
            "relative_number" => Some(Self::new(name, |a, b| {
                Some(relative_number_similarity(a.as_number()?, b.as_number()?))
            })),
            _ => None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn compare(&self, a: &FieldValue, b: &FieldValue) -> Option<f64> {
        (self.func)(a, b)
    }
}

impl std::fmt::Debug for CustomComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomComparator").field("name", &self.name).finish()
    }
}

impl Serialize for CustomComparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for CustomComparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::builtin(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown comparator '{}'", name)))
    }
}

/// Declaration of a single compared field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Metric override; the field type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<DistanceType>,

    #[serde(default)]
    pub allow_missing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<CustomComparator>,
}

impl FieldSpec {
    /// Create a string field compared by normalized Levenshtein similarity
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::String,
            distance: None,
            allow_missing: false,
            comparator: None,
        }
    }

    /// Create a categorical field compared by exact match
    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            field_type: FieldType::Categorical,
            ..Self::string(name)
        }
    }

    /// Create a custom field
    pub fn custom(name: impl Into<String>, comparator: CustomComparator) -> Self {
        Self {
            field_type: FieldType::Custom,
            comparator: Some(comparator),
            ..Self::string(name)
        }
    }

    #[inline]
    #[must_use]
    pub fn with_distance(mut self, distance: DistanceType) -> Self {
        self.distance = Some(distance);
        self
    }

    #[inline]
    #[must_use]
    pub fn allow_missing(mut self) -> Self {
        self.allow_missing = true;
        self
    }

    /// Metric actually applied to this field.
    pub fn effective_distance(&self) -> Option<DistanceType> {
        self.distance.or_else(|| self.field_type.default_distance())
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::UnnamedField);
        }
        match (self.field_type, &self.comparator) {
            (FieldType::Custom, None) => {
                return Err(SchemaError::MissingComparator(self.name.clone()));
            }
            (FieldType::String | FieldType::Categorical, Some(_)) => {
                return Err(SchemaError::UnexpectedComparator(self.name.clone()));
            }
            _ => {}
        }
        if let Some(distance) = self.distance {
            if !self.field_type.accepts(distance) {
                return Err(SchemaError::InvalidDistanceForType {
                    field: self.name.clone(),
                    field_type: self.field_type,
                    distance,
                });
            }
        }
        Ok(())
    }
}

/// Ordered, validated field specifications.
#[derive(Debug, Clone)]
pub struct SimilaritySchema {
    fields: Vec<FieldSpec>,
}

impl SimilaritySchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Parse a JSON array of field specifications.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let fields: Vec<FieldSpec> =
            serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        Self::new(fields)
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
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
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields every record must carry a value for.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| !f.allow_missing)
            .map(|f| f.name.as_str())
    }

    /// Canonical, closure-free description of the schema.
    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            fields: self
                .fields
                .iter()
                .map(|f| FieldDescriptor {
                    name: f.name.clone(),
                    field_type: f.field_type,
                    distance: f.effective_distance(),
                    allow_missing: f.allow_missing,
                    comparator: f.comparator.as_ref().map(|c| c.name().to_string()),
                })
                .collect(),
        }
    }
}

/// Serializable summary of a schema, stored with trained settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub distance: Option<DistanceType>,
    pub allow_missing: bool,
    pub comparator: Option<String>,
}

/// Errors that can occur during schema validation
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema cannot be empty")]
    EmptySchema,

    #[error("Field names cannot be blank")]
    UnnamedField,

    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Custom field '{0}' has no comparator")]
    MissingComparator(String),

    #[error("Field '{0}' is not custom but has a comparator")]
    UnexpectedComparator(String),

    #[error("Distance {distance:?} is not valid for {field_type:?} field '{field}'")]
    InvalidDistanceForType {
        field: String,
        field_type: FieldType,
        distance: DistanceType,
    },

    #[error("Malformed field specification: {0}")]
    Malformed(String),
}

impl From<SchemaError> for relink_core::Error {
    fn from(err: SchemaError) -> Self {
        relink_core::Error::Configuration(err.to_string())
    }
}
