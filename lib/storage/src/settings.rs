//! Trained settings artifact
//!
//! Everything a later run needs to skip training: the classifier, the
//! blocking predicates and the operating threshold, stamped with a
//! fingerprint of the schema they were trained against.

use crate::{persistence_error, write_atomic};
use anyhow::Context;
use chrono::{DateTime, Utc};
use relink_blocking::PredicateSet;
use relink_core::{Classifier, Error, Result};
use relink_similarity::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Bumped whenever the encoded layout changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub format_version: u32,
    pub schema: SchemaDescriptor,
    /// Hex SHA-256 of the JSON-encoded schema descriptor
    pub schema_fingerprint: String,
    pub classifier: Classifier,
    pub predicates: PredicateSet,
    pub threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Settings {
    pub fn new(
        schema: SchemaDescriptor,
        classifier: Classifier,
        predicates: PredicateSet,
        threshold: Option<f64>,
    ) -> Result<Self> {
        Ok(Self {
            format_version: FORMAT_VERSION,
            schema_fingerprint: schema_fingerprint(&schema)?,
            schema,
            classifier,
            predicates,
            threshold,
            created_at: Utc::now(),
        })
    }

    /// Check these settings were trained against `schema`.
    pub fn verify(&self, schema: &SchemaDescriptor) -> Result<()> {
        let expected = schema_fingerprint(schema)?;
        if self.schema_fingerprint != expected {
            return Err(Error::configuration(format!(
                "settings were trained against a different schema (fingerprint {} but the current schema is {})",
                short(&self.schema_fingerprint),
                short(&expected)
            )));
        }
        if self.classifier.arity() != schema.fields.len() {
            return Err(Error::configuration(format!(
                "settings model expects {} fields but the schema has {}",
                self.classifier.arity(),
                schema.fields.len()
            )));
        }
        Ok(())
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

pub fn schema_fingerprint(schema: &SchemaDescriptor) -> Result<String> {
    let canonical = serde_json::to_vec(schema).map_err(|e| Error::serialization(e.to_string()))?;
    Ok(format!("{:x}", Sha256::digest(&canonical)))
}

/// Encode settings with bincode and replace `path` atomically.
pub fn save_settings(path: impl AsRef<Path>, settings: &Settings) -> Result<()> {
    let path = path.as_ref();
    let bytes = bincode::serialize(settings)
        .map_err(|e| Error::serialization(format!("encoding settings: {e}")))?;
    write_atomic(path, &bytes)
        .with_context(|| format!("writing settings to {}", path.display()))
        .map_err(persistence_error)?;
    info!(path = %path.display(), bytes = bytes.len(), "settings saved");
    Ok(())
}

/// Read settings written by [`save_settings`]; `Ok(None)` if the file is absent.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Option<Settings>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading settings from {}", path.display()))
        .map_err(persistence_error)?;
    let settings: Settings = bincode::deserialize(&bytes)
        .map_err(|e| Error::serialization(format!("decoding settings {}: {e}", path.display())))?;
    if settings.format_version != FORMAT_VERSION {
        return Err(Error::serialization(format!(
            "settings format version {} is not supported (expected {})",
            settings.format_version, FORMAT_VERSION
        )));
    }
    debug!(path = %path.display(), created_at = %settings.created_at, "settings loaded");
    Ok(Some(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relink_blocking::{Predicate, PredicateKind, SimplePredicate};
    use relink_similarity::{FieldSpec, SimilaritySchema};
    use tempfile::TempDir;

    fn schema(fields: &[&str]) -> SchemaDescriptor {
        SimilaritySchema::new(fields.iter().map(|&f| FieldSpec::string(f)).collect())
            .unwrap()
            .descriptor()
    }

    fn settings() -> Settings {
        Settings::new(
            schema(&["title"]),
            Classifier::from_parts(vec![4.0], vec![-0.5], -2.0, 0.01).unwrap(),
            PredicateSet::new(vec![Predicate::Simple(SimplePredicate::new(
                "title",
                PredicateKind::Prefix(3),
            ))]),
            Some(0.42),
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.bin");
        let original = settings();
        save_settings(&path, &original).unwrap();

        let loaded = load_settings(&path).unwrap().unwrap();
        assert_eq!(loaded, original);
        loaded.verify(&schema(&["title"])).unwrap();
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_settings(dir.path().join("absent.bin")).unwrap().is_none());
    }

    #[test]
    fn test_fingerprint_mismatch_rejected() {
        let err = settings().verify(&schema(&["name"])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(
            schema_fingerprint(&schema(&["a", "b"])).unwrap(),
            schema_fingerprint(&schema(&["a", "b"])).unwrap()
        );
        assert_ne!(
            schema_fingerprint(&schema(&["a", "b"])).unwrap(),
            schema_fingerprint(&schema(&["b", "a"])).unwrap()
        );
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.bin");
        std::fs::write(&path, b"not bincode").unwrap();
        assert!(matches!(load_settings(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.bin");
        save_settings(&path, &settings()).unwrap();

        let mut updated = settings();
        updated.threshold = Some(0.9);
        save_settings(&path, &updated).unwrap();
        assert_eq!(load_settings(&path).unwrap().unwrap().threshold, Some(0.9));
    }
}
