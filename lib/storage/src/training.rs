//! Labeled pairs on disk
//!
//! Pretty JSON of the form `{"match": [...], "distinct": [...]}`. Each entry
//! carries both records' fields so the file can be reviewed by hand, but only
//! the source and key are read back.

use crate::{persistence_error, write_atomic};
use anyhow::Context;
use relink_core::{
    Dataset, Error, FieldValue, Label, RecordId, RecordKey, RecordPair, Result, Source,
    TrainingPool,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrainingFile {
    #[serde(rename = "match", default)]
    matches: Vec<PairEntry>,
    #[serde(default)]
    distinct: Vec<PairEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PairEntry {
    left: RecordEntry,
    right: RecordEntry,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordEntry {
    source: Source,
    key: RecordKey,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl RecordEntry {
    fn new(id: &RecordId, data: &Dataset) -> Self {
        Self {
            source: id.source,
            key: id.key.clone(),
            fields: data.get(id).map(|r| r.fields.clone()).unwrap_or_default(),
        }
    }

    fn id(&self) -> RecordId {
        RecordId::new(self.source, self.key.clone())
    }
}

/// Render a pool as the training-file JSON.
pub fn training_to_json(pool: &TrainingPool, data: &Dataset) -> Result<String> {
    let entries = |pairs: &[RecordPair]| -> Vec<PairEntry> {
        pairs
            .iter()
            .map(|p| PairEntry {
                left: RecordEntry::new(&p.left, data),
                right: RecordEntry::new(&p.right, data),
            })
            .collect()
    };
    let file = TrainingFile {
        matches: entries(pool.matches()),
        distinct: entries(pool.distinct()),
    };
    serde_json::to_string_pretty(&file).map_err(|e| Error::serialization(e.to_string()))
}

/// Rebuild a pool from training-file JSON.
///
/// Pairs naming records that are not in `data` are skipped with a warning.
pub fn training_from_json(json: &str, data: &Dataset) -> Result<TrainingPool> {
    let file: TrainingFile =
        serde_json::from_str(json).map_err(|e| Error::serialization(format!("training file: {e}")))?;

    let mut pool = TrainingPool::new();
    let mut skipped = 0usize;
    for (entries, label) in [(&file.matches, Label::Match), (&file.distinct, Label::Distinct)] {
        for entry in entries {
            let (left, right) = (entry.left.id(), entry.right.id());
            if data.get(&left).is_none() || data.get(&right).is_none() {
                warn!(%left, %right, "training pair refers to an unknown record, skipping");
                skipped += 1;
                continue;
            }
            let pair = RecordPair::new(left, right);
            if pair.is_self_pair() {
                warn!(%pair, "training pair compares a record with itself, skipping");
                skipped += 1;
                continue;
            }
            pool.insert(pair, label);
        }
    }
    if skipped > 0 {
        warn!(skipped, kept = pool.len(), "some training pairs were not loaded");
    }
    Ok(pool)
}

pub fn save_training(path: impl AsRef<Path>, pool: &TrainingPool, data: &Dataset) -> Result<()> {
    let path = path.as_ref();
    let json = training_to_json(pool, data)?;
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("writing training pairs to {}", path.display()))
        .map_err(persistence_error)?;
    info!(path = %path.display(), pairs = pool.len(), "training pairs saved");
    Ok(())
}

/// Read a training file; `Ok(None)` if it does not exist.
pub fn load_training(path: impl AsRef<Path>, data: &Dataset) -> Result<Option<TrainingPool>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading training pairs from {}", path.display()))
        .map_err(persistence_error)?;
    let pool = training_from_json(&json, data)?;
    info!(path = %path.display(), pairs = pool.len(), "training pairs loaded");
    Ok(Some(pool))
}
