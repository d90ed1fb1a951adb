//! # relink Storage
//!
//! Durable artifacts for relink:
//!
//! - [`Settings`] - the trained classifier, blocking predicates and threshold,
//!   bincode-encoded so a later run can skip training
//! - training files - the labeled pool as reviewable JSON, so labeling work
//!   is never repeated
//!
//! Files are replaced atomically: a reader sees the old artifact or the new
//! one, never a partial write.

pub mod settings;
pub mod training;

pub use settings::{load_settings, save_settings, schema_fingerprint, Settings, FORMAT_VERSION};
pub use training::{load_training, save_training, training_from_json, training_to_json};

use atomicwrites::{AtomicFile, OverwriteBehavior};
use std::io::Write;
use std::path::Path;

/// Write through a temporary file in the same directory, then rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite).write(|f| f.write_all(bytes))?;
    Ok(())
}

pub(crate) fn persistence_error(e: anyhow::Error) -> relink_core::Error {
    relink_core::Error::persistence(format!("{e:#}"))
}
