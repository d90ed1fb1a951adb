use crate::pair::Label;
use crate::record::RecordId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Insufficient training data: {found} {class} example(s), at least {required} required")]
    InsufficientData {
        class: Label,
        found: usize,
        required: usize,
    },

    #[error("Record {record} has no value for required field '{field}'")]
    MissingField { record: RecordId, field: String },

    #[error("Unknown record: {0}")]
    UnknownRecord(RecordId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a persistence error.
    #[must_use]
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// True for errors the caller can fix by labeling more pairs.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Error::InsufficientData { .. })
    }
}
