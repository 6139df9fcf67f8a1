//! Error types for proofmarshal

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for proofmarshal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in proofmarshal operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: u64 },

    #[error("Attribute {field:?} of {kind} {hash} not available, pruned away")]
    Pruned {
        field: &'static str,
        kind: &'static str,
        hash: Hash,
    },

    #[error("Bad variant index {index} for {family}: {count} variants registered")]
    UnknownVariant {
        family: &'static str,
        index: u64,
        count: usize,
    },

    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl Error {
    /// True for the ordinary "lookup missed" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_) | Error::IndexOutOfRange { .. })
    }

    /// True when the operation needed data that was pruned away
    pub fn is_pruned(&self) -> bool {
        matches!(self, Error::Pruned { .. })
    }
}
