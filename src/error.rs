//! Error type shared by the query layer and the row store.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::EntityKind;
use crate::query::Operator;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MatchError>;

/// Errors raised while building matches or touching the row store.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Operator tag is not part of the vocabulary.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    /// A value-requiring operator was given no value.
    #[error("operator '{operator}' on '{property}' requires a comparison value")]
    MissingComparisonValue {
        /// Path the predicate reads.
        property: String,
        /// Operator lacking its value.
        operator: Operator,
    },
    /// Property path cannot be spliced into SQL safely.
    #[error("invalid property path '{path}': {reason}")]
    InvalidPropertyPath {
        /// Path as supplied.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// Generic argument validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Stored or supplied document does not describe an entity.
    #[error("invalid {kind} document: {reason}")]
    InvalidDocument {
        /// Table the document belongs to.
        kind: EntityKind,
        /// What is wrong with it.
        reason: String,
    },
    /// Insert-only write hit an existing id.
    #[error("{kind} '{id}' already exists")]
    Conflict {
        /// Table written to.
        kind: EntityKind,
        /// Clashing id.
        id: String,
    },
    /// Lookup of a required entity found nothing.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Table searched.
        kind: EntityKind,
        /// Missing id.
        id: String,
    },
    /// Type registry rejected an entity or a registration.
    #[error("type '{tag}' rejected: {reason}")]
    Registry {
        /// Node type or edge predicate tag.
        tag: String,
        /// Rejection reason.
        reason: String,
    },
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for [`crate::StoreConfig`].
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MatchError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::UnknownOperator(_) => "UnknownOperator",
            MatchError::MissingComparisonValue { .. } => "MissingComparisonValue",
            MatchError::InvalidPropertyPath { .. } => "InvalidPropertyPath",
            MatchError::InvalidArgument(_) => "InvalidArgument",
            MatchError::InvalidDocument { .. } => "InvalidDocument",
            MatchError::Conflict { .. } => "Conflict",
            MatchError::NotFound { .. } => "NotFound",
            MatchError::Registry { .. } => "Registry",
            MatchError::ConfigRead { .. } | MatchError::ConfigParse(_) => "Config",
            MatchError::Sqlite(_) => "Sqlite",
            MatchError::Json(_) => "Json",
        }
    }

    pub(crate) fn invalid_document(kind: EntityKind, reason: impl Into<String>) -> Self {
        MatchError::InvalidDocument {
            kind,
            reason: reason.into(),
        }
    }
}

/// Formats an error prefixed with its code.
pub struct MatchErrorWithCode<'a>(pub &'a MatchError);

impl fmt::Display for MatchErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
