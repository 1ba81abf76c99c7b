//! Error types for loading, building, and reloading the object graph.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Source errors
    SourceParse,
    SourceIo,

    // Build errors
    MissingTypeOrParent,
    InvalidObjectEntry,
    UnresolvedReference,

    // Reload errors
    IndirectionUnsupported,
    Construction,
}

/// Error raised by an object container while building or wiring an instance.
///
/// Propagated unchanged through [`ConfError::Construction`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("unknown type '{type_name}' for object '{id}'")]
    UnknownType { id: String, type_name: String },

    #[error("object '{id}' names unknown parent '{parent_id}'")]
    UnknownParent { id: String, parent_id: String },

    #[error("parent chain of object '{id}' is cyclic")]
    ParentCycle { id: String },

    #[error("no object registered under id '{0}'")]
    NotRegistered(String),

    #[error("failed to construct '{id}': {reason}")]
    Failed { id: String, reason: String },
}

impl ConstructionError {
    pub fn failed(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fatal error for a load or reload.
///
/// None of these are retried internally: the whole load/reload is aborted
/// and the caller decides whether to retry, keep serving, or stop.
#[derive(Error, Debug)]
pub enum ConfError {
    #[error("cannot parse configuration source '{resource}' ({}): {reason}", path.display())]
    SourceParse {
        resource: String,
        path: PathBuf,
        reason: String,
    },

    #[error("cannot read configuration source {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object '{id}' has neither a type nor a parent")]
    MissingTypeOrParent { id: String },

    #[error("entry '{key}' cannot describe an object: {reason}")]
    InvalidObjectEntry { key: String, reason: String },

    #[error("property '{property}' of '{id}' references unknown object '{target}'")]
    UnresolvedReference {
        id: String,
        property: String,
        target: String,
    },

    #[error("object '{id}' is flagged for indirection but exposes no capability surface")]
    IndirectionUnsupported { id: String },

    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

impl ConfError {
    /// Programmatic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfError::SourceParse { .. } => ErrorCode::SourceParse,
            ConfError::SourceIo { .. } => ErrorCode::SourceIo,
            ConfError::MissingTypeOrParent { .. } => ErrorCode::MissingTypeOrParent,
            ConfError::InvalidObjectEntry { .. } => ErrorCode::InvalidObjectEntry,
            ConfError::UnresolvedReference { .. } => ErrorCode::UnresolvedReference,
            ConfError::IndirectionUnsupported { .. } => ErrorCode::IndirectionUnsupported,
            ConfError::Construction(_) => ErrorCode::Construction,
        }
    }

    /// True for errors raised while resolving specifications.
    pub fn is_spec_resolution(&self) -> bool {
        matches!(
            self,
            ConfError::MissingTypeOrParent { .. }
                | ConfError::InvalidObjectEntry { .. }
                | ConfError::UnresolvedReference { .. }
        )
    }

    pub fn parse(resource: &str, path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        ConfError::SourceParse {
            resource: resource.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfError>;
