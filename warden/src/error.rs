//! Error types for warden
//!
//! Every fallible operation in the core returns [`Error`]. The first group of
//! variants are expected outcomes that are shown to the invoking actor as a
//! short message; the rest are plumbing failures that only ever surface as a
//! generic "command failed" notice.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} \"{name}\" does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} \"{name}\" already exists")]
    Conflict { kind: &'static str, name: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("cyclic group parenting: {0}")]
    CyclicReference(String),

    #[error("{0}")]
    ProtectedResource(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("only {written} of {} restriction entries were written", .written + .failed)]
    Inconsistent { written: usize, failed: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Error::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Whether the `Display` text may be shown to the invoking actor
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Error::Database(_) | Error::Serialization(_) | Error::Internal(_)
        )
    }

    /// Operator errors that also belong in the server log at error severity
    pub fn is_operator_error(&self) -> bool {
        matches!(self, Error::CyclicReference(_) | Error::ProtectedResource(_))
    }
}
