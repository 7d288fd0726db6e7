use serde::Serialize;
use thiserror::Error;

/// Failures raised by the storage collaborator and the ambient stack.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Pipeline stage that produced a failure.
///
/// Decision and aggregation take already-validated input and cannot fail, so
/// candidate fetching is the only stage that reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Candidate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Candidate => write!(f, "candidate"),
        }
    }
}

/// Structured failure returned by the query pipeline and the range cache.
///
/// Cloneable so that one in-flight load can report the same outcome to every
/// caller that coalesced onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),

    #[error("Invalid range: '{start}'..'{end}'")]
    InvalidRange { start: String, end: String },

    #[error("Storage query failed: {0}")]
    Storage(String),

    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),
}

impl From<CoreError> for QueryError {
    fn from(err: CoreError) -> Self {
        QueryError::Storage(err.to_string())
    }
}
