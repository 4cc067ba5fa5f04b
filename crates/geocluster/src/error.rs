//! Error types for the geocluster crate.

use std::fmt;

/// Result type for geocluster operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or querying a cluster index.
#[derive(Debug)]
pub enum Error {
    /// The input was not valid JSON.
    Json(serde_json::Error),
    /// The input was valid JSON but not a usable feature collection.
    InvalidData {
        /// Context for where the error occurred.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
    /// No cluster with the given id exists in the index.
    ClusterNotFound {
        /// The id that was requested.
        cluster_id: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "failed to parse geojson: {e}"),
            Error::InvalidData { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
            Error::ClusterNotFound { cluster_id } => {
                write!(f, "no cluster with id {cluster_id}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
