//! Error types for the extraction pipeline

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a document could not be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    NotFound,
    PermissionDenied,
    Network,
    Other,
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::Network => "network failure",
            Self::Other => "failed",
        };
        f.write_str(label)
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (schema, output path, credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source listing could not be produced
    #[error("Listing failed: {0}")]
    Listing(String),

    /// A single document could not be fetched
    #[error("Fetch of '{id}' {reason}: {message}")]
    Fetch {
        id: String,
        reason: FetchReason,
        message: String,
    },

    /// The document container is unreadable
    #[error("Failed to convert '{name}': {message}")]
    Conversion { name: String, message: String },

    /// The service answered with something that does not match the schema
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// A single rate-limit signal (HTTP 429); retryable
    #[error("{service} rate limited the request")]
    RateLimited { service: String },

    /// Rate limiting outlasted the retry budget
    #[error("{service} still rate limited after {retries} retries")]
    RateLimitExceeded { service: String, retries: u32 },

    /// The service could not be reached
    #[error("Could not reach {service}: {message}")]
    Connectivity { service: String, message: String },

    /// The service answered with a non-2xx status
    #[error("{service} returned HTTP {status}: {body}")]
    ServiceStatus {
        service: String,
        status: u16,
        body: String,
    },

    /// The request exceeded its time limit
    #[error("{service} timed out: {message}")]
    Timeout { service: String, message: String },

    /// The durable output could not be written
    #[error("Failed to write results to '{path}': {message}")]
    SinkWrite { path: String, message: String },

    /// The source artifact could not be moved or deleted
    #[error("Failed to mark '{id}' as done: {message}")]
    CompletionMark { id: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(id: impl Into<String>, reason: FetchReason, message: impl Into<String>) -> Self {
        Self::Fetch {
            id: id.into(),
            reason,
            message: message.into(),
        }
    }

    /// Create a conversion error
    pub fn conversion(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a schema violation error
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation(message.into())
    }

    /// Create a sink write error
    pub fn sink_write(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SinkWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a completion-marking error
    pub fn completion_mark(id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::CompletionMark {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for a single rate-limit signal, the only retryable condition
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Fatal errors abort the whole run; everything else only skips the item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Listing(_) | Self::SinkWrite { .. }
        )
    }

    /// Failure kind reported for a skipped item
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch { .. } => FailureKind::Fetch,
            Self::Conversion { .. } => FailureKind::Conversion,
            Self::SchemaViolation(_) | Self::Json(_) => FailureKind::SchemaViolation,
            Self::RateLimited { .. } | Self::RateLimitExceeded { .. } => {
                FailureKind::RateLimitExceeded
            }
            Self::Connectivity { .. } => FailureKind::Connectivity,
            Self::ServiceStatus { .. } => FailureKind::ServiceStatus,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::CompletionMark { .. } => FailureKind::CompletionMark,
            Self::Config(_) | Self::Listing(_) | Self::SinkWrite { .. } => FailureKind::Fatal,
            Self::Io(_) | Self::Csv(_) | Self::Internal(_) => FailureKind::Other,
        }
    }
}

/// Classification of a per-item failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Conversion,
    SchemaViolation,
    RateLimitExceeded,
    Connectivity,
    ServiceStatus,
    Timeout,
    CompletionMark,
    Fatal,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Conversion => "conversion",
            Self::SchemaViolation => "schema_violation",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::Connectivity => "connectivity",
            Self::ServiceStatus => "service_status",
            Self::Timeout => "timeout",
            Self::CompletionMark => "completion_mark",
            Self::Fatal => "fatal",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-item failure retained for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl From<&Error> for ItemFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

/// Outcome of a failed pipeline stage: either the run stops or the item is skipped
#[derive(Debug)]
pub enum StageError {
    Fatal(Error),
    Item(ItemFailure),
}

impl From<Error> for StageError {
    fn from(err: Error) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Item(ItemFailure::from(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Config("schema missing".into()).is_fatal());
        assert!(Error::Listing("unreachable".into()).is_fatal());
        assert!(Error::sink_write("out.csv", "disk full").is_fatal());

        assert!(!Error::fetch("a.pdf", FetchReason::NotFound, "gone").is_fatal());
        assert!(!Error::completion_mark("a.pdf", "denied").is_fatal());
        assert!(!Error::RateLimitExceeded { service: "landing".into(), retries: 3 }.is_fatal());
    }

    #[test]
    fn test_stage_error_from_error() {
        match StageError::from(Error::conversion("a.pdf", "corrupt xref")) {
            StageError::Item(failure) => {
                assert_eq!(failure.kind, FailureKind::Conversion);
                assert!(failure.detail.contains("corrupt xref"));
            }
            StageError::Fatal(e) => panic!("expected item failure, got fatal {e}"),
        }

        assert!(matches!(
            StageError::from(Error::Listing("boom".into())),
            StageError::Fatal(Error::Listing(_))
        ));
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(Error::RateLimited { service: "landing".into() }.is_rate_limited());
        assert!(!Error::ServiceStatus {
            service: "landing".into(),
            status: 500,
            body: String::new()
        }
        .is_rate_limited());
        assert!(!Error::Timeout {
            service: "landing".into(),
            message: "deadline".into()
        }
        .is_rate_limited());
    }
}
