//! Error types for the Adhocracy HTTP layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for HTTP layer operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// Error name reported by the backend when a version would fork a no-fork item.
pub const NO_FORK_ERROR_NAME: &str = "data.adhocracy_core.sheets.versions.IVersionable.follows";

/// Description prefix of the no-fork validation error.
pub const NO_FORK_ERROR_PREFIX: &str = "No fork allowed";

/// A single structured error item as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendErrorItem {
    /// Dotted field name, e.g. `data.adhocracy_core.sheets.title.ITitle.title`
    #[serde(default)]
    pub name: String,
    /// Where the error was found (`body`, `querystring`, `header`, ...)
    #[serde(default)]
    pub location: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

impl BackendErrorItem {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            description: description.into(),
        }
    }
}

/// HTTP layer error types
///
/// Programmer faults (`PreliminaryPathMisuse`, `TransactionAlreadyCommitted`)
/// and protocol violations are never retried. `Backend` carries the server's
/// structured validation errors verbatim.
#[derive(Error, Debug)]
pub enum HttpError {
    /// A preliminary path was used where a persisted path is required
    #[error("Preliminary path used outside of a transaction: {0}")]
    PreliminaryPathMisuse(String),

    /// The transaction has already been committed
    #[error("Tried to use an already committed transaction")]
    TransactionAlreadyCommitted,

    /// The preliminary references of a deep post form a cycle
    #[error("Cycle detected among preliminary references: {0:?}")]
    CycleDetected(Vec<String>),

    /// The LAST tag of a no-fork item does not hold exactly one head
    #[error("Expected exactly one head version for {path}, found {count}")]
    AmbiguousOrMissingHead { path: String, count: usize },

    /// The no-fork protocol gave up after repeated conflicts
    #[error("Tried to post new version of {path} {attempts} times, giving up")]
    RetryBudgetExhausted { path: String, attempts: u32 },

    /// The wire object is not a valid resource
    #[error("Malformed resource: {0}")]
    MalformedResource(String),

    /// The sheet is not known to the schema registry
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    /// The field is not known to the schema registry
    #[error("Unknown field {field} in sheet {sheet}")]
    UnknownField { sheet: String, field: String },

    /// A field value could not be coerced to its declared type
    #[error("Cannot coerce {sheet}.{field}: {reason}")]
    Coercion {
        sheet: String,
        field: String,
        reason: String,
    },

    /// The backend rejected the request
    #[error("Backend error {status}: {}", format_items(.errors))]
    Backend {
        status: u16,
        errors: Vec<BackendErrorItem>,
    },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend answered with something we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_items(errors: &[BackendErrorItem]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.name.is_empty() {
                e.description.clone()
            } else {
                format!("{} ({}): {}", e.name, e.location, e.description)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl HttpError {
    /// Structured backend errors, empty for every other kind.
    pub fn backend_errors(&self) -> &[BackendErrorItem] {
        match self {
            HttpError::Backend { errors, .. } => errors,
            _ => &[],
        }
    }

    /// True for exactly the "no fork allowed" validation error.
    pub fn is_no_fork_conflict(&self) -> bool {
        match self.backend_errors() {
            [item] => {
                item.name == NO_FORK_ERROR_NAME
                    && item.location == "body"
                    && item.description.starts_with(NO_FORK_ERROR_PREFIX)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for HttpError {
    fn from(err: toml::de::Error) -> Self {
        HttpError::Config(err.to_string())
    }
}
