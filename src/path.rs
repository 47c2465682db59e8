//! Resource paths and preliminary names
//!
//! Resources that do not exist on the server yet are addressed by
//! preliminary paths of the form `@pn<N>`. On the wire they are plain
//! strings; inside the crate they are `ResourcePath::Preliminary(N)`.

use crate::error::{HttpError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const PRELIMINARY_PREFIX: &str = "@pn";

/// True iff `path` is a preliminary path: non-empty, starting with a single `@`.
///
/// A leading `@@` escapes a literal `@` and is never preliminary.
pub fn is_preliminary(path: &str) -> bool {
    path.starts_with('@') && !path.starts_with("@@")
}

/// Path of the containing node: `/a/b/` → `/a/`, `/a/b` → `/a/`.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

/// Either a server-assigned path or a client-side placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourcePath {
    /// Absolute path assigned by the server
    Real(String),
    /// Placeholder `@pn<N>` valid inside one batch
    Preliminary(u64),
}

impl ResourcePath {
    pub fn real(path: impl Into<String>) -> Self {
        ResourcePath::Real(path.into())
    }

    /// Parse a wire string.
    pub fn parse(path: &str) -> Result<Self> {
        if !is_preliminary(path) {
            return Ok(ResourcePath::Real(path.to_string()));
        }
        path.strip_prefix(PRELIMINARY_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(ResourcePath::Preliminary)
            .ok_or_else(|| {
                HttpError::MalformedResource(format!("unrecognized preliminary path: {}", path))
            })
    }

    pub fn is_preliminary(&self) -> bool {
        matches!(self, ResourcePath::Preliminary(_))
    }

    pub fn as_real(&self) -> Option<&str> {
        match self {
            ResourcePath::Real(path) => Some(path),
            ResourcePath::Preliminary(_) => None,
        }
    }

    /// The real path, or `PreliminaryPathMisuse`.
    pub fn require_real(&self) -> Result<&str> {
        self.as_real()
            .ok_or_else(|| HttpError::PreliminaryPathMisuse(self.to_string()))
    }

    /// Wire representation.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::Real(path) => f.write_str(path),
            ResourcePath::Preliminary(n) => write!(f, "{}{}", PRELIMINARY_PREFIX, n),
        }
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = HttpError;

    fn try_from(value: String) -> Result<Self> {
        if is_preliminary(&value) {
            Self::parse(&value)
        } else {
            Ok(ResourcePath::Real(value))
        }
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.to_wire()
    }
}

/// Generator for process-unique preliminary paths.
#[derive(Debug)]
pub struct PreliminaryNames {
    next: AtomicU64,
}

impl PreliminaryNames {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// A fresh placeholder; the first one is `@pn1`.
    pub fn next_preliminary(&self) -> ResourcePath {
        ResourcePath::Preliminary(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PreliminaryNames {
    fn default() -> Self {
        Self::new()
    }
}
