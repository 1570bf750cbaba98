//! Types for the entity cache.

use std::time::Duration;

use thiserror::Error;

use crate::memory::ReadError;
use crate::walker::WalkError;

/// Why a collection pass did not run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectError {
    #[error("entity list unavailable: {0}")]
    ListUnavailable(#[source] ReadError),

    #[error("entity list pointer is null")]
    NullList,

    #[error("entity list walk failed: {0}")]
    Walk(#[source] WalkError),
}

impl CollectError {
    /// Short label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListUnavailable(_) => "list_unavailable",
            Self::NullList => "null_list",
            Self::Walk(_) => "walk_failed",
        }
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Version stamped on every record confirmed by this pass
    pub version: u32,
    /// Payload addresses produced by the walker
    pub candidates: usize,
    /// Records inserted for the first time
    pub added: usize,
    /// Existing records confirmed again
    pub revalidated: usize,
    /// Records not seen this pass (now invalid)
    pub invalidated: usize,
    /// Records removed by the eviction policy
    pub deleted: usize,
    /// False if the walker hit its step ceiling and the previous
    /// candidate set was reused
    pub walk_complete: bool,
    pub elapsed: Duration,
}

impl std::fmt::Display for PassStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v{} candidates={} +{} ~{} -{} invalid={}{}",
            self.version,
            self.candidates,
            self.added,
            self.revalidated,
            self.deleted,
            self.invalidated,
            if self.walk_complete { "" } else { " (partial walk)" },
        )
    }
}

/// Identity of the current area. Any change triggers a cache reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaInstance {
    pub name: String,
    pub hash: u32,
}

impl AreaInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, hash: u32) -> Self {
        Self { name: name.into(), hash }
    }
}

impl std::fmt::Display for AreaInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010x})", self.name, self.hash)
    }
}
