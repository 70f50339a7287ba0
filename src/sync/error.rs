//! Merge-status sync errors.

use std::fmt;

use thiserror::Error;

/// The two documents fetched on every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Pools,
    History,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Pools => "pools",
            SyncPhase::History => "history",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure, or a body that could not be read.
    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body is not JSON, or its top-level shape is unusable.
    #[error("malformed {phase} document: {reason}")]
    Parse { phase: SyncPhase, reason: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;
