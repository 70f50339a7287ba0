//! Store error types.

use std::fmt;

use tantivy::TantivyError;
use tantivy::directory::error::OpenDirectoryError;
use tantivy::query::QueryParserError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document has an empty {0}")]
    MissingId(&'static str),

    #[error("invalid query: {0}")]
    Query(#[from] QueryParserError),

    #[error("index operation failed: {0}")]
    Index(#[from] TantivyError),

    #[error("failed to open index directory: {0}")]
    Directory(#[from] OpenDirectoryError),

    #[error("index data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored document is unreadable: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One of the two retention passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPass {
    MaxEvents,
    MaxAge,
}

impl fmt::Display for GcPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcPass::MaxEvents => f.write_str("max-events"),
            GcPass::MaxAge => f.write_str("max-age"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{pass} pass: {source}")]
pub struct GcFailure {
    pub pass: GcPass,
    #[source]
    pub source: StoreError,
}

/// Every pass that failed during one garbage collection.
#[derive(Debug, Error)]
#[error("garbage collection failed: {}", describe(.failures))]
pub struct GcError {
    pub failures: Vec<GcFailure>,
}

fn describe(failures: &[GcFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
