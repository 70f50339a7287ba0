//! Merge-queue status sync.
//!
//! The merge queue exposes its live pools at `GET <base>/` and its merge
//! history at `GET <base>/history`. [`MergeSyncer`] polls both, converts the
//! untyped documents into [`MergePool`](crate::types::MergePool) and
//! [`MergeRecord`](crate::types::MergeRecord) snapshots, and swaps them into
//! the store.

pub mod client;
pub mod convert;
pub mod error;
pub mod syncer;

pub use client::{HttpStatusSource, StatusSource, USER_AGENT};
pub use convert::{Converted, FieldIssue, merge_pools, merge_records, parse_history_key};
pub use error::{SyncError, SyncPhase};
pub use syncer::{MergeSyncer, SyncReport, SyncStats};
