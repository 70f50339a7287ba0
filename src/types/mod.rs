//! Core domain types for the CI observability store.
//!
//! Value types only: events, jobs and merge-queue snapshots. Indexing,
//! conversion from wire formats and storage live in their own modules.

pub mod event;
pub mod ids;
pub mod job;
pub mod merge;

// Re-export commonly used types at the module level
pub use event::Event;
pub use ids::{DeliveryId, PR_BRANCH_PREFIX, PrNumber};
pub use job::Job;
pub use merge::{BlockerIssue, MergePool, MergeRecord, PullRequest};
