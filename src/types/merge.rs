//! Merge-queue snapshots: live pools and historical merge actions.
//!
//! Both collections are replaced wholesale on every successful poll of the
//! merge-status endpoint. Each record keeps the untouched source document so
//! it can be re-exported without loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PrNumber;

/// A pull request as seen by the merge queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PullRequest {
    pub number: PrNumber,
    pub author: String,
    pub mergeable: String,
    pub title: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An issue that blocks merging into a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockerIssue {
    pub number: u64,
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Live merge-queue state for one branch.
///
/// A pull request sits in exactly one of the four buckets, rolled up by its
/// worst test status: one pending context puts an otherwise green PR in
/// `pending_prs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergePool {
    pub owner: String,
    pub repository: String,
    pub branch: String,

    #[serde(rename = "SuccessPRs")]
    pub success_prs: Vec<PullRequest>,
    #[serde(rename = "PendingPRs")]
    pub pending_prs: Vec<PullRequest>,
    #[serde(rename = "MissingPRs")]
    pub missing_prs: Vec<PullRequest>,
    /// Empty when no batch is being tested.
    pub batch_pending: Vec<PullRequest>,

    /// Most recent `updated_at` over every PR in the pool.
    pub updated_at: Option<DateTime<Utc>>,

    pub action: String,
    pub target: Vec<PullRequest>,
    pub blockers: Vec<BlockerIssue>,
    pub error: String,

    /// The pool document exactly as the merge-status endpoint returned it.
    pub source: serde_json::Value,
}

impl MergePool {
    /// Iterates over every pull request in the pool: the four buckets
    /// followed by the target.
    pub fn pull_requests(&self) -> impl Iterator<Item = &PullRequest> {
        self.success_prs
            .iter()
            .chain(&self.pending_prs)
            .chain(&self.missing_prs)
            .chain(&self.batch_pending)
            .chain(&self.target)
    }

    /// Recomputes `updated_at` as the maximum over all contained PRs.
    pub fn refresh_updated_at(&mut self) {
        self.updated_at = self.pull_requests().filter_map(|pr| pr.updated_at).max();
    }
}

/// One completed merge-queue action (merge or batch) for a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeRecord {
    pub owner: String,
    pub repository: String,
    pub branch: String,

    pub time: Option<DateTime<Utc>>,
    pub action: String,
    #[serde(rename = "BaseSHA")]
    pub base_sha: String,
    /// Pull requests involved, in the order the queue reported them.
    #[serde(rename = "PRs")]
    pub prs: Vec<PullRequest>,
    pub error: String,

    /// The history entry exactly as the merge-status endpoint returned it.
    pub source: serde_json::Value,
}
