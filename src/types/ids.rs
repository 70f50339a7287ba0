//! Newtype wrappers for domain identifiers.
//!
//! These keep pull-request numbers and webhook delivery GUIDs from being
//! mixed up with arbitrary strings and integers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch names synthesized for pull requests look like `PR-<number>`.
pub const PR_BRANCH_PREFIX: &str = "PR-";

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl PrNumber {
    /// Returns the synthetic branch name used to file events and jobs
    /// under this pull request (`PR-<n>`).
    pub fn branch_name(&self) -> String {
        format!("{}{}", PR_BRANCH_PREFIX, self.0)
    }

    /// Extracts the pull request number from a `PR-<n>` branch name.
    ///
    /// Returns `None` for ordinary branches and for suffixes that are not
    /// a number.
    pub fn from_branch(branch: &str) -> Option<Self> {
        branch
            .strip_prefix(PR_BRANCH_PREFIX)
            .and_then(|n| n.parse().ok())
            .map(PrNumber)
    }
}

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A webhook delivery GUID.
///
/// Unique per delivery; it is the primary key of an [`Event`](super::Event).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
