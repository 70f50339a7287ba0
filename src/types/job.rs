//! Point-in-time projections of scheduler-managed jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PrNumber;

/// A build/check run as last reported by the scheduler.
///
/// Every add or update notification for the same `name` overwrites the
/// previous projection entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    /// Scheduler object name. Primary key in the job index.
    pub name: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    /// GUID of the event that triggered this job. Relation only.
    #[serde(rename = "EventGUID")]
    pub event_guid: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub build: String,
    pub context: String,
    /// Author of the pull request the job runs for, if any.
    pub author: String,
    pub state: String,
    pub description: String,
    #[serde(rename = "ReportURL")]
    pub report_url: String,
    #[serde(rename = "TraceID")]
    pub trace_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// `end - start`; `None` while the job is still running.
    pub duration: Option<Duration>,
}

impl Job {
    /// The pull request this job runs for, if its branch is `PR-<n>`.
    pub fn pull_request_number(&self) -> Option<PrNumber> {
        PrNumber::from_branch(&self.branch)
    }
}
