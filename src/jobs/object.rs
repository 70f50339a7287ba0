//! The scheduler's job resource and its projection into a [`Job`].

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::types::Job;

pub const ORG_LABEL: &str = "lighthouse.jenkins-x.io/refs.org";
pub const REPO_LABEL: &str = "lighthouse.jenkins-x.io/refs.repo";
pub const BRANCH_LABEL: &str = "lighthouse.jenkins-x.io/branch";
pub const BUILD_LABEL: &str = "lighthouse.jenkins-x.io/buildNum";
pub const CONTEXT_LABEL: &str = "lighthouse.jenkins-x.io/context";
pub const EVENT_GUID_LABEL: &str = "event-GUID";

pub const TRACE_ID_ANNOTATION: &str = "lighthouse.jenkins-x.io/traceID";
pub const TRACEPARENT_ANNOTATION: &str = "lighthouse.jenkins-x.io/traceparent";

/// W3C `traceparent`: `version-traceid-spanid-flags`, with optional
/// trailing fields.
static TRACEPARENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<version>[0-9a-f]{2})-(?P<trace_id>[a-f0-9]{32})-(?P<span_id>[a-f0-9]{16})-(?P<flags>[a-f0-9]{2})(?:-.*)?$",
    )
    .expect("traceparent pattern is valid")
});

/// A job resource as delivered by the scheduler's watch API.
///
/// Only the fields the projection reads are modelled; everything else is
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobObject {
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: String,
    pub refs: Option<Refs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Refs {
    pub pulls: Vec<Pull>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pull {
    pub number: u64,
    pub author: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobStatus {
    pub state: String,
    pub description: String,
    #[serde(rename = "reportURL")]
    pub report_url: String,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl JobObject {
    fn label(&self, key: &str) -> String {
        self.metadata.labels.get(key).cloned().unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Projects a job resource into the stored [`Job`] shape.
pub fn project_job(object: &JobObject) -> Job {
    let start = object.status.start_time;
    let end = object.status.completion_time;
    let duration = match (start, end) {
        // Clock skew can put completion before start.
        (Some(start), Some(end)) => Some((end - start).to_std().unwrap_or(Duration::ZERO)),
        _ => None,
    };

    Job {
        name: object.metadata.name.clone(),
        job_type: object.spec.job_type.clone(),
        event_guid: object.label(EVENT_GUID_LABEL),
        owner: object.label(ORG_LABEL),
        repository: object.label(REPO_LABEL),
        branch: object.label(BRANCH_LABEL),
        build: object.label(BUILD_LABEL),
        context: object.label(CONTEXT_LABEL),
        author: object
            .spec
            .refs
            .as_ref()
            .and_then(|refs| refs.pulls.first())
            .map(|pull| pull.author.clone())
            .unwrap_or_default(),
        state: object.status.state.clone(),
        description: object.status.description.clone(),
        report_url: object.status.report_url.clone(),
        trace_id: trace_id(object).unwrap_or_default(),
        start,
        end,
        duration,
    }
}

/// The dedicated trace-ID annotation, else the trace ID inside a valid
/// `traceparent` annotation.
fn trace_id(object: &JobObject) -> Option<String> {
    if let Some(id) = object.annotation(TRACE_ID_ANNOTATION) {
        return Some(id.to_string());
    }
    let traceparent = object.annotation(TRACEPARENT_ANNOTATION)?;
    TRACEPARENT
        .captures(traceparent)
        .and_then(|caps| caps.name("trace_id"))
        .map(|m| m.as_str().to_string())
}
