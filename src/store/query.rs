//! Query objects and result sets of the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tantivy::query::Query;

use crate::types::{Event, Job, MergePool, MergeRecord};

use super::engine::{FacetResult, SearchRequest, SearchResult};

/// Name of the bucket holding everything outside a facet's top terms.
pub const OTHER_BUCKET: &str = "Other";

/// Filters for [`Store::query_events`](super::Store::query_events).
///
/// Every non-empty field narrows the result to exact matches. `query` is
/// a query string such as `+Kind:push`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventsQuery {
    pub guid: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    #[serde(rename = "q")]
    pub query: String,
}

impl EventsQuery {
    pub(super) fn filters(&self) -> [(&'static str, &str); 4] {
        [
            ("GUID", &self.guid),
            ("Owner", &self.owner),
            ("Repository", &self.repository),
            ("Branch", &self.branch),
        ]
    }

    pub(super) fn search_request(query: Box<dyn Query>) -> SearchRequest {
        SearchRequest::new(query)
            .add_facet("Kind", 4)
            .add_facet("Repository", 3)
            .add_facet("Sender", 3)
    }
}

/// Filters for [`Store::query_jobs`](super::Store::query_jobs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobsQuery {
    pub event_guid: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    #[serde(rename = "q")]
    pub query: String,
}

impl JobsQuery {
    pub(super) fn filters(&self) -> [(&'static str, &str); 4] {
        [
            ("EventGUID", &self.event_guid),
            ("Owner", &self.owner),
            ("Repository", &self.repository),
            ("Branch", &self.branch),
        ]
    }

    pub(super) fn search_request(query: Box<dyn Query>) -> SearchRequest {
        SearchRequest::new(query)
            .add_facet("State", 4)
            .add_facet("Repository", 3)
            .add_facet("Type", 3)
            .add_facet("Author", 3)
    }
}

/// Term counts of one facet, plus [`OTHER_BUCKET`].
pub type FacetCounts = BTreeMap<String, usize>;

fn facet_counts(facet: &FacetResult) -> FacetCounts {
    let mut counts: FacetCounts = facet.terms.iter().cloned().collect();
    counts.insert(OTHER_BUCKET.to_string(), facet.other);
    counts
}

fn counts_for(facets: &[FacetResult], field: &str) -> FacetCounts {
    facets
        .iter()
        .find(|f| f.field == field)
        .map(facet_counts)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventCounts {
    pub kinds: FacetCounts,
    pub repositories: FacetCounts,
    pub senders: FacetCounts,
}

/// Matching events, newest first, with facet counts over all matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Events {
    pub events: Vec<Event>,
    pub total: usize,
    pub counts: EventCounts,
}

impl From<SearchResult<Event>> for Events {
    fn from(result: SearchResult<Event>) -> Self {
        Events {
            counts: EventCounts {
                kinds: counts_for(&result.facets, "Kind"),
                repositories: counts_for(&result.facets, "Repository"),
                senders: counts_for(&result.facets, "Sender"),
            },
            total: result.total,
            events: result.hits,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobCounts {
    pub states: FacetCounts,
    pub repositories: FacetCounts,
    pub types: FacetCounts,
    pub authors: FacetCounts,
}

/// Matching jobs, most recently started first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Jobs {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub counts: JobCounts,
}

impl From<SearchResult<Job>> for Jobs {
    fn from(result: SearchResult<Job>) -> Self {
        Jobs {
            counts: JobCounts {
                states: counts_for(&result.facets, "State"),
                repositories: counts_for(&result.facets, "Repository"),
                types: counts_for(&result.facets, "Type"),
                authors: counts_for(&result.facets, "Author"),
            },
            total: result.total,
            jobs: result.hits,
        }
    }
}

/// Equality filter over merge pools. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergeStatusQuery {
    pub owner: String,
    pub repository: String,
    pub branch: String,
}

impl MergeStatusQuery {
    pub fn matches(&self, pool: &MergePool) -> bool {
        field_matches(&self.owner, &pool.owner)
            && field_matches(&self.repository, &pool.repository)
            && field_matches(&self.branch, &pool.branch)
    }
}

/// Equality filter over merge history. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergeHistoryQuery {
    pub owner: String,
    pub repository: String,
    pub branch: String,
}

impl MergeHistoryQuery {
    pub fn matches(&self, record: &MergeRecord) -> bool {
        field_matches(&self.owner, &record.owner)
            && field_matches(&self.repository, &record.repository)
            && field_matches(&self.branch, &record.branch)
    }
}

fn field_matches(filter: &str, value: &str) -> bool {
    filter.is_empty() || filter == value
}
