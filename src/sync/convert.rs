//! Conversion of untyped merge-queue documents into typed records.
//!
//! The merge queue publishes loosely typed JSON. Conversion never fails a
//! whole document because of one bad field: a value of the wrong type is
//! replaced by its default and reported as a [`FieldIssue`]. Only a
//! top-level shape that is neither an object nor an array is an error.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::types::{BlockerIssue, MergePool, MergeRecord, PrNumber, PullRequest};

use super::error::{Result, SyncError, SyncPhase};

/// `owner/repo:branch`
static HISTORY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<org>[^/]+)/(?P<repo>[^:]+):(?P<branch>.+)")
        .expect("history key pattern is valid")
});

/// A field that was present but could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Location in the document, e.g. `pools[0].SuccessPRs[2].Number`.
    pub path: String,
    pub problem: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

/// Converted records plus whatever was skipped along the way.
#[derive(Debug, Clone)]
pub struct Converted<T> {
    pub items: Vec<T>,
    pub issues: Vec<FieldIssue>,
}

/// Splits a history key into `(owner, repo, branch)`.
///
/// A key that does not have the `owner/repo:branch` shape yields three
/// empty strings.
pub fn parse_history_key(key: &str) -> (String, String, String) {
    match HISTORY_KEY.captures(key) {
        Some(caps) => (
            caps["org"].to_string(),
            caps["repo"].to_string(),
            caps["branch"].to_string(),
        ),
        None => Default::default(),
    }
}

/// Converts the pools document. Each top-level child, whether array
/// element or object value, becomes one pool.
pub fn merge_pools(document: &Value) -> Result<Converted<MergePool>> {
    let children = top_level_children(document, SyncPhase::Pools)?;
    let mut fields = Fields::default();

    let mut items = Vec::with_capacity(children.len());
    for (path, child) in children {
        if fields.object(child, &path).is_some() {
            items.push(fields.pool(child, &path));
        }
    }

    Ok(Converted {
        items,
        issues: fields.issues,
    })
}

/// Converts the history document: an object keyed by `owner/repo:branch`
/// whose values are arrays of merge actions.
pub fn merge_records(document: &Value) -> Result<Converted<MergeRecord>> {
    let mut fields = Fields::default();
    let mut items = Vec::new();

    match document {
        Value::Object(map) => {
            for (key, entries) in map {
                let (owner, repository, branch) = parse_history_key(key);
                let path = format!("history[{key:?}]");
                for (i, entry) in fields.array(Some(entries), &path).iter().enumerate() {
                    let path = format!("{path}[{i}]");
                    if fields.object(entry, &path).is_some() {
                        items.push(MergeRecord {
                            owner: owner.clone(),
                            repository: repository.clone(),
                            branch: branch.clone(),
                            ..fields.record(entry, &path)
                        });
                    }
                }
            }
        }
        Value::Array(entries) if entries.is_empty() => {}
        Value::Array(_) => fields.issue(
            "history",
            "expected an object keyed by owner/repo:branch, found a non-empty array",
        ),
        other => {
            return Err(SyncError::Parse {
                phase: SyncPhase::History,
                reason: format!("expected object or array, found {}", kind(other)),
            });
        }
    }

    Ok(Converted {
        items,
        issues: fields.issues,
    })
}

fn top_level_children(document: &Value, phase: SyncPhase) -> Result<Vec<(String, &Value)>> {
    match document {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("{phase}[{i}]"), v))
            .collect()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (format!("{phase}[{k:?}]"), v))
            .collect()),
        // The endpoint answers `null` when the queue has no pools.
        Value::Null => Ok(Vec::new()),
        other => Err(SyncError::Parse {
            phase,
            reason: format!("expected object or array, found {}", kind(other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed field access that records problems instead of failing.
#[derive(Default)]
struct Fields {
    issues: Vec<FieldIssue>,
}

impl Fields {
    fn issue(&mut self, path: &str, problem: impl Into<String>) {
        self.issues.push(FieldIssue {
            path: path.to_string(),
            problem: problem.into(),
        });
    }

    fn mismatch(&mut self, path: &str, expected: &str, found: &Value) {
        self.issue(path, format!("expected {expected}, found {}", kind(found)));
    }

    fn object<'a>(
        &mut self,
        value: &'a Value,
        path: &str,
    ) -> Option<&'a serde_json::Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.mismatch(path, "object", other);
                None
            }
        }
    }

    fn string(&mut self, parent: &Value, key: &str, path: &str) -> String {
        match parent.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                self.mismatch(&format!("{path}.{key}"), "string", other);
                String::new()
            }
        }
    }

    /// Numbers are kept at full precision until here; anything that is not
    /// a non-negative integer within `u64` is reported and zeroed.
    fn unsigned(&mut self, parent: &Value, key: &str, path: &str) -> u64 {
        let path = format!("{path}.{key}");
        match parent.get(key) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(n) => n,
                None => {
                    self.issue(&path, format!("{n} is not a non-negative integer"));
                    0
                }
            },
            Some(other) => {
                self.mismatch(&path, "number", other);
                0
            }
        }
    }

    fn time(&mut self, parent: &Value, key: &str, path: &str) -> Option<DateTime<Utc>> {
        let raw = self.string(parent, key, path);
        if raw.is_empty() {
            return None;
        }
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                self.issue(&format!("{path}.{key}"), format!("invalid timestamp {raw:?}: {e}"));
                None
            }
        }
    }

    fn array<'a>(&mut self, value: Option<&'a Value>, path: &str) -> &'a [Value] {
        match value {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.mismatch(path, "array", other);
                &[]
            }
        }
    }

    fn pull_requests(&mut self, parent: &Value, key: &str, path: &str) -> Vec<PullRequest> {
        let path = format!("{path}.{key}");
        self.array(parent.get(key), &path)
            .iter()
            .enumerate()
            .filter_map(|(i, pr)| {
                let path = format!("{path}[{i}]");
                self.object(pr, &path)?;
                Some(self.pool_pull_request(pr, &path))
            })
            .collect()
    }

    fn pool_pull_request(&mut self, pr: &Value, path: &str) -> PullRequest {
        let author = match pr.get("Author") {
            None | Some(Value::Null) => String::new(),
            Some(author @ Value::Object(_)) => self.string(author, "Login", &format!("{path}.Author")),
            Some(other) => {
                self.mismatch(&format!("{path}.Author"), "object", other);
                String::new()
            }
        };

        PullRequest {
            number: PrNumber(self.unsigned(pr, "Number", path)),
            author,
            mergeable: self.string(pr, "Mergeable", path),
            title: self.string(pr, "Title", path),
            updated_at: self.time(pr, "UpdatedAt", path),
        }
    }

    fn blockers(&mut self, parent: &Value, path: &str) -> Vec<BlockerIssue> {
        let path = format!("{path}.Blockers");
        self.array(parent.get("Blockers"), &path)
            .iter()
            .enumerate()
            .filter_map(|(i, blocker)| {
                let path = format!("{path}[{i}]");
                self.object(blocker, &path)?;
                Some(BlockerIssue {
                    number: self.unsigned(blocker, "Number", &path),
                    title: self.string(blocker, "Title", &path),
                    url: self.string(blocker, "URL", &path),
                })
            })
            .collect()
    }

    fn pool(&mut self, pool: &Value, path: &str) -> MergePool {
        let mut converted = MergePool {
            owner: self.string(pool, "Org", path),
            repository: self.string(pool, "Repo", path),
            branch: self.string(pool, "Branch", path),
            success_prs: self.pull_requests(pool, "SuccessPRs", path),
            pending_prs: self.pull_requests(pool, "PendingPRs", path),
            missing_prs: self.pull_requests(pool, "MissingPRs", path),
            batch_pending: self.pull_requests(pool, "BatchPending", path),
            updated_at: None,
            action: self.string(pool, "Action", path),
            target: self.pull_requests(pool, "Target", path),
            blockers: self.blockers(pool, path),
            error: self.string(pool, "Error", path),
            source: pool.clone(),
        };
        converted.refresh_updated_at();
        converted
    }

    fn record(&mut self, entry: &Value, path: &str) -> MergeRecord {
        let targets_path = format!("{path}.target");
        let prs = self
            .array(entry.get("target"), &targets_path)
            .iter()
            .enumerate()
            .filter_map(|(i, target)| {
                let path = format!("{targets_path}[{i}]");
                self.object(target, &path)?;
                Some(PullRequest {
                    number: PrNumber(self.unsigned(target, "number", &path)),
                    author: self.string(target, "author", &path),
                    title: self.string(target, "title", &path),
                    ..PullRequest::default()
                })
            })
            .collect();

        MergeRecord {
            time: self.time(entry, "time", path),
            action: self.string(entry, "action", path),
            base_sha: self.string(entry, "baseSHA", path),
            prs,
            error: self.string(entry, "err", path),
            source: entry.clone(),
            ..MergeRecord::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn pr(number: u64, login: &str, updated_at: &str) -> Value {
        json!({
            "Number": number,
            "Author": { "Login": login },
            "Mergeable": "MERGEABLE",
            "Title": format!("PR {number}"),
            "UpdatedAt": updated_at
        })
    }

    #[test]
    fn pool_rolls_up_updated_at_across_buckets_and_target() {
        let doc = json!([{
            "Org": "acme",
            "Repo": "api",
            "Branch": "main",
            "Action": "MERGE",
            "SuccessPRs": [pr(1, "alice", "2024-01-01T00:00:00Z")],
            "PendingPRs": [pr(2, "bob", "2024-01-02T00:00:00Z")],
            "Target": [pr(3, "carol", "2024-01-05T00:00:00Z")]
        }]);

        let converted = merge_pools(&doc).unwrap();
        assert!(converted.issues.is_empty(), "{:?}", converted.issues);

        let pool = &converted.items[0];
        assert_eq!(pool.owner, "acme");
        assert_eq!(pool.repository, "api");
        assert_eq!(pool.action, "MERGE");
        assert_eq!(pool.success_prs[0].author, "alice");
        assert_eq!(pool.pending_prs[0].number, PrNumber(2));
        assert!(pool.missing_prs.is_empty());
        assert!(pool.batch_pending.is_empty());
        assert!(pool.blockers.is_empty());
        assert_eq!(
            pool.updated_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(pool.source, doc[0]);
    }

    #[test]
    fn object_of_pools_yields_one_pool_per_value() {
        let doc = json!({
            "acme/api:main": { "Org": "acme", "Repo": "api", "Branch": "main" },
            "acme/web:main": { "Org": "acme", "Repo": "web", "Branch": "main" }
        });
        let converted = merge_pools(&doc).unwrap();
        assert_eq!(converted.items.len(), 2);
    }

    #[test]
    fn wrong_field_types_default_and_are_reported() {
        let doc = json!([{
            "Org": 7,
            "Repo": "api",
            "SuccessPRs": [{ "Number": -3, "Author": "alice", "UpdatedAt": "yesterday" }],
            "PendingPRs": "none"
        }]);

        let converted = merge_pools(&doc).unwrap();
        let pool = &converted.items[0];
        assert_eq!(pool.owner, "");
        assert_eq!(pool.repository, "api");
        assert_eq!(pool.success_prs[0].number, PrNumber(0));
        assert_eq!(pool.success_prs[0].author, "");
        assert!(pool.success_prs[0].updated_at.is_none());

        let paths: Vec<_> = converted.issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "pools[0].Org",
                "pools[0].SuccessPRs[0].Author",
                "pools[0].SuccessPRs[0].Number",
                "pools[0].SuccessPRs[0].UpdatedAt",
                "pools[0].PendingPRs",
            ]
        );
    }

    #[test]
    fn large_numbers_narrow_without_loss() {
        let doc: Value =
            serde_json::from_str(r#"[{"Target": [{"Number": 18446744073709551615}]}]"#).unwrap();
        let converted = merge_pools(&doc).unwrap();
        assert_eq!(converted.items[0].target[0].number, PrNumber(u64::MAX));
    }

    #[test]
    fn scalar_top_level_is_a_parse_error() {
        let err = merge_pools(&json!("oops")).unwrap_err();
        assert!(matches!(err, SyncError::Parse { phase: SyncPhase::Pools, .. }));

        let err = merge_records(&json!(42)).unwrap_err();
        assert!(matches!(err, SyncError::Parse { phase: SyncPhase::History, .. }));
    }

    #[test]
    fn null_pools_document_is_empty() {
        let converted = merge_pools(&Value::Null).unwrap();
        assert!(converted.items.is_empty());
    }

    #[test]
    fn history_key_parsing() {
        assert_eq!(
            parse_history_key("acme/api:main"),
            ("acme".into(), "api".into(), "main".into())
        );
        assert_eq!(
            parse_history_key("acme/api:release/1.x"),
            ("acme".into(), "api".into(), "release/1.x".into())
        );
        assert_eq!(
            parse_history_key("not-a-pool"),
            (String::new(), String::new(), String::new())
        );
    }

    #[test]
    fn history_entries_become_records() {
        let doc = json!({
            "acme/api:main": [
                {
                    "time": "2024-03-01T12:00:00.123456789Z",
                    "action": "MERGE",
                    "baseSHA": "abc123",
                    "target": [{ "number": 17, "author": "alice", "title": "Fix" }],
                    "err": ""
                },
                { "action": "MERGE_BATCH", "target": [] }
            ],
            "weird": [{ "action": "TRIGGER" }]
        });

        let converted = merge_records(&doc).unwrap();
        assert!(converted.issues.is_empty(), "{:?}", converted.issues);
        assert_eq!(converted.items.len(), 3);

        let first = &converted.items[0];
        assert_eq!(first.owner, "acme");
        assert_eq!(first.repository, "api");
        assert_eq!(first.branch, "main");
        assert_eq!(first.base_sha, "abc123");
        assert_eq!(first.prs[0].number, PrNumber(17));
        assert_eq!(first.prs[0].author, "alice");
        assert_eq!(
            first.time.map(|t| t.timestamp_subsec_nanos()),
            Some(123_456_789)
        );
        assert_eq!(first.source, doc["acme/api:main"][0]);

        let unparsed = &converted.items[2];
        assert_eq!(unparsed.action, "TRIGGER");
        assert_eq!(unparsed.owner, "");
        assert_eq!(unparsed.branch, "");
    }
}
