//! Shared test utilities and arbitrary generators for property-based testing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use crate::types::{Event, Job, PrNumber};

pub fn arb_pr_number() -> impl Strategy<Value = PrNumber> {
    (1u64..10_000).prop_map(PrNumber)
}

/// Timestamps between 2020 and 2030, whole seconds.
pub fn arb_datetime() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64)
        .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("main".to_string()),
        "[a-z][a-z0-9/-]{0,20}".prop_map(String::from),
        arb_pr_number().prop_map(|n| n.branch_name()),
    ]
}

/// A small vocabulary so facets see repeated terms.
fn arb_word(words: &'static [&'static str]) -> impl Strategy<Value = String> {
    prop::sample::select(words).prop_map(String::from)
}

pub fn arb_event() -> impl Strategy<Value = Event> {
    (
        "[a-f0-9]{8}-[a-f0-9]{4}",
        arb_word(&["acme", "globex", "initech"]),
        arb_word(&["api", "web", "cli", "docs", "infra"]),
        arb_branch_name(),
        arb_word(&[
            "ping",
            "push",
            "pull_request",
            "pull_request_comment",
            "issue_comment",
            "",
        ]),
        arb_word(&["opened", "closed", "synchronize", ""]),
        arb_word(&["alice", "bob", "carol", "dave", ""]),
        arb_datetime(),
    )
        .prop_map(
            |(guid, owner, repository, branch, kind, action, sender, time)| Event {
                guid,
                owner,
                repository,
                branch,
                kind,
                action,
                details: String::new(),
                url: String::new(),
                sender,
                time,
            },
        )
}

pub fn arb_job() -> impl Strategy<Value = Job> {
    (
        "[a-z]{4}-[0-9]{1,4}",
        arb_word(&["presubmit", "postsubmit", "periodic"]),
        arb_word(&["acme", "globex"]),
        arb_word(&["api", "web", "cli", "docs"]),
        arb_branch_name(),
        arb_word(&["pending", "running", "success", "failure", "error", "aborted"]),
        arb_word(&["alice", "bob", "carol", "dave", "erin", ""]),
        arb_datetime(),
        prop::option::of(0u64..7200),
    )
        .prop_map(
            |(name, job_type, owner, repository, branch, state, author, start, elapsed)| {
                let end = elapsed.map(|s| start + chrono::Duration::seconds(s as i64));
                Job {
                    name,
                    job_type,
                    owner,
                    repository,
                    branch,
                    state,
                    author,
                    start: Some(start),
                    end,
                    duration: elapsed.map(Duration::from_secs),
                    ..Job::default()
                }
            },
        )
}
