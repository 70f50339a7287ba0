//! Typed webhook deliveries.
//!
//! Only the variants that become events are represented. The parser returns
//! `None` for every other event type, so matching on [`WebhookPayload`] is
//! exhaustive.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{DeliveryId, PrNumber};

/// One webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    /// Value of the `X-GitHub-Delivery` header.
    pub guid: DeliveryId,
    pub repository: Repository,
    /// Login of the user that triggered the delivery.
    pub sender: String,
    pub payload: WebhookPayload,
}

impl Webhook {
    /// Name of the variant, used as the event kind.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Repository context of a delivery. Empty for organisation-level pings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookPayload {
    /// Connectivity check sent when a hook is created.
    Ping,
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    /// A review comment on a pull request diff.
    PullRequestComment(CommentEvent),
    /// A conversation comment on an issue or pull request.
    IssueComment(CommentEvent),
}

impl WebhookPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookPayload::Ping => "ping",
            WebhookPayload::Push(_) => "push",
            WebhookPayload::PullRequest(_) => "pull_request",
            WebhookPayload::PullRequestComment(_) => "pull_request_comment",
            WebhookPayload::IssueComment(_) => "issue_comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Full ref, e.g. `refs/heads/main`.
    pub git_ref: String,
    pub created: bool,
    pub deleted: bool,
}

/// Action performed on a pull request.
///
/// Actions without special handling keep their wire name in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrAction {
    Opened,
    Closed,
    Reopened,
    Synchronize,
    Edited,
    Labeled,
    Unlabeled,
    Assigned,
    Unassigned,
    Other(String),
}

impl PrAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "opened" => PrAction::Opened,
            "closed" => PrAction::Closed,
            "reopened" => PrAction::Reopened,
            "synchronize" => PrAction::Synchronize,
            "edited" => PrAction::Edited,
            "labeled" => PrAction::Labeled,
            "unlabeled" => PrAction::Unlabeled,
            "assigned" => PrAction::Assigned,
            "unassigned" => PrAction::Unassigned,
            other => PrAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PrAction::Opened => "opened",
            PrAction::Closed => "closed",
            PrAction::Reopened => "reopened",
            PrAction::Synchronize => "synchronize",
            PrAction::Edited => "edited",
            PrAction::Labeled => "labeled",
            PrAction::Unlabeled => "unlabeled",
            PrAction::Assigned => "assigned",
            PrAction::Unassigned => "unassigned",
            PrAction::Other(action) => action,
        }
    }
}

impl fmt::Display for PrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: PrAction,
    pub number: PrNumber,
    /// Browser link to the pull request.
    pub url: String,
    /// Label added or removed, for `labeled`/`unlabeled`.
    pub label: Option<String>,
    /// Current assignee logins.
    pub assignees: Vec<String>,
}

/// Action performed on a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
}

impl CommentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentAction::Created => "created",
            CommentAction::Edited => "edited",
            CommentAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for CommentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEvent {
    pub action: CommentAction,
    /// Set when the comment is on a pull request. Always set for review
    /// comments; for issue comments only when the issue is a pull request.
    pub pr_number: Option<PrNumber>,
    pub body: String,
    /// Browser link to the comment.
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}
