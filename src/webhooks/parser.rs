//! GitHub webhook payload parser.
//!
//! # Parsing Strategy
//!
//! 1. The event type comes from the `X-GitHub-Event` header
//! 2. The payload is decoded into raw serde structs for that type
//! 3. Raw structs are converted into a typed [`Webhook`]
//! 4. Unknown event types return `Ok(None)` (ignored, not an error)
//!
//! The delivery GUID comes from the `X-GitHub-Delivery` header and is passed
//! in by the caller.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{DeliveryId, PrNumber};

use super::events::{
    CommentAction, CommentEvent, PrAction, PullRequestEvent, PushEvent, Repository, Webhook,
    WebhookPayload,
};

#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed delivery.
///
/// * `Ok(Some(webhook))` for a supported event type
/// * `Ok(None)` for any other event type
/// * `Err(e)` for a malformed payload
pub fn parse_webhook(
    event_type: &str,
    delivery_id: DeliveryId,
    payload: &[u8],
) -> Result<Option<Webhook>, ParseError> {
    let parsed = match event_type {
        "ping" => parse_ping(payload)?,
        "push" => parse_push(payload)?,
        "pull_request" => parse_pull_request(payload)?,
        "pull_request_review_comment" => parse_review_comment(payload)?,
        "issue_comment" => parse_issue_comment(payload)?,
        _ => return Ok(None),
    };

    let (repository, sender, payload) = parsed;
    Ok(Some(Webhook {
        guid: delivery_id,
        repository: repository.map(Repository::from).unwrap_or_default(),
        sender: sender.map(|s| s.login).unwrap_or_default(),
        payload,
    }))
}

type Parsed = (Option<RawRepository>, Option<RawUser>, WebhookPayload);

// ─── Raw payload structures ───

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawUser,
    name: String,
    #[serde(default)]
    default_branch: Option<String>,
}

impl From<RawRepository> for Repository {
    fn from(raw: RawRepository) -> Self {
        Repository {
            owner: raw.owner.login,
            name: raw.name,
            default_branch: raw.default_branch.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn parse_comment_action(action: &str) -> Result<CommentAction, ParseError> {
    match action {
        "created" => Ok(CommentAction::Created),
        "edited" => Ok(CommentAction::Edited),
        "deleted" => Ok(CommentAction::Deleted),
        other => Err(ParseError::InvalidField {
            field: "action",
            value: other.to_string(),
        }),
    }
}

fn comment_event(
    action: CommentAction,
    pr_number: Option<PrNumber>,
    comment: RawComment,
) -> CommentEvent {
    CommentEvent {
        action,
        pr_number,
        body: comment.body.unwrap_or_default(),
        url: comment.html_url.unwrap_or_default(),
        created_at: comment.created_at,
    }
}

// ─── ping ───

#[derive(Debug, Deserialize)]
struct RawPingPayload {
    #[serde(default)]
    repository: Option<RawRepository>,
    #[serde(default)]
    sender: Option<RawUser>,
}

fn parse_ping(payload: &[u8]) -> Result<Parsed, ParseError> {
    let raw: RawPingPayload = serde_json::from_slice(payload)?;
    Ok((raw.repository, raw.sender, WebhookPayload::Ping))
}

// ─── push ───

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    created: bool,
    #[serde(default)]
    deleted: bool,
    repository: RawRepository,
    #[serde(default)]
    sender: Option<RawUser>,
}

fn parse_push(payload: &[u8]) -> Result<Parsed, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;
    let push = PushEvent {
        git_ref: raw.git_ref,
        created: raw.created,
        deleted: raw.deleted,
    };
    Ok((Some(raw.repository), raw.sender, WebhookPayload::Push(push)))
}

// ─── pull_request ───

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
    #[serde(default)]
    label: Option<RawLabel>,
    repository: RawRepository,
    #[serde(default)]
    sender: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assignees: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

fn parse_pull_request(payload: &[u8]) -> Result<Parsed, ParseError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
    let event = PullRequestEvent {
        action: PrAction::parse(&raw.action),
        number: PrNumber(raw.pull_request.number),
        url: raw.pull_request.html_url.unwrap_or_default(),
        label: raw.label.map(|l| l.name),
        assignees: raw
            .pull_request
            .assignees
            .into_iter()
            .map(|u| u.login)
            .collect(),
    };
    Ok((
        Some(raw.repository),
        raw.sender,
        WebhookPayload::PullRequest(event),
    ))
}

// ─── pull_request_review_comment ───

#[derive(Debug, Deserialize)]
struct RawReviewCommentPayload {
    action: String,
    comment: RawComment,
    pull_request: RawPullRequestRef,
    repository: RawRepository,
    #[serde(default)]
    sender: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestRef {
    number: u64,
}

fn parse_review_comment(payload: &[u8]) -> Result<Parsed, ParseError> {
    let raw: RawReviewCommentPayload = serde_json::from_slice(payload)?;
    let action = parse_comment_action(&raw.action)?;
    let event = comment_event(action, Some(PrNumber(raw.pull_request.number)), raw.comment);
    Ok((
        Some(raw.repository),
        raw.sender,
        WebhookPayload::PullRequestComment(event),
    ))
}

// ─── issue_comment ───

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    action: String,
    comment: RawComment,
    issue: RawIssue,
    repository: RawRepository,
    #[serde(default)]
    sender: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    // Present only when the issue is a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

fn parse_issue_comment(payload: &[u8]) -> Result<Parsed, ParseError> {
    let raw: RawIssueCommentPayload = serde_json::from_slice(payload)?;
    let action = parse_comment_action(&raw.action)?;
    let pr_number = raw
        .issue
        .pull_request
        .filter(|v| !v.is_null())
        .map(|_| PrNumber(raw.issue.number));
    let event = comment_event(action, pr_number, raw.comment);
    Ok((
        Some(raw.repository),
        raw.sender,
        WebhookPayload::IssueComment(event),
    ))
}
