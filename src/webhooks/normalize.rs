//! Conversion of webhook deliveries into stored events.
//!
//! Each variant maps to an [`Event`] in two steps: a variant-specific mapping
//! fills what the variant knows, then common defaults (kind, repository,
//! default branch, ingestion time) fill the rest.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::store::{Store, StoreError};
use crate::types::Event;

use super::events::{CommentEvent, PrAction, PullRequestEvent, PushEvent, Webhook, WebhookPayload};

/// Maximum length of a comment summary, including the ellipsis.
pub const COMMENT_SUMMARY_LEN: usize = 50;

const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to store event: {0}")]
    Write(#[from] StoreError),
}

/// Builds the event for a delivery. `now` is used when the delivery carries
/// no time of its own.
pub fn normalize(webhook: &Webhook, now: DateTime<Utc>) -> Event {
    let mut event = Event::new(webhook.guid.as_str(), now);
    event.sender = webhook.sender.clone();

    let time = match &webhook.payload {
        WebhookPayload::Ping => None,
        WebhookPayload::Push(push) => {
            apply_push(&mut event, push);
            None
        }
        WebhookPayload::PullRequest(pr) => {
            apply_pull_request(&mut event, pr);
            None
        }
        WebhookPayload::PullRequestComment(comment) | WebhookPayload::IssueComment(comment) => {
            apply_comment(&mut event, comment);
            comment.created_at
        }
    };

    event.kind = webhook.kind().to_string();
    event.owner = webhook.repository.owner.clone();
    event.repository = webhook.repository.name.clone();
    if event.branch.is_empty() {
        event.branch = webhook.repository.default_branch.clone();
    }
    if let Some(time) = time {
        event.time = time;
    }
    event
}

fn apply_push(event: &mut Event, push: &PushEvent) {
    let name = push
        .git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| push.git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(&push.git_ref);

    event.branch = name.to_string();
    event.details = name.to_string();
    event.action = if push.created {
        "create".to_string()
    } else if push.deleted {
        "delete".to_string()
    } else {
        String::new()
    };
}

fn apply_pull_request(event: &mut Event, pr: &PullRequestEvent) {
    event.action = pr.action.to_string();
    event.details = match &pr.action {
        PrAction::Labeled | PrAction::Unlabeled => {
            format!("{}: {}", pr.action, pr.label.as_deref().unwrap_or_default())
        }
        PrAction::Assigned | PrAction::Unassigned => {
            format!("{}. Assignees: {}", pr.action, pr.assignees.join(", "))
        }
        other => other.to_string(),
    };
    event.branch = pr.number.branch_name();
    event.url = pr.url.clone();
}

fn apply_comment(event: &mut Event, comment: &CommentEvent) {
    event.action = comment.action.to_string();
    event.details = abbreviate(&comment.body, COMMENT_SUMMARY_LEN);
    event.branch = comment
        .pr_number
        .map(|n| n.branch_name())
        .unwrap_or_default();
    event.url = comment.url.clone();
}

/// Shortens `text` to at most `max_chars` characters, ending with `...`.
///
/// The cut is moved back to the last whitespace when there is one, so words
/// are not split. Text that already fits is returned unchanged.
pub fn abbreviate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];

    // The character right after the cut being whitespace means the head
    // already ends on a word boundary.
    let on_boundary = text[cut..].starts_with(char::is_whitespace);
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if !on_boundary && space > 0 => &head[..space],
        _ => head,
    };

    format!("{}{ELLIPSIS}", head.trim_end())
}

/// Normalizes deliveries into the store.
#[derive(Clone)]
pub struct EventHandler {
    store: Store,
}

impl EventHandler {
    pub fn new(store: Store) -> Self {
        EventHandler { store }
    }

    #[instrument(skip(self, webhook), fields(repo = %webhook.repository.full_name(), kind = webhook.kind(), guid = %webhook.guid))]
    pub async fn handle_webhook(&self, webhook: &Webhook) -> Result<Event, NormalizeError> {
        let event = normalize(webhook, Utc::now());
        debug!(branch = %event.branch, "Storing webhook event");
        self.store.add_event(event.clone()).await?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventsQuery, StoreConfig};
    use crate::types::{DeliveryId, PrNumber};
    use crate::webhooks::events::{CommentAction, Repository};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn webhook(payload: WebhookPayload) -> Webhook {
        Webhook {
            guid: DeliveryId::new("guid-1"),
            repository: Repository {
                owner: "acme".to_string(),
                name: "api".to_string(),
                default_branch: "main".to_string(),
            },
            sender: "octocat".to_string(),
            payload,
        }
    }

    fn pull_request(action: PrAction) -> PullRequestEvent {
        PullRequestEvent {
            action,
            number: PrNumber(17),
            url: "https://github.com/acme/api/pull/17".to_string(),
            label: None,
            assignees: vec![],
        }
    }

    fn comment(pr_number: Option<PrNumber>, body: &str) -> CommentEvent {
        CommentEvent {
            action: CommentAction::Created,
            pr_number,
            body: body.to_string(),
            url: "https://github.com/acme/api/issues/9#issuecomment-1".to_string(),
            created_at: None,
        }
    }

    // ─── Variant mapping ───

    #[test]
    fn ping_has_guid_sender_and_defaults() {
        let event = normalize(&webhook(WebhookPayload::Ping), now());

        assert_eq!(event.guid, "guid-1");
        assert_eq!(event.sender, "octocat");
        assert_eq!(event.kind, "ping");
        assert_eq!(event.owner, "acme");
        assert_eq!(event.repository, "api");
        assert_eq!(event.branch, "main");
        assert_eq!(event.time, now());
        assert_eq!(event.action, "");
    }

    #[test]
    fn push_creating_branch() {
        let push = PushEvent {
            git_ref: "refs/heads/main".to_string(),
            created: true,
            deleted: false,
        };
        let event = normalize(&webhook(WebhookPayload::Push(push)), now());

        assert_eq!(event.branch, "main");
        assert_eq!(event.details, "main");
        assert_eq!(event.action, "create");
        assert_eq!(event.kind, "push");
    }

    #[test]
    fn push_deleting_tag() {
        let push = PushEvent {
            git_ref: "refs/tags/v1.2.0".to_string(),
            created: false,
            deleted: true,
        };
        let event = normalize(&webhook(WebhookPayload::Push(push)), now());

        assert_eq!(event.branch, "v1.2.0");
        assert_eq!(event.action, "delete");
    }

    #[test]
    fn push_create_wins_over_delete() {
        let push = PushEvent {
            git_ref: "refs/heads/x".to_string(),
            created: true,
            deleted: true,
        };
        let event = normalize(&webhook(WebhookPayload::Push(push)), now());
        assert_eq!(event.action, "create");
    }

    #[test]
    fn ordinary_push_has_no_action() {
        let push = PushEvent {
            git_ref: "refs/heads/dev".to_string(),
            created: false,
            deleted: false,
        };
        let event = normalize(&webhook(WebhookPayload::Push(push)), now());
        assert_eq!(event.action, "");
        assert_eq!(event.branch, "dev");
    }

    #[test]
    fn pull_request_opened() {
        let event = normalize(
            &webhook(WebhookPayload::PullRequest(pull_request(PrAction::Opened))),
            now(),
        );

        assert_eq!(event.branch, "PR-17");
        assert_eq!(event.action, "opened");
        assert_eq!(event.details, "opened");
        assert_eq!(event.url, "https://github.com/acme/api/pull/17");
        assert_eq!(event.kind, "pull_request");
    }

    #[test]
    fn pull_request_labeled_details() {
        let mut pr = pull_request(PrAction::Labeled);
        pr.label = Some("bug".to_string());
        let event = normalize(&webhook(WebhookPayload::PullRequest(pr)), now());
        assert_eq!(event.details, "labeled: bug");
    }

    #[test]
    fn pull_request_assigned_details() {
        let mut pr = pull_request(PrAction::Unassigned);
        pr.assignees = vec!["alice".to_string(), "bob".to_string()];
        let event = normalize(&webhook(WebhookPayload::PullRequest(pr)), now());
        assert_eq!(event.details, "unassigned. Assignees: alice, bob");
    }

    #[test]
    fn review_comment_uses_comment_time_and_link() {
        let mut c = comment(Some(PrNumber(5)), "looks good");
        let created = Utc.with_ymd_and_hms(2024, 6, 30, 8, 0, 0).unwrap();
        c.created_at = Some(created);
        let event = normalize(&webhook(WebhookPayload::PullRequestComment(c)), now());

        assert_eq!(event.branch, "PR-5");
        assert_eq!(event.action, "created");
        assert_eq!(event.details, "looks good");
        assert_eq!(event.time, created);
        assert_eq!(event.kind, "pull_request_comment");
        assert!(event.url.contains("issuecomment"));
    }

    #[test]
    fn issue_comment_on_plain_issue_falls_back_to_default_branch() {
        let event = normalize(
            &webhook(WebhookPayload::IssueComment(comment(None, "hi"))),
            now(),
        );
        assert_eq!(event.branch, "main");
        assert_eq!(event.kind, "issue_comment");
    }

    #[test]
    fn issue_comment_without_default_branch_has_empty_branch() {
        let mut hook = webhook(WebhookPayload::IssueComment(comment(None, "hi")));
        hook.repository.default_branch = String::new();
        let event = normalize(&hook, now());
        assert_eq!(event.branch, "");
    }

    #[test]
    fn issue_comment_on_pull_request() {
        let event = normalize(
            &webhook(WebhookPayload::IssueComment(comment(Some(PrNumber(9)), "hi"))),
            now(),
        );
        assert_eq!(event.branch, "PR-9");
    }

    // ─── Abbreviation ───

    #[test]
    fn abbreviate_keeps_short_text() {
        assert_eq!(abbreviate("short comment", 50), "short comment");
        assert_eq!(abbreviate(&"x".repeat(50), 50), "x".repeat(50));
    }

    #[test]
    fn abbreviate_cuts_at_word_boundary() {
        let body = "This change looks reasonable but please add a test for the empty case";
        let short = abbreviate(body, 50);

        assert!(short.ends_with("..."));
        assert!(short.chars().count() <= 50);
        assert_eq!(short, "This change looks reasonable but please add a...");
    }

    #[test]
    fn abbreviate_without_spaces_cuts_hard() {
        let short = abbreviate(&"a".repeat(80), 50);
        assert_eq!(short, format!("{}...", "a".repeat(47)));
    }

    #[test]
    fn abbreviate_counts_characters_not_bytes() {
        let body = "é".repeat(60);
        let short = abbreviate(&body, 50);
        assert_eq!(short.chars().count(), 50);
    }

    // ─── Handler ───

    #[tokio::test]
    async fn handler_stores_event() {
        let store = Store::open(StoreConfig::default()).unwrap();
        let handler = EventHandler::new(store.clone());

        let stored = handler
            .handle_webhook(&webhook(WebhookPayload::Ping))
            .await
            .unwrap();

        let events = store.query_events(&EventsQuery::default()).await.unwrap();
        assert_eq!(events.events, vec![stored]);
    }

    #[tokio::test]
    async fn handler_reports_write_error() {
        let store = Store::open(StoreConfig::default()).unwrap();
        let handler = EventHandler::new(store);

        let mut hook = webhook(WebhookPayload::Ping);
        hook.guid = DeliveryId::new("");
        let result = handler.handle_webhook(&hook).await;
        assert!(matches!(result, Err(NormalizeError::Write(_))));
    }
}
