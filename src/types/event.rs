//! Normalized repository events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PrNumber;

/// One normalized notification derived from a webhook delivery.
///
/// Events are created once by the webhook normalizer and never modified;
/// only garbage collection removes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Delivery GUID. Primary key in the event index.
    #[serde(rename = "GUID")]
    pub guid: String,
    pub owner: String,
    pub repository: String,
    /// Branch name, or `PR-<n>` for pull-request scoped events.
    pub branch: String,
    /// Webhook variant name (`push`, `pull_request`, ...).
    pub kind: String,
    pub action: String,
    pub details: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub sender: String,
    pub time: DateTime<Utc>,
}

impl Event {
    /// Creates an event with only the GUID and time set.
    pub fn new(guid: impl Into<String>, time: DateTime<Utc>) -> Self {
        Event {
            guid: guid.into(),
            owner: String::new(),
            repository: String::new(),
            branch: String::new(),
            kind: String::new(),
            action: String::new(),
            details: String::new(),
            url: String::new(),
            sender: String::new(),
            time,
        }
    }

    /// The pull request this event belongs to, if its branch is `PR-<n>`.
    pub fn pull_request_number(&self) -> Option<PrNumber> {
        PrNumber::from_branch(&self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_number_from_pr_branch() {
        let mut event = Event::new("guid-1", Utc::now());
        event.branch = "PR-17".to_string();
        assert_eq!(event.pull_request_number(), Some(PrNumber(17)));
    }

    #[test]
    fn pull_request_number_absent_for_regular_branch() {
        let mut event = Event::new("guid-1", Utc::now());
        event.branch = "main".to_string();
        assert_eq!(event.pull_request_number(), None);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let event = Event::new("guid-1", Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["GUID"], "guid-1");
        assert!(json.get("URL").is_some());
        assert!(json.get("Time").is_some());
        assert!(json.get("Owner").is_some());
    }
}
