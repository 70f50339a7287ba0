//! Index mappings for events and jobs.

use crate::types::{Event, Job};

use super::engine::{Document, FieldValue, Mapping};

/// Version of the event index layout. Bump when the event fields or their
/// types change so an old persisted index is not misread.
pub const EVENTS_MAPPING_VERSION: u32 = 1;

pub static EVENTS_MAPPING: Mapping = Mapping {
    id: "GUID",
    keywords: &[
        "GUID",
        "Owner",
        "Repository",
        "Branch",
        "Kind",
        "Action",
        "Details",
        "URL",
        "Sender",
    ],
    dates: &["Time"],
    numbers: &[],
    order_by: "Time",
};

/// `Duration` is indexed in milliseconds.
pub static JOBS_MAPPING: Mapping = Mapping {
    id: "Name",
    keywords: &[
        "Name",
        "Type",
        "EventGUID",
        "Owner",
        "Repository",
        "Branch",
        "Build",
        "Context",
        "Author",
        "State",
        "Description",
        "ReportURL",
        "TraceID",
    ],
    dates: &["Start", "End"],
    numbers: &["Duration"],
    order_by: "Start",
};

impl Document for Event {
    fn id(&self) -> &str {
        &self.guid
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        vec![
            ("GUID", FieldValue::Keyword(&self.guid)),
            ("Owner", FieldValue::Keyword(&self.owner)),
            ("Repository", FieldValue::Keyword(&self.repository)),
            ("Branch", FieldValue::Keyword(&self.branch)),
            ("Kind", FieldValue::Keyword(&self.kind)),
            ("Action", FieldValue::Keyword(&self.action)),
            ("Details", FieldValue::Keyword(&self.details)),
            ("URL", FieldValue::Keyword(&self.url)),
            ("Sender", FieldValue::Keyword(&self.sender)),
            ("Time", FieldValue::Date(self.time)),
        ]
    }
}

impl Document for Job {
    fn id(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        let mut fields = vec![
            ("Name", FieldValue::Keyword(&self.name)),
            ("Type", FieldValue::Keyword(&self.job_type)),
            ("EventGUID", FieldValue::Keyword(&self.event_guid)),
            ("Owner", FieldValue::Keyword(&self.owner)),
            ("Repository", FieldValue::Keyword(&self.repository)),
            ("Branch", FieldValue::Keyword(&self.branch)),
            ("Build", FieldValue::Keyword(&self.build)),
            ("Context", FieldValue::Keyword(&self.context)),
            ("Author", FieldValue::Keyword(&self.author)),
            ("State", FieldValue::Keyword(&self.state)),
            ("Description", FieldValue::Keyword(&self.description)),
            ("ReportURL", FieldValue::Keyword(&self.report_url)),
            ("TraceID", FieldValue::Keyword(&self.trace_id)),
        ];
        if let Some(start) = self.start {
            fields.push(("Start", FieldValue::Date(start)));
        }
        if let Some(end) = self.end {
            fields.push(("End", FieldValue::Date(end)));
        }
        if let Some(duration) = self.duration {
            let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            fields.push(("Duration", FieldValue::Number(millis)));
        }
        fields
    }
}
