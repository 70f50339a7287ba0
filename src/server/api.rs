//! Read-only query endpoints over the store, plus the job watch bridge.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use super::webhook::{HEADER_SIGNATURE, header};
use crate::jobs::WatchEvent;
use crate::store::{
    Events, EventsQuery, Jobs, JobsQuery, MergeHistoryQuery, MergeStatusQuery, StoreError,
};
use crate::types::{Event, PR_BRANCH_PREFIX};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("YAML export failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("job reconciler is not running")]
    ReconcilerStopped,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed watch notification: {0}")]
    MalformedNotification(#[source] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(_) | ApiError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ReconcilerStopped => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ApiError::MalformedNotification(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

/// `pr-17` as typed in a browser is stored as `PR-17`.
fn normalize_branch(branch: &mut String) {
    let lower = PR_BRANCH_PREFIX.to_ascii_lowercase();
    if let Some(number) = branch.strip_prefix(lower.as_str()) {
        *branch = format!("{PR_BRANCH_PREFIX}{number}");
    }
}

/// `GET /api/v1/events`
pub async fn events_handler(
    State(app_state): State<AppState>,
    Query(mut query): Query<EventsQuery>,
) -> Result<Json<Events>, ApiError> {
    normalize_branch(&mut query.branch);
    Ok(Json(app_state.store().query_events(&query).await?))
}

/// `GET /api/v1/jobs`
pub async fn jobs_handler(
    State(app_state): State<AppState>,
    Query(mut query): Query<JobsQuery>,
) -> Result<Json<Jobs>, ApiError> {
    normalize_branch(&mut query.branch);
    Ok(Json(app_state.store().query_jobs(&query).await?))
}

/// `GET /api/v1/events/{guid}/jobs`: the jobs an event triggered.
pub async fn event_jobs_handler(
    State(app_state): State<AppState>,
    Path(guid): Path<String>,
) -> Result<Json<Jobs>, ApiError> {
    let query = JobsQuery {
        event_guid: guid,
        ..JobsQuery::default()
    };
    Ok(Json(app_state.store().query_jobs(&query).await?))
}

/// `GET /api/v1/jobs/{name}/event`: the event that triggered a job.
pub async fn job_event_handler(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let store = app_state.store();
    let job = store
        .get_job(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {name}")))?;
    let event = store
        .get_event(&job.event_guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event for job {name}")))?;
    Ok(Json(event))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    /// The retained source documents, as YAML.
    Yaml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormatParam {
    pub format: ExportFormat,
}

/// `GET /api/v1/merge/status`
pub async fn merge_status_handler(
    State(app_state): State<AppState>,
    Query(query): Query<MergeStatusQuery>,
    Query(FormatParam { format }): Query<FormatParam>,
) -> Result<Response, ApiError> {
    let pools = app_state.store().query_merge_status(&query).await;
    match format {
        ExportFormat::Json => Ok(Json(pools).into_response()),
        ExportFormat::Yaml => yaml_response(pools.iter().map(|pool| &pool.source)),
    }
}

/// `GET /api/v1/merge/history`
pub async fn merge_history_handler(
    State(app_state): State<AppState>,
    Query(query): Query<MergeHistoryQuery>,
    Query(FormatParam { format }): Query<FormatParam>,
) -> Result<Response, ApiError> {
    let records = app_state.store().query_merge_history(&query).await;
    match format {
        ExportFormat::Json => Ok(Json(records).into_response()),
        ExportFormat::Yaml => yaml_response(records.iter().map(|record| &record.source)),
    }
}

fn yaml_response<'a>(
    documents: impl Iterator<Item = &'a serde_json::Value>,
) -> Result<Response, ApiError> {
    let sequence = serde_yaml::Value::Sequence(documents.map(json_to_yaml).collect());
    let body = serde_yaml::to_string(&sequence)?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], body).into_response())
}

/// Converts a JSON tree into a YAML tree.
///
/// Serializing a lossless JSON number straight into YAML would emit its
/// internal representation, so numbers are narrowed here. Values outside
/// the native ranges keep their exact text as a string.
pub fn json_to_yaml(value: &serde_json::Value) -> serde_yaml::Value {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    match value {
        Json::Null => Yaml::Null,
        Json::Bool(b) => Yaml::Bool(*b),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Yaml::Number(u.into())
            } else if let Some(i) = n.as_i64() {
                Yaml::Number(i.into())
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Yaml::Number(f.into()),
                    _ => Yaml::String(n.to_string()),
                }
            }
        }
        Json::String(s) => Yaml::String(s.clone()),
        Json::Array(items) => Yaml::Sequence(items.iter().map(json_to_yaml).collect()),
        Json::Object(map) => Yaml::Mapping(
            map.iter()
                .map(|(k, v)| (Yaml::String(k.clone()), json_to_yaml(v)))
                .collect(),
        ),
    }
}

/// `POST /api/v1/jobs/watch`: forwards one watch notification to the job
/// reconciler.
///
/// Notifications are signed with the webhook secret, in the same
/// `X-Hub-Signature-256` header as webhook deliveries.
pub async fn job_watch_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if !app_state
        .webhook_secret()
        .verify(&body, header(&headers, HEADER_SIGNATURE))
    {
        warn!("Invalid job watch signature");
        return Err(ApiError::InvalidSignature);
    }
    let event: WatchEvent =
        serde_json::from_slice(&body).map_err(ApiError::MalformedNotification)?;

    debug!(kind = ?event.kind, "Received job watch notification");
    app_state
        .jobs_tx()
        .send(event)
        .await
        .map_err(|_| ApiError::ReconcilerStopped)?;
    Ok(StatusCode::ACCEPTED)
}
