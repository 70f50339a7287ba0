//! HTTP surface of the observability store.
//!
//! # Endpoints
//!
//! - `POST /webhook` - webhook intake (202, or 401 on a bad signature)
//! - `POST /api/v1/jobs/watch` - signed job watch notifications for the
//!   reconciler (202, 401 on a bad signature)
//! - `GET /api/v1/events` - event search with facets
//! - `GET /api/v1/jobs` - job search with facets
//! - `GET /api/v1/events/{guid}/jobs` - jobs triggered by an event
//! - `GET /api/v1/jobs/{name}/event` - event that triggered a job
//! - `GET /api/v1/merge/status` - merge pools (`?format=yaml` for the sources)
//! - `GET /api/v1/merge/history` - merge history (`?format=yaml` likewise)
//! - `GET /health` - liveness

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::jobs::WatchEvent;
use crate::store::Store;
use crate::webhooks::{EventHandler, WebhookSecret};

pub mod api;
pub mod health;
pub mod webhook;

pub use api::{
    ApiError, event_jobs_handler, events_handler, job_event_handler, job_watch_handler,
    jobs_handler, json_to_yaml, merge_history_handler, merge_status_handler,
};
pub use health::health_handler;
pub use webhook::webhook_handler;

/// Shared application state, handed to every handler through axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,
    event_handler: EventHandler,
    webhook_secret: WebhookSecret,
    /// Feeds the job reconciler.
    jobs_tx: mpsc::Sender<WatchEvent>,
}

impl AppState {
    pub fn new(
        store: Store,
        webhook_secret: WebhookSecret,
        jobs_tx: mpsc::Sender<WatchEvent>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                event_handler: EventHandler::new(store.clone()),
                store,
                webhook_secret,
                jobs_tx,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn event_handler(&self) -> &EventHandler {
        &self.inner.event_handler
    }

    pub fn webhook_secret(&self) -> &WebhookSecret {
        &self.inner.webhook_secret
    }

    pub fn jobs_tx(&self) -> &mpsc::Sender<WatchEvent> {
        &self.inner.jobs_tx
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/api/v1/events", get(events_handler))
        .route("/api/v1/events/{guid}/jobs", get(event_jobs_handler))
        .route("/api/v1/jobs", get(jobs_handler))
        .route("/api/v1/jobs/watch", post(job_watch_handler))
        .route("/api/v1/jobs/{name}/event", get(job_event_handler))
        .route("/api/v1/merge/status", get(merge_status_handler))
        .route("/api/v1/merge/history", get(merge_history_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
