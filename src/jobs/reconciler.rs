//! Keeps the job index in step with the scheduler's watch stream.

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::Store;

use super::object::{JobObject, project_job};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// One watch notification: the change kind plus the raw job object.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventKind,
    pub object: serde_json::Value,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, object: serde_json::Value) -> Self {
        WatchEvent { kind, object }
    }
}

/// Applies watch notifications to the store.
///
/// Adds and updates overwrite by name, deletes remove by name. Repeated or
/// reordered notifications settle on the last one applied.
#[derive(Clone)]
pub struct JobReconciler {
    store: Store,
}

impl JobReconciler {
    pub fn new(store: Store) -> Self {
        JobReconciler { store }
    }

    /// Applies one notification. Objects that do not decode as a job are
    /// logged and skipped.
    pub async fn handle(&self, event: WatchEvent) {
        let object: JobObject = match serde_json::from_value(event.object) {
            Ok(object) => object,
            Err(e) => {
                warn!(kind = ?event.kind, error = %e, "Ignoring watch object that is not a job");
                return;
            }
        };
        let name = object.metadata.name.clone();

        match event.kind {
            WatchEventKind::Added | WatchEventKind::Modified => {
                debug!(job = %name, kind = ?event.kind, "Indexing job");
                if let Err(e) = self.store.add_job(project_job(&object)).await {
                    error!(job = %name, error = %e, "Failed to index job");
                }
            }
            WatchEventKind::Deleted => match self.store.delete_job(&name).await {
                Ok(existed) => debug!(job = %name, existed, "Deleted job"),
                Err(e) => error!(job = %name, error = %e, "Failed to delete job"),
            },
        }
    }

    /// Consumes notifications until `shutdown` fires or every sender is
    /// dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<WatchEvent>, shutdown: CancellationToken) {
        info!("Job reconciler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping job reconciler");
                    break;
                }

                event = rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("Watch channel closed, stopping job reconciler");
                        break;
                    }
                },
            }
        }
    }
}
