//! Scheduler job objects and the reconciler that mirrors them into the store.
//!
//! The reconciler consumes a channel of watch notifications. Whatever watches
//! the scheduler (an informer, or the HTTP bridge in [`crate::server`]) only
//! has to send [`WatchEvent`]s into that channel.

pub mod object;
pub mod reconciler;

pub use object::{JobObject, project_job};
pub use reconciler::{JobReconciler, WatchEvent, WatchEventKind};
