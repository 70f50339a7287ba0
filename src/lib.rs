//! CI Watchtower - an observability store for CI pipelines.
//!
//! Ingests webhook deliveries and scheduler job objects, polls the merge
//! queue, and serves all three from a bounded, faceted in-memory index.

pub mod config;
pub mod jobs;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
