//! Periodic mirroring of the merge queue into the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::store::Store;

use super::client::StatusSource;
use super::convert::{Converted, merge_pools, merge_records};
use super::error::{Result, SyncPhase};

/// Outcome of one sync. The phases are independent: a failed history fetch
/// does not undo a successful pools update.
#[derive(Debug)]
pub struct SyncReport {
    /// Number of pools stored.
    pub pools: Result<usize>,
    /// Number of history records stored.
    pub history: Result<usize>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.pools.is_ok() && self.history.is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Syncs in which both phases succeeded.
    pub successful_syncs: u64,
    /// Individual phases that failed, across all syncs.
    pub failed_phases: u64,
}

pub struct MergeSyncer<S> {
    source: S,
    store: Store,
    successful_syncs: AtomicU64,
    failed_phases: AtomicU64,
}

impl<S: StatusSource> MergeSyncer<S> {
    pub fn new(source: S, store: Store) -> Self {
        MergeSyncer {
            source,
            store,
            successful_syncs: AtomicU64::new(0),
            failed_phases: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            successful_syncs: self.successful_syncs.load(Ordering::Relaxed),
            failed_phases: self.failed_phases.load(Ordering::Relaxed),
        }
    }

    /// Fetches and replaces both snapshots. A failed phase leaves its
    /// previous snapshot in place.
    #[instrument(skip(self))]
    pub async fn sync_once(&self) -> SyncReport {
        let pools = self.sync_pools().await;
        let history = self.sync_history().await;

        for (phase, result) in [(SyncPhase::Pools, &pools), (SyncPhase::History, &history)] {
            if let Err(e) = result {
                self.failed_phases.fetch_add(1, Ordering::Relaxed);
                warn!(%phase, error = %e, "Merge status sync failed");
            }
        }

        let report = SyncReport { pools, history };
        if report.is_success() {
            self.successful_syncs.fetch_add(1, Ordering::Relaxed);
        }
        report
    }

    async fn sync_pools(&self) -> Result<usize> {
        let document = self.source.fetch_pools().await?;
        let pools = converted(SyncPhase::Pools, merge_pools(&document)?);
        let count = pools.len();
        self.store.set_merge_status(pools).await;
        Ok(count)
    }

    async fn sync_history(&self) -> Result<usize> {
        let document = self.source.fetch_history().await?;
        let records = converted(SyncPhase::History, merge_records(&document)?);
        let count = records.len();
        self.store.set_merge_history(records).await;
        Ok(count)
    }

    /// Syncs immediately, then once per `interval` until `shutdown` fires.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Merge status syncer started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping merge status syncer");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.sync_once().await;
                    if let (Ok(pools), Ok(records)) = (&report.pools, &report.history) {
                        debug!(pools, records, "Merge status synced");
                    }
                }
            }
        }
    }
}

fn converted<T>(phase: SyncPhase, converted: Converted<T>) -> Vec<T> {
    for issue in &converted.issues {
        debug!(%phase, %issue, "Skipped malformed merge status field");
    }
    converted.items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MergeHistoryQuery, MergeStatusQuery, StoreConfig};
    use crate::sync::SyncError;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Serves canned documents; `None` answers with HTTP 503.
    struct FakeSource {
        pools: Mutex<Option<Value>>,
        history: Mutex<Option<Value>>,
    }

    impl FakeSource {
        fn new(pools: Option<Value>, history: Option<Value>) -> Self {
            FakeSource {
                pools: Mutex::new(pools),
                history: Mutex::new(history),
            }
        }

        fn answer(slot: &Mutex<Option<Value>>, path: &str) -> Result<Value> {
            slot.lock().unwrap().clone().ok_or_else(|| SyncError::Status {
                url: format!("http://keeper{path}"),
                status: 503,
            })
        }
    }

    impl StatusSource for FakeSource {
        async fn fetch_pools(&self) -> Result<Value> {
            Self::answer(&self.pools, "/")
        }

        async fn fetch_history(&self) -> Result<Value> {
            Self::answer(&self.history, "/history")
        }
    }

    fn pools_doc(branch: &str) -> Value {
        json!([{ "Org": "acme", "Repo": "api", "Branch": branch }])
    }

    fn history_doc() -> Value {
        json!({ "acme/api:main": [{ "action": "MERGE", "baseSHA": "abc" }] })
    }

    fn store() -> Store {
        Store::open(StoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn sync_replaces_both_snapshots() {
        let store = store();
        let syncer = MergeSyncer::new(
            FakeSource::new(Some(pools_doc("main")), Some(history_doc())),
            store.clone(),
        );

        let report = syncer.sync_once().await;
        assert!(report.is_success());
        assert_eq!(report.pools.unwrap(), 1);

        let pools = store.query_merge_status(&MergeStatusQuery::default()).await;
        assert_eq!(pools[0].branch, "main");
        let history = store.query_merge_history(&MergeHistoryQuery::default()).await;
        assert_eq!(history[0].base_sha, "abc");
        assert_eq!(syncer.stats(), SyncStats { successful_syncs: 1, failed_phases: 0 });
    }

    #[tokio::test]
    async fn failed_phase_keeps_previous_snapshot() {
        let store = store();
        let source = FakeSource::new(Some(pools_doc("main")), Some(history_doc()));
        let syncer = MergeSyncer::new(source, store.clone());
        syncer.sync_once().await;

        // Pools now fail, history moves on.
        *syncer.source.pools.lock().unwrap() = None;
        *syncer.source.history.lock().unwrap() = Some(json!({}));
        let report = syncer.sync_once().await;

        assert!(matches!(report.pools, Err(SyncError::Status { status: 503, .. })));
        assert_eq!(report.history.unwrap(), 0);

        let pools = store.query_merge_status(&MergeStatusQuery::default()).await;
        assert_eq!(pools.len(), 1, "previous pools snapshot must survive");
        let history = store.query_merge_history(&MergeHistoryQuery::default()).await;
        assert!(history.is_empty());

        assert_eq!(syncer.stats(), SyncStats { successful_syncs: 1, failed_phases: 1 });
    }

    #[tokio::test]
    async fn malformed_top_level_is_counted_as_failure() {
        let store = store();
        let syncer = MergeSyncer::new(
            FakeSource::new(Some(json!("nope")), Some(json!(true))),
            store,
        );

        let report = syncer.sync_once().await;
        assert!(matches!(report.pools, Err(SyncError::Parse { .. })));
        assert!(matches!(report.history, Err(SyncError::Parse { .. })));
        assert_eq!(syncer.stats().failed_phases, 2);
    }

    #[tokio::test]
    async fn run_syncs_immediately_and_stops_on_cancel() {
        let store = store();
        let syncer = MergeSyncer::new(
            FakeSource::new(Some(pools_doc("main")), Some(history_doc())),
            store.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(syncer.run(Duration::from_secs(3600), shutdown.clone()));

        let mut synced = false;
        for _ in 0..100 {
            if !store.query_merge_status(&MergeStatusQuery::default()).await.is_empty() {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(synced, "initial sync did not happen");

        shutdown.cancel();
        task.await.unwrap();
    }
}
