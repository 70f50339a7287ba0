//! The indexed store: events, jobs and merge-queue snapshots.
//!
//! Events and jobs live in separate keyword indexes. Events are bounded by
//! count and age and collected by a background task; jobs mirror the
//! scheduler and are never collected. Merge pools and merge history are
//! plain snapshots, each behind its own lock and replaced wholesale.
//!
//! # Persistence
//!
//! With a data path configured, the event index lives on disk under
//! `<data_path>/events-v<N>/` and every write is committed there before it
//! returns. The job index is memory-only.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tantivy::TantivyError;
use tantivy::query::AllQuery;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::types::{Event, Job, MergePool, MergeRecord};

pub mod engine;
pub mod error;
mod gc;
pub mod mapping;
pub mod query;

use engine::{KeywordIndex, SearchRequest};

pub use engine::MAX_RESULTS;
pub use error::{GcError, GcFailure, GcPass, Result, StoreError};
pub use mapping::EVENTS_MAPPING_VERSION;
pub use query::{
    EventCounts, Events, EventsQuery, FacetCounts, JobCounts, Jobs, JobsQuery, MergeHistoryQuery,
    MergeStatusQuery, OTHER_BUCKET,
};

/// Upper bound on events removed by one pass of one collection.
pub const GC_BATCH_SIZE: usize = 1000;

/// Store construction options.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for the persisted event index. `None` keeps everything in
    /// memory.
    pub data_path: Option<PathBuf>,

    /// Keep at most this many events, newest first. 0 means unbounded.
    pub max_events: usize,

    /// Remove events older than this.
    pub events_max_age: Option<Duration>,

    /// Time between two background garbage collections.
    pub gc_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_path: None,
            max_events: 0,
            events_max_age: None,
            gc_interval: Duration::from_secs(60),
        }
    }
}

/// Events removed by one garbage collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub removed_by_count: usize,
    pub removed_by_age: usize,
}

impl GcReport {
    pub fn total(&self) -> usize {
        self.removed_by_count + self.removed_by_age
    }
}

/// Shared handle to the store. Cloning is cheap.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    events: KeywordIndex<Event>,
    jobs: KeywordIndex<Job>,
    merge_status: RwLock<Vec<MergePool>>,
    merge_history: RwLock<Vec<MergeRecord>>,
    gc_shutdown: CancellationToken,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Opens the store, loading the persisted event index if there is one.
    ///
    /// An unreadable or incompatible index is logged and replaced by an
    /// empty one. Failing to create the data directory, or finding the index
    /// locked by another process, is an error.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let events = match &config.data_path {
            Some(data_path) => {
                open_events(&data_path.join(format!("events-v{EVENTS_MAPPING_VERSION}")))?
            }
            None => KeywordIndex::in_memory(&mapping::EVENTS_MAPPING)?,
        };

        Ok(Store {
            inner: Arc::new(StoreInner {
                jobs: KeywordIndex::in_memory(&mapping::JOBS_MAPPING)?,
                events,
                config,
                merge_status: RwLock::new(Vec::new()),
                merge_history: RwLock::new(Vec::new()),
                gc_shutdown: CancellationToken::new(),
                gc_task: Mutex::new(None),
            }),
        })
    }

    /// Spawns the background garbage collector. Must be called from within a
    /// tokio runtime; calling it again while a collector runs does nothing.
    pub fn start_gc(&self) {
        let interval = self.inner.config.gc_interval;
        if interval.is_zero() {
            warn!("Garbage collection interval is zero, background collector disabled");
            return;
        }

        let mut slot = self
            .inner
            .gc_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(gc::run(
            self.clone(),
            interval,
            self.inner.gc_shutdown.clone(),
        )));
    }

    /// Stops the garbage collector and releases both index writers. Writes
    /// after this fail with [`StoreError::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.inner.gc_shutdown.cancel();

        let task = self
            .inner
            .gc_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Garbage collector task failed");
        }

        self.inner.events.close()?;
        self.inner.jobs.close()?;
        info!("Store closed");
        Ok(())
    }

    // ─── Events ───

    /// Inserts or overwrites an event by GUID.
    pub async fn add_event(&self, event: Event) -> Result<()> {
        self.inner.events.upsert(&event)
    }

    pub async fn get_event(&self, guid: &str) -> Result<Option<Event>> {
        self.inner.events.get(guid)
    }

    pub async fn event_count(&self) -> u64 {
        self.inner.events.len()
    }

    /// Searches events, newest first, with `Kind`, `Repository` and `Sender`
    /// facets.
    pub async fn query_events(&self, query: &EventsQuery) -> Result<Events> {
        let events = &self.inner.events;
        let parsed = events.filtered(&query.query, &query.filters())?;
        Ok(events.search(&EventsQuery::search_request(parsed))?.into())
    }

    // ─── Jobs ───

    /// Inserts or overwrites a job by name.
    pub async fn add_job(&self, job: Job) -> Result<()> {
        self.inner.jobs.upsert(&job)
    }

    /// Removes a job. Returns whether it existed; an unknown name is a no-op.
    pub async fn delete_job(&self, name: &str) -> Result<bool> {
        Ok(self.inner.jobs.delete(&[name])? > 0)
    }

    pub async fn get_job(&self, name: &str) -> Result<Option<Job>> {
        self.inner.jobs.get(name)
    }

    /// Searches jobs, most recently started first, with `State`,
    /// `Repository`, `Type` and `Author` facets.
    pub async fn query_jobs(&self, query: &JobsQuery) -> Result<Jobs> {
        let jobs = &self.inner.jobs;
        let parsed = jobs.filtered(&query.query, &query.filters())?;
        Ok(jobs.search(&JobsQuery::search_request(parsed))?.into())
    }

    // ─── Merge snapshots ───

    pub async fn set_merge_status(&self, pools: Vec<MergePool>) {
        *self.inner.merge_status.write().await = pools;
    }

    pub async fn query_merge_status(&self, query: &MergeStatusQuery) -> Vec<MergePool> {
        self.inner
            .merge_status
            .read()
            .await
            .iter()
            .filter(|pool| query.matches(pool))
            .cloned()
            .collect()
    }

    pub async fn set_merge_history(&self, records: Vec<MergeRecord>) {
        *self.inner.merge_history.write().await = records;
    }

    pub async fn query_merge_history(&self, query: &MergeHistoryQuery) -> Vec<MergeRecord> {
        self.inner
            .merge_history
            .read()
            .await
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect()
    }

    // ─── Retention ───

    /// Applies the count and age limits to the event index.
    ///
    /// Each pass searches without holding the writer and then deletes what it
    /// found in one short commit. Both passes run even if the first fails;
    /// every failure is reported in the returned [`GcError`].
    #[instrument(skip(self))]
    pub async fn collect_garbage(&self) -> std::result::Result<GcReport, GcError> {
        let config = &self.inner.config;
        let events = &self.inner.events;
        let mut report = GcReport::default();
        let mut failures = Vec::new();

        if config.max_events > 0 {
            let request = SearchRequest::new(Box::new(AllQuery))
                .with_from(config.max_events)
                .with_size(GC_BATCH_SIZE);
            match self.delete_matching(&request) {
                Ok(removed) => report.removed_by_count = removed,
                Err(source) => failures.push(GcFailure {
                    pass: GcPass::MaxEvents,
                    source,
                }),
            }
        }

        let cutoff = config
            .events_max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| Utc::now().checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            let request =
                SearchRequest::new(events.before("Time", cutoff)).with_size(GC_BATCH_SIZE);
            match self.delete_matching(&request) {
                Ok(removed) => report.removed_by_age = removed,
                Err(source) => failures.push(GcFailure {
                    pass: GcPass::MaxAge,
                    source,
                }),
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(GcError { failures })
        }
    }

    fn delete_matching(&self, request: &SearchRequest) -> Result<usize> {
        let expired = self.inner.events.search(request)?;
        let guids: Vec<&str> = expired.hits.iter().map(|e| e.guid.as_str()).collect();
        self.inner.events.delete(&guids)
    }
}

fn open_events(dir: &Path) -> Result<KeywordIndex<Event>> {
    std::fs::create_dir_all(dir)?;

    match KeywordIndex::open_in_dir(dir, &mapping::EVENTS_MAPPING) {
        Ok(events) => {
            info!(path = %dir.display(), events = events.len(), "Opened event index");
            Ok(events)
        }
        Err(e @ StoreError::Index(TantivyError::LockFailure(..))) => Err(e),
        Err(e) => {
            warn!(
                error = %e,
                path = %dir.display(),
                "Failed to open existing event index, a new empty index will be created"
            );
            std::fs::remove_dir_all(dir)?;
            std::fs::create_dir_all(dir)?;
            KeywordIndex::open_in_dir(dir, &mapping::EVENTS_MAPPING)
        }
    }
}
