//! Background garbage collection of the event index.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Store;

/// Collects garbage every `interval` until `shutdown` is cancelled.
///
/// The first collection runs one full interval after start.
pub(super) async fn run(store: Store, interval: Duration, shutdown: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Store garbage collector started");

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Store garbage collector exiting");
                break;
            }

            _ = ticker.tick() => match store.collect_garbage().await {
                Ok(report) if report.total() > 0 => info!(
                    removed_by_count = report.removed_by_count,
                    removed_by_age = report.removed_by_age,
                    "Removed expired events"
                ),
                Ok(_) => debug!("Garbage collection found nothing to remove"),
                Err(e) => warn!(error = %e, "Garbage collection failed"),
            },
        }
    }
}
