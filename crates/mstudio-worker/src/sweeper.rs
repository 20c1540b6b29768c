//! Background retention sweep of job records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mstudio_queue::JobStore;

use crate::metrics;
use crate::retry::FailureTracker;

/// Consecutive sweep failures logged before going quiet.
const MAX_LOGGED_FAILURES: u32 = 3;

/// Evict records older than `retention` every `interval` until `shutdown` flips.
pub fn spawn_sweeper(
    store: Arc<dyn JobStore>,
    retention: chrono::Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting job sweeper (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; nothing can be expired yet.
        ticker.tick().await;
        let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            match store.sweep(retention, Utc::now()).await {
                Ok(removed) => {
                    failures.record_success();
                    if removed > 0 {
                        metrics::record_jobs_swept(removed);
                        debug!("Swept {} expired job records", removed);
                    }
                }
                Err(e) => {
                    if failures.record_failure() {
                        warn!("Job sweep failed: {}", e);
                    }
                }
            }
        }

        info!("Job sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_models::{JobId, JobKind, RenderJob};
    use mstudio_queue::InMemoryJobStore;

    #[tokio::test]
    async fn test_sweeper_evicts_expired_records() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let mut old = RenderJob::new(JobId::from_string("old"), JobKind::Render);
        old.created_at = Utc::now() - chrono::Duration::hours(3);
        store.insert(old).await.unwrap();
        store
            .insert(RenderJob::new(JobId::from_string("fresh"), JobKind::Render))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(
            store.clone(),
            chrono::Duration::hours(2),
            Duration::from_millis(10),
            rx,
        );

        for _ in 0..100 {
            if store.len().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get(&JobId::from_string("old")).await.unwrap().is_none());
        assert!(store.get(&JobId::from_string("fresh")).await.unwrap().is_some());

        tx.send_replace(true);
        handle.await.unwrap();
    }
}
