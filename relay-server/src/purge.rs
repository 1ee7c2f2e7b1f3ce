//! Periodic blanket purge of the session store.
//!
//! Every interval, enumerate all keys and delete them. There is no age or
//! per-session filtering: every session is wiped on each pass. Listing uses
//! the store's full key enumeration, so a pass costs O(keyspace).

use crate::store::{SessionStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Where the purge loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeState {
    Idle,
    Purging,
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every key currently in the store.
///
/// A failed delete is logged and skipped. Only a failure to list keys fails
/// the pass.
pub async fn purge_once(store: &dyn SessionStore) -> Result<PurgeReport, StoreError> {
    let keys = store.list_keys().await?;
    let mut report = PurgeReport::default();

    for key in &keys {
        match store.delete(key).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    key = %String::from_utf8_lossy(key),
                    error = %e,
                    "Failed to delete session during purge"
                );
            }
        }
    }

    Ok(report)
}

/// Background task that runs [`purge_once`] on a fixed interval.
pub struct PurgeTask {
    store: Arc<dyn SessionStore>,
    interval: Duration,
}

impl PurgeTask {
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start the loop. The first pass runs one full interval from now.
    ///
    /// Dropping the returned handle also stops the loop.
    pub fn spawn(self) -> PurgeHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let state = Arc::new(RwLock::new(PurgeState::Idle));
        let passes = Arc::new(AtomicU64::new(0));

        let task_state = Arc::clone(&state);
        let task_passes = Arc::clone(&passes);
        let Self { store, interval } = self;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = interval.as_secs(), store = store.name(), "Purge task started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Purge task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        *task_state.write().await = PurgeState::Purging;

                        match purge_once(store.as_ref()).await {
                            Ok(report) => tracing::info!(
                                deleted = report.deleted,
                                failed = report.failed,
                                "Purged session store"
                            ),
                            Err(e) => tracing::error!(error = %e, "Purge pass failed to list keys"),
                        }

                        task_passes.fetch_add(1, Ordering::SeqCst);
                        *task_state.write().await = PurgeState::Idle;
                    }
                }
            }
        });

        PurgeHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
            state,
            passes,
        }
    }
}

/// Control handle for a running [`PurgeTask`].
pub struct PurgeHandle {
    shutdown_tx: Option<mpsc::Sender<()>>,
    join: JoinHandle<()>,
    state: Arc<RwLock<PurgeState>>,
    passes: Arc<AtomicU64>,
}

impl PurgeHandle {
    pub async fn state(&self) -> PurgeState {
        *self.state.read().await
    }

    /// Number of passes completed so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Stop future passes and wait for the loop to exit.
    ///
    /// A pass already running is allowed to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Err(e) = (&mut self.join).await {
            tracing::error!(error = %e, "Purge task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn seeded_store(keys: &[&str]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for key in keys {
            store.set(key, b"[]").await.unwrap();
        }
        store
    }

    /// In-memory store whose delete fails for one key.
    struct StickyStore {
        inner: InMemoryStore,
        sticky: String,
    }

    #[async_trait]
    impl SessionStore for StickyStore {
        fn name(&self) -> &str {
            "sticky"
        }
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            self.inner.set(key, value).await
        }
        async fn delete(&self, key: &[u8]) -> StoreResult<()> {
            if key == self.sticky.as_bytes() {
                return Err(StoreError::Command("READONLY".into()));
            }
            self.inner.delete(key).await
        }
        async fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
            self.inner.list_keys().await
        }
        async fn is_healthy(&self) -> bool {
            true
        }
    }

    /// Keyspace shared with other clients, which may write binary keys.
    #[derive(Default)]
    struct BinaryKeyStore {
        keys: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl SessionStore for BinaryKeyStore {
        fn name(&self) -> &str {
            "binary"
        }
        async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn set(&self, key: &str, _value: &[u8]) -> StoreResult<()> {
            self.keys.lock().unwrap().push(key.as_bytes().to_vec());
            Ok(())
        }
        async fn delete(&self, key: &[u8]) -> StoreResult<()> {
            self.keys.lock().unwrap().retain(|k| k != key);
            Ok(())
        }
        async fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
            Ok(self.keys.lock().unwrap().clone())
        }
        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_purge_once_deletes_everything() {
        let store = seeded_store(&["a", "b", "c"]).await;

        let report = purge_once(store.as_ref()).await.unwrap();
        assert_eq!(report, PurgeReport { deleted: 3, failed: 0 });
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_once_empty_store() {
        let store = InMemoryStore::new();
        assert_eq!(purge_once(&store).await.unwrap(), PurgeReport::default());
    }

    #[tokio::test]
    async fn test_purge_continues_past_failed_delete() {
        let store = StickyStore {
            inner: InMemoryStore::new(),
            sticky: "stuck".into(),
        };
        for key in ["a", "stuck", "b"] {
            store.set(key, b"[]").await.unwrap();
        }

        let report = purge_once(&store).await.unwrap();
        assert_eq!(report, PurgeReport { deleted: 2, failed: 1 });
        assert_eq!(store.list_keys().await.unwrap(), vec![b"stuck".to_vec()]);
    }

    #[tokio::test]
    async fn test_purge_deletes_non_utf8_keys() {
        let store = BinaryKeyStore::default();
        store.set("session", b"[]").await.unwrap();
        store.keys.lock().unwrap().push(vec![0xff, 0xfe, b'x']);

        let report = purge_once(&store).await.unwrap();
        assert_eq!(report, PurgeReport { deleted: 2, failed: 0 });
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_waits_one_interval_then_purges() {
        let store = seeded_store(&["s1", "s2"]).await;
        let handle = PurgeTask::new(store.clone(), HOUR).spawn();

        tokio::time::sleep(HOUR - Duration::from_secs(1)).await;
        assert_eq!(store.len().await, 2);
        assert_eq!(handle.passes(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.is_empty().await);
        assert_eq!(handle.passes(), 1);
        assert_eq!(handle.state().await, PurgeState::Idle);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_repeats_every_interval() {
        let store = seeded_store(&["s1"]).await;
        let handle = PurgeTask::new(store.clone(), HOUR).spawn();

        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        assert!(store.is_empty().await);

        store.set("s2", b"[]").await.unwrap();
        tokio::time::sleep(HOUR).await;
        assert!(store.is_empty().await);
        assert_eq!(handle.passes(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_future_passes() {
        let store = seeded_store(&["keep"]).await;
        let handle = PurgeTask::new(store.clone(), HOUR).spawn();

        handle.shutdown().await;

        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(store.len().await, 1);
    }
}
