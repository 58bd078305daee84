use crate::record::UpdateRecord;
use crate::store::StateStore;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives ingestion for one store.
///
/// Attaching registers the calling thread as the ingestion driver, which is
/// what lets `await_warm` on that same thread drain pending updates instead
/// of deadlocking. The async loops re-register on every wakeup since a task
/// can migrate between runtime workers.
pub struct Driver<P = Value>
where
    P: Send + Sync + 'static,
{
    store: Arc<StateStore<P>>,
}

impl<P> Driver<P>
where
    P: Send + Sync + 'static,
{
    pub fn attach(store: Arc<StateStore<P>>) -> Self {
        store.register_driver();
        info!("Ingestion driver attached");
        Self { store }
    }

    pub fn store(&self) -> &Arc<StateStore<P>> {
        &self.store
    }

    /// One synchronous ingestion step: drain everything pending
    pub fn step(&self) -> usize {
        self.store.register_driver();
        self.store.pump()
    }

    /// Drain on every doorbell ring until the store shuts down
    pub async fn run(self) {
        info!("Ingestion driver running");

        loop {
            self.store.register_driver();
            self.store.pump();
            if self.store.is_closed() {
                break;
            }
            self.store.ingress_rung().await;
        }

        info!("Ingestion driver stopped");
    }

    /// Ingest typed updates from a transport stream until it ends or the
    /// store shuts down. Submitted updates are drained between items.
    pub async fn run_stream<S>(self, mut updates: S)
    where
        S: Stream<Item = UpdateRecord<P>> + Unpin,
    {
        info!("Ingestion driver consuming update stream");

        while let Some(update) = updates.next().await {
            if self.store.is_closed() {
                break;
            }
            self.store.register_driver();
            self.store.pump();
            self.store.ingest(update);
        }

        warn!("Ingestion update stream ended");
    }
}

impl Driver<Value> {
    /// Like [`Driver::run_stream`] for JSON-encoded updates. Malformed
    /// items are logged, counted and skipped.
    pub async fn run_raw_stream<S, B>(self, mut messages: S)
    where
        S: Stream<Item = B> + Unpin,
        B: AsRef<[u8]>,
    {
        info!("Ingestion driver consuming raw event stream");

        while let Some(bytes) = messages.next().await {
            if self.store.is_closed() {
                break;
            }
            self.store.register_driver();
            self.store.pump();
            self.store.ingest_raw(bytes.as_ref());
        }

        warn!("Ingestion raw event stream ended");
    }
}

impl<P> Drop for Driver<P>
where
    P: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.store.clear_driver();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::EntityClass;
    use crate::config::CacheConfig;
    use crate::record::UpdateRecord;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_attach_registers_and_drop_clears() {
        let store: Arc<StateStore> = StateStore::new(CacheConfig::default());
        assert!(!store.is_driver_thread());

        let driver = Driver::attach(Arc::clone(&store));
        assert!(store.is_driver_thread());

        drop(driver);
        assert!(!store.is_driver_thread());
    }

    #[test]
    fn test_step_drains_submitted() {
        let store: Arc<StateStore> = StateStore::new(CacheConfig::default());
        let driver = Driver::attach(Arc::clone(&store));

        store
            .submit(UpdateRecord::full(EntityClass::Menu, 1, vec![(0u64, json!({"option": "Walk here"}))]))
            .unwrap();
        assert_eq!(store.pending_ingress(), 1);

        assert_eq!(driver.step(), 1);
        assert_eq!(store.pending_ingress(), 0);
        assert_eq!(store.table(&EntityClass::Menu).len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store: Arc<StateStore> = StateStore::new(CacheConfig::default());
        let driver = Driver::attach(Arc::clone(&store));
        let handle = tokio::spawn(driver.run());

        store
            .submit(UpdateRecord::full(EntityClass::Player, 1, vec![(0u64, json!({"name": "a", "x": 1, "y": 2}))]))
            .unwrap();
        store
            .await_warm_async(&EntityClass::Player, Duration::from_secs(5))
            .await
            .unwrap();

        store.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_raw_stream_skips_malformed() {
        let store: Arc<StateStore> = StateStore::new(CacheConfig::default());
        let driver = Driver::attach(Arc::clone(&store));

        let messages = futures::stream::iter(vec![
            br#"{"class":"menu","kind":"full","sequence":1,"payload":[{"option":"Walk here"}]}"#.to_vec(),
            b"not json".to_vec(),
            br#"{"class":"menu","kind":"delta","sequence":2,"key":1,"payload":{"option":"Cancel"}}"#.to_vec(),
        ]);
        driver.run_raw_stream(messages).await;

        assert_eq!(store.table(&EntityClass::Menu).len(), 2);
        assert_eq!(store.metrics_snapshot().malformed, 1);
    }

    #[tokio::test]
    async fn test_run_stream_applies_typed_updates() {
        let store: Arc<StateStore<u32>> = StateStore::new(CacheConfig::default());
        let driver = Driver::attach(Arc::clone(&store));

        let updates = futures::stream::iter(vec![
            UpdateRecord::full(EntityClass::inventory(), 1, vec![(0u64, 10u32), (1u64, 20u32)]),
            UpdateRecord::delta(EntityClass::inventory(), 2, 1u64, 21u32),
        ]);
        driver.run_stream(updates).await;

        let table = store.table(&EntityClass::inventory());
        assert_eq!(table.version(), 2);
        assert_eq!(table.get(1u64).unwrap().payload, 21);
    }
}
