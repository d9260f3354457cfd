//! In-memory key-value store
//!
//! Behaves like a single-node store: prefix reads, ordered per-subscriber
//! watch streams and explicit close. Fault injection hooks make connection
//! loss and broken subscriptions reproducible.

use async_trait::async_trait;
use futures::StreamExt;
use kvlb_core::{KvlbError, KvlbResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::traits::{KeyValue, KvStore, WatchEvent, WatchResponse, WatchStream};

type Subscriber = (String, mpsc::UnboundedSender<KvlbResult<WatchResponse>>);

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    /// Keys in lexical order
    data: RwLock<BTreeMap<String, String>>,
    /// Open watch subscriptions with their prefixes
    watchers: RwLock<Vec<Subscriber>>,
    /// Reject gets and watches while set
    unavailable: AtomicBool,
    /// Number of close calls received
    closes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
            ..Self::default()
        }
    }

    /// Set a key and notify matching watchers
    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let event = WatchEvent::put(key, value);
        self.data
            .write()
            .await
            .insert(event.key.clone(), event.value.clone());
        self.publish(vec![event]).await;
    }

    /// Remove a key and notify matching watchers if it existed
    pub async fn delete(&self, key: &str) {
        let removed = self.data.write().await.remove(key).is_some();
        if removed {
            self.publish(vec![WatchEvent::delete(key)]).await;
        }
    }

    /// Deliver an arbitrary batch to watchers without touching the data
    pub async fn inject(&self, events: Vec<WatchEvent>) {
        self.publish(events).await;
    }

    /// Make the store reject new gets and watches
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail every open watch stream with an error and drop it
    pub async fn break_watches(&self) {
        let mut watchers = self.watchers.write().await;
        for (_, tx) in watchers.drain(..) {
            let _ = tx.send(Err(KvlbError::WatchStream(
                "watch stream interrupted".to_string(),
            )));
        }
    }

    /// Number of open watch subscriptions
    pub async fn watcher_count(&self) -> usize {
        let mut watchers = self.watchers.write().await;
        watchers.retain(|(_, tx)| !tx.is_closed());
        watchers.len()
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> KvlbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvlbError::Connection(
                "key-value store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(&self, events: Vec<WatchEvent>) {
        let mut watchers = self.watchers.write().await;
        watchers.retain(|(prefix, tx)| {
            let matching: Vec<WatchEvent> = events
                .iter()
                .filter(|e| e.key.starts_with(prefix.as_str()))
                .cloned()
                .collect();
            if matching.is_empty() {
                return !tx.is_closed();
            }
            tx.send(Ok(WatchResponse { events: matching })).is_ok()
        });
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_prefix(&self, prefix: &str) -> KvlbResult<Vec<KeyValue>> {
        self.check_available()?;

        let data = self.data.read().await;
        let kvs: Vec<KeyValue> = data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();

        debug!(prefix = %prefix, count = kvs.len(), "Prefix read");
        Ok(kvs)
    }

    async fn watch_prefix(&self, prefix: &str) -> KvlbResult<WatchStream> {
        self.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.write().await.push((prefix.to_string(), tx));

        debug!(prefix = %prefix, "Watch subscribed");
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> KvlbResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.watchers.write().await.clear();
        debug!("Memory store closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EventKind;

    #[tokio::test]
    async fn test_get_prefix() {
        let store = MemoryStore::with_entries([
            ("/svc/a/10.0.0.1:9000", "1"),
            ("/svc/a/10.0.0.2:9000", "2"),
            ("/svc/b/10.0.0.3:9000", "3"),
        ]);

        let kvs = store.get_prefix("/svc/a/").await.unwrap();
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0], KeyValue::new("/svc/a/10.0.0.1:9000", "1"));

        assert!(store.get_prefix("/other/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_receives_matching_events() {
        let store = MemoryStore::new();
        let mut stream = store.watch_prefix("/svc/a/").await.unwrap();

        store.put("/svc/b/10.0.0.3:9000", "1").await;
        store.put("/svc/a/10.0.0.1:9000", "4").await;
        store.delete("/svc/a/10.0.0.1:9000").await;

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.events, vec![WatchEvent::put("/svc/a/10.0.0.1:9000", "4")]);

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.events[0].kind, EventKind::Delete);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_silent() {
        let store = MemoryStore::new();
        let _stream = store.watch_prefix("/svc/").await.unwrap();

        store.delete("/svc/missing").await;
        assert!(store.get_prefix("/svc/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.get_prefix("/svc/").await,
            Err(KvlbError::Connection(_))
        ));
        assert!(store.watch_prefix("/svc/").await.is_err());

        store.set_unavailable(false);
        assert!(store.get_prefix("/svc/").await.is_ok());
    }

    #[tokio::test]
    async fn test_break_watches() {
        let store = MemoryStore::new();
        let mut stream = store.watch_prefix("/svc/").await.unwrap();

        store.break_watches().await;

        assert!(matches!(
            stream.next().await,
            Some(Err(KvlbError::WatchStream(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let store = MemoryStore::new();
        let mut stream = store.watch_prefix("/svc/").await.unwrap();
        assert_eq!(store.watcher_count().await, 1);

        store.close().await.unwrap();

        assert!(stream.next().await.is_none());
        assert_eq!(store.close_count(), 1);
        assert_eq!(store.watcher_count().await, 0);
    }
}
