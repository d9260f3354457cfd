//! Service discovery over a key-value prefix
//!
//! A [`DiscoveryWatcher`] mirrors every key under a prefix into an
//! [`AddressStore`] and pushes the full address set to an
//! [`AddressObserver`] after each mutation. Keys look like
//! `/<scheme>/<service>/<address>` and carry the backend weight as value.

use async_trait::async_trait;
use futures::StreamExt;
use kvlb_core::{AddressRecord, KvlbError, KvlbResult, ReconnectConfig};
use kvlb_store::{EventKind, KvStore, WatchResponse, WatchStream};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::address_store::AddressStore;
use crate::resolver::Resolver;
use crate::sink::AddressObserver;

/// State shared between a watcher handle and its watch task
struct WatchSession {
    id: Uuid,
    prefix: String,
    store: Arc<dyn KvStore>,
    addresses: AddressStore,
    observer: Arc<dyn AddressObserver>,
    reconnect: ReconnectConfig,
}

impl WatchSession {
    /// Open a subscription and load the current contents of the prefix.
    ///
    /// The subscription is opened first so that changes racing with the
    /// bulk read are buffered in the stream and replayed afterwards.
    async fn bootstrap(&self) -> KvlbResult<WatchStream> {
        let stream = self
            .store
            .watch_prefix(&self.prefix)
            .await
            .map_err(into_connection_error)?;
        let kvs = self
            .store
            .get_prefix(&self.prefix)
            .await
            .map_err(into_connection_error)?;

        let entries = kvs.into_iter().map(|kv| {
            let record = AddressRecord::from_kv(&self.prefix, &kv.key, &kv.value);
            (kv.key, record)
        });
        self.addresses.replace_all(entries).await;
        self.publish().await;

        Ok(stream)
    }

    async fn publish(&self) {
        let snapshot = self.addresses.snapshot().await;
        debug!(
            session = %self.id,
            prefix = %self.prefix,
            addresses = ?snapshot.addresses(),
            "Publishing address set"
        );
        self.observer.update_addresses(snapshot);
    }

    async fn apply(&self, response: WatchResponse) {
        for event in response.events {
            match event.kind {
                EventKind::Put => {
                    let record = AddressRecord::from_kv(&self.prefix, &event.key, &event.value);
                    debug!(
                        session = %self.id,
                        key = %event.key,
                        weight = record.weight,
                        "Discovery put"
                    );
                    self.addresses.put(event.key, record).await;
                }
                EventKind::Delete => {
                    let existed = self.addresses.delete(&event.key).await;
                    debug!(session = %self.id, key = %event.key, existed, "Discovery delete");
                }
                EventKind::Unknown => {
                    debug!(session = %self.id, key = %event.key, "Ignoring unknown watch event");
                    continue;
                }
            }
            self.publish().await;
        }
    }

    /// Consume the watch stream until shutdown or unrecoverable loss
    async fn run(
        self: Arc<Self>,
        mut stream: WatchStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> KvlbResult<()> {
        info!(session = %self.id, prefix = %self.prefix, "Discovery watch started");

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let item = tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(()),
                item = stream.next() => item,
            };

            let cause = match item {
                Some(Ok(response)) => {
                    self.apply(response).await;
                    continue;
                }
                Some(Err(e)) => e,
                None => KvlbError::WatchStream("watch stream closed".to_string()),
            };

            warn!(
                session = %self.id,
                prefix = %self.prefix,
                error = %cause,
                "Discovery watch lost"
            );

            match self.resubscribe(&mut shutdown, cause).await? {
                Some(fresh) => stream = fresh,
                None => return Ok(()),
            }
        }
    }

    /// Back off, re-read the prefix and subscribe again.
    ///
    /// Returns `Ok(None)` when shutdown is requested while waiting or while an
    /// attempt is in flight.
    async fn resubscribe(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        cause: KvlbError,
    ) -> KvlbResult<Option<WatchStream>> {
        let mut failures = 0u32;
        let mut last_error = cause;

        loop {
            if !self.reconnect.allows(failures) {
                return Err(match last_error {
                    e @ KvlbError::WatchStream(_) if failures == 0 => e,
                    e if failures == 0 => KvlbError::WatchStream(e.to_string()),
                    e => KvlbError::WatchStream(format!(
                        "gave up after {} reconnect attempts: {}",
                        failures, e
                    )),
                });
            }

            let delay = self.reconnect.backoff(failures);
            info!(
                session = %self.id,
                attempt = failures + 1,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting discovery watch"
            );

            tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }

            // An unresponsive store must not hold up shutdown.
            let attempt = tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(None),
                attempt = self.bootstrap() => attempt,
            };

            match attempt {
                Ok(stream) => {
                    info!(session = %self.id, prefix = %self.prefix, "Discovery watch restored");
                    return Ok(Some(stream));
                }
                Err(e) => {
                    warn!(session = %self.id, error = %e, "Reconnect attempt failed");
                    failures += 1;
                    last_error = e;
                }
            }
        }
    }
}

fn into_connection_error(err: KvlbError) -> KvlbError {
    match err {
        KvlbError::Connection(_) => err,
        other => KvlbError::Connection(other.to_string()),
    }
}

/// Live mirror of a key-value prefix
pub struct DiscoveryWatcher {
    session: Arc<WatchSession>,
    /// Signals the watch task to exit
    shutdown: watch::Sender<bool>,
    /// Watch task handle, taken on stop or join
    task: Mutex<Option<JoinHandle<KvlbResult<()>>>>,
    /// Set once the connection has been released
    closed: AtomicBool,
}

impl DiscoveryWatcher {
    /// Load the prefix, publish the initial address set and start watching.
    ///
    /// The watcher takes ownership of the connection: it is closed on
    /// [`stop`](Self::stop), on drop, and before a startup error is returned.
    pub async fn start(
        store: Arc<dyn KvStore>,
        prefix: impl Into<String>,
        observer: Arc<dyn AddressObserver>,
        reconnect: ReconnectConfig,
    ) -> KvlbResult<Self> {
        let session = Arc::new(WatchSession {
            id: Uuid::new_v4(),
            prefix: prefix.into(),
            store,
            addresses: AddressStore::new(),
            observer,
            reconnect,
        });

        info!(
            session = %session.id,
            prefix = %session.prefix,
            store = session.store.name(),
            "Starting discovery"
        );

        let stream = match session.bootstrap().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = %session.id, error = %e, "Discovery bootstrap failed");
                if let Err(close_err) = session.store.close().await {
                    warn!(session = %session.id, error = %close_err, "Failed to close connection");
                }
                return Err(e);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session.clone().run(stream, shutdown_rx));

        Ok(Self {
            session,
            shutdown,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Request an accelerated refresh.
    ///
    /// State is driven entirely by watch events, so this only logs.
    pub fn resolve_now(&self) {
        debug!(session = %self.session.id, prefix = %self.session.prefix, "Discovery resolve now");
    }

    /// Stop watching and release the connection. Safe to call repeatedly.
    pub async fn stop(&self) -> KvlbResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(session = %self.session.id, prefix = %self.session.prefix, "Stopping discovery");
        let _ = self.shutdown.send(true);

        let task = self.task.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(session = %self.session.id, error = %e, "Watch loop had ended")
                }
                Err(e) => warn!(session = %self.session.id, error = %e, "Watch task failed"),
            }
        }

        self.session.store.close().await
    }

    /// Wait for the watch loop to end on its own and return its outcome
    pub async fn join(&self) -> KvlbResult<()> {
        let task = self.task.lock().take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| KvlbError::Internal(format!("watch task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Whether the watch loop is still consuming events
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Current address set
    pub async fn snapshot(&self) -> kvlb_core::AddressSetSnapshot {
        self.session.addresses.snapshot().await
    }

    /// Watched prefix
    pub fn prefix(&self) -> &str {
        &self.session.prefix
    }

    /// Session identifier used in logs
    pub fn id(&self) -> Uuid {
        self.session.id
    }
}

impl Drop for DiscoveryWatcher {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.session.store.clone();
            handle.spawn(async move {
                let _ = store.close().await;
            });
        }
    }
}

#[async_trait]
impl Resolver for DiscoveryWatcher {
    fn resolve_now(&self) {
        DiscoveryWatcher::resolve_now(self)
    }

    async fn close(&self) -> KvlbResult<()> {
        self.stop().await
    }
}
