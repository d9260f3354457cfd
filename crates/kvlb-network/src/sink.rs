//! Resolution sink: consumers of address set updates

use kvlb_core::AddressSetSnapshot;
use tokio::sync::watch;

/// Receives the full address set every time it changes
///
/// Updates may repeat an identical snapshot; implementations must treat
/// that as a no-op rather than a membership change.
pub trait AddressObserver: Send + Sync {
    fn update_addresses(&self, snapshot: AddressSetSnapshot);
}

impl<F> AddressObserver for F
where
    F: Fn(AddressSetSnapshot) + Send + Sync,
{
    fn update_addresses(&self, snapshot: AddressSetSnapshot) {
        self(snapshot)
    }
}

/// Observer backed by a watch channel, for consumers that await changes
pub struct SnapshotWatch {
    tx: watch::Sender<AddressSetSnapshot>,
}

impl SnapshotWatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AddressSetSnapshot::empty());
        Self { tx }
    }

    /// Receiver that yields the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<AddressSetSnapshot> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> AddressSetSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for SnapshotWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressObserver for SnapshotWatch {
    fn update_addresses(&self, snapshot: AddressSetSnapshot) {
        // Receivers are only woken when the set actually differs.
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvlb_core::AddressRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_observer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let observer = {
            let calls = calls.clone();
            move |snapshot: AddressSetSnapshot| {
                assert_eq!(snapshot.len(), 1);
                calls.fetch_add(1, Ordering::SeqCst);
            }
        };

        let snapshot = AddressSetSnapshot::new(vec![AddressRecord::new("10.0.0.1:9000", 1)]);
        observer.update_addresses(snapshot);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_watch_ignores_repeats() {
        let sink = SnapshotWatch::new();
        let mut rx = sink.subscribe();
        let snapshot = AddressSetSnapshot::new(vec![AddressRecord::new("10.0.0.1:9000", 2)]);

        sink.update_addresses(snapshot.clone());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), snapshot);

        sink.update_addresses(snapshot.clone());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(sink.latest(), snapshot);
    }
}
