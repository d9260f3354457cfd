//! Concurrency-safe mapping from discovery key to address record

use kvlb_core::{AddressRecord, AddressSetSnapshot};
use std::collections::HashMap;
use tokio::sync::RwLock;

type RecordsMap = HashMap<String, AddressRecord>;

/// Latest known record per discovery key
///
/// Written by a single watch task, read concurrently. Snapshots copy the
/// records out under a short read lock, so readers never observe a record
/// being replaced halfway.
#[derive(Default)]
pub struct AddressStore {
    records: RwLock<RecordsMap>,
}

impl AddressStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for a key
    pub async fn put(&self, key: impl Into<String>, record: AddressRecord) {
        self.records.write().await.insert(key.into(), record);
    }

    /// Remove the record for a key. Returns whether a record was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.records.write().await.remove(key).is_some()
    }

    /// Replace the whole contents in one step
    pub async fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, AddressRecord)>,
    {
        let fresh: RecordsMap = entries.into_iter().collect();
        *self.records.write().await = fresh;
    }

    /// Copy out the current address set
    pub async fn snapshot(&self) -> AddressSetSnapshot {
        let records = self.records.read().await;
        records.values().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<AddressRecord> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
