//! Key-value store trait definitions

use async_trait::async_trait;
use futures::stream::BoxStream;
use kvlb_core::KvlbResult;
use serde::{Deserialize, Serialize};

/// A key and its current value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Key created or value changed
    Put,
    /// Key removed
    Delete,
    /// Any kind this client does not understand
    #[serde(other)]
    Unknown,
}

/// A single change within a watched prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
    /// New value for puts, empty for deletes
    pub value: String,
}

impl WatchEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Delete,
            key: key.into(),
            value: String::new(),
        }
    }
}

/// A batch of events delivered together, in store order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResponse {
    pub events: Vec<WatchEvent>,
}

/// Live change stream for a prefix.
///
/// The stream ends when the subscription is cancelled or the connection is
/// closed. An `Err` item reports a broken subscription.
pub type WatchStream = BoxStream<'static, KvlbResult<WatchResponse>>;

/// Operations consumed from a distributed key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read every key under a prefix
    async fn get_prefix(&self, prefix: &str) -> KvlbResult<Vec<KeyValue>>;

    /// Subscribe to changes under a prefix
    async fn watch_prefix(&self, prefix: &str) -> KvlbResult<WatchStream>;

    /// Close the connection, ending all watch streams
    async fn close(&self) -> KvlbResult<()>;

    /// Get the store name
    fn name(&self) -> &'static str;
}
