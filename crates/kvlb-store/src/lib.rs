//! kvlb-store: Key-value store boundary
//!
//! This crate defines the narrow surface kvlb consumes from a distributed
//! key-value store (prefix get, prefix watch, close) and ships an in-memory
//! implementation used by tests and the CLI.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{EventKind, KeyValue, KvStore, WatchEvent, WatchResponse, WatchStream};
