//! kvlb-network: Service discovery and load balancing
//!
//! This crate provides the routing core:
//! - A concurrency-safe address store
//! - A discovery watcher that mirrors a key-value prefix
//! - Weighted and round-robin pickers
//! - Resolver registration and client connections

pub mod address_store;
pub mod balancer;
pub mod client;
pub mod discovery;
pub mod resolver;
pub mod sink;

pub use address_store::AddressStore;
pub use balancer::{build_picker, Balancer, Picker, RoundRobinPicker, WeightedPicker};
pub use client::ClientConn;
pub use discovery::DiscoveryWatcher;
pub use resolver::{
    Connector, KvResolverBuilder, Resolver, ResolverBuilder, ResolverRegistry, SharedConnector,
};
pub use sink::{AddressObserver, SnapshotWatch};
