//! Resolver registration
//!
//! The routing layer finds resolvers by target scheme. This module holds the
//! thin name-keyed registry and the builder that starts a
//! [`DiscoveryWatcher`] for a target.

use async_trait::async_trait;
use kvlb_core::{KvlbError, KvlbResult, ReconnectConfig, Target};
use kvlb_store::KvStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::discovery::DiscoveryWatcher;
use crate::sink::AddressObserver;

/// An active resolution session
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Hint that fresh addresses are wanted
    fn resolve_now(&self);

    /// End the session and release its resources
    async fn close(&self) -> KvlbResult<()>;
}

/// Creates resolvers for targets of one scheme
#[async_trait]
pub trait ResolverBuilder: Send + Sync {
    /// Start resolving a target, pushing address sets to `observer`
    async fn build(
        &self,
        target: &Target,
        observer: Arc<dyn AddressObserver>,
    ) -> KvlbResult<Box<dyn Resolver>>;

    /// Scheme this builder is registered under
    fn scheme(&self) -> &str;
}

/// Opens connections to a key-value store
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> KvlbResult<Arc<dyn KvStore>>;
}

/// Connector handing out one already-established connection
pub struct SharedConnector {
    store: Arc<dyn KvStore>,
}

impl SharedConnector {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Connector for SharedConnector {
    async fn connect(&self) -> KvlbResult<Arc<dyn KvStore>> {
        Ok(self.store.clone())
    }
}

/// Resolver builder backed by key-value discovery
pub struct KvResolverBuilder {
    scheme: String,
    connector: Arc<dyn Connector>,
    dial_timeout: Duration,
    reconnect: ReconnectConfig,
}

impl KvResolverBuilder {
    /// Create a builder with a 5 second dial timeout and default reconnect policy
    pub fn new(scheme: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            scheme: scheme.into(),
            connector,
            dial_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[async_trait]
impl ResolverBuilder for KvResolverBuilder {
    async fn build(
        &self,
        target: &Target,
        observer: Arc<dyn AddressObserver>,
    ) -> KvlbResult<Box<dyn Resolver>> {
        info!(dial_target = %target, "Building resolver");

        let store = tokio::time::timeout(self.dial_timeout, self.connector.connect())
            .await
            .map_err(|_| {
                KvlbError::Connection(format!("dial timed out after {:?}", self.dial_timeout))
            })??;

        let watcher =
            DiscoveryWatcher::start(store, target.prefix(), observer, self.reconnect.clone())
                .await?;
        Ok(Box::new(watcher))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

/// Resolver builders indexed by scheme
#[derive(Default)]
pub struct ResolverRegistry {
    builders: RwLock<HashMap<String, Arc<dyn ResolverBuilder>>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under its scheme, replacing any previous one
    pub fn register(&self, builder: Arc<dyn ResolverBuilder>) {
        let scheme = builder.scheme().to_string();
        debug!(scheme = %scheme, "Registered resolver");
        self.builders.write().insert(scheme, builder);
    }

    /// Look up the builder for a scheme
    pub fn get(&self, scheme: &str) -> KvlbResult<Arc<dyn ResolverBuilder>> {
        self.builders
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| KvlbError::UnknownScheme(scheme.to_string()))
    }

    /// Registered schemes in sorted order
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.builders.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }
}
