//! Client connection: resolver plus balancer for one dial target

use kvlb_core::{AddressRecord, AddressSetSnapshot, BalancePolicy, KvlbResult, Target};
use std::sync::Arc;
use tracing::info;

use crate::balancer::Balancer;
use crate::resolver::{Resolver, ResolverRegistry};

/// Routes calls for one target across its discovered backends
pub struct ClientConn {
    target: Target,
    balancer: Arc<Balancer>,
    resolver: Box<dyn Resolver>,
}

impl ClientConn {
    /// Resolve `target` through the registry and start balancing with `policy`
    pub async fn dial(
        registry: &ResolverRegistry,
        target: &str,
        policy: BalancePolicy,
    ) -> KvlbResult<Self> {
        let target = Target::parse(target)?;
        let builder = registry.get(&target.scheme)?;
        let balancer = Arc::new(Balancer::new(policy));

        let resolver = builder.build(&target, balancer.clone()).await?;

        info!(
            dial_target = %target,
            policy = %policy,
            backends = balancer.snapshot().len(),
            "Client connection ready"
        );

        Ok(Self {
            target,
            balancer,
            resolver,
        })
    }

    /// Choose the backend for the next call
    pub fn pick(&self) -> KvlbResult<AddressRecord> {
        self.balancer.pick()
    }

    /// Ask the resolver for a refresh
    pub fn resolve_now(&self) {
        self.resolver.resolve_now();
    }

    /// Address set currently used for picking
    pub fn snapshot(&self) -> AddressSetSnapshot {
        self.balancer.snapshot()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Stop resolving and release the store connection
    pub async fn close(&self) -> KvlbResult<()> {
        info!(dial_target = %self.target, "Closing client connection");
        self.resolver.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{KvResolverBuilder, SharedConnector};
    use kvlb_core::{KvlbError, ReconnectConfig};
    use kvlb_store::MemoryStore;
    use std::collections::HashMap;
    use std::time::Duration;

    fn registry_for(store: Arc<MemoryStore>) -> ResolverRegistry {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(
            KvResolverBuilder::new("grpc-lb-custom", Arc::new(SharedConnector::new(store)))
                .with_reconnect(ReconnectConfig::disabled()),
        ));
        registry
    }

    async fn wait_for_backends(conn: &ClientConn, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while conn.snapshot().len() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend count never converged");
    }

    #[tokio::test]
    async fn test_dial_and_pick_weighted() {
        let store = Arc::new(MemoryStore::with_entries([
            ("/grpc-lb-custom/hello/10.0.0.1:9000", "3"),
            ("/grpc-lb-custom/hello/10.0.0.2:9000", "1"),
        ]));
        let registry = registry_for(store.clone());

        let conn = ClientConn::dial(&registry, "grpc-lb-custom:///hello", BalancePolicy::Weighted)
            .await
            .unwrap();
        assert_eq!(conn.target().endpoint, "hello");

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..20 {
            *counts.entry(conn.pick().unwrap().address).or_default() += 1;
        }
        assert_eq!(counts["10.0.0.1:9000"], 15);
        assert_eq!(counts["10.0.0.2:9000"], 5);

        conn.resolve_now();
        conn.close().await.unwrap();
        assert_eq!(store.close_count(), 1);
    }

    #[tokio::test]
    async fn test_membership_changes_reach_picker() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_for(store.clone());
        let conn = ClientConn::dial(&registry, "grpc-lb-custom:///hello", BalancePolicy::Weighted)
            .await
            .unwrap();

        assert!(matches!(conn.pick(), Err(KvlbError::NoAvailableBackend)));

        store.put("/grpc-lb-custom/hello/10.0.0.1:9000", "1").await;
        wait_for_backends(&conn, 1).await;
        assert_eq!(conn.pick().unwrap().address, "10.0.0.1:9000");

        store.put("/grpc-lb-custom/hello/10.0.0.2:9000", "2").await;
        wait_for_backends(&conn, 2).await;

        store.delete("/grpc-lb-custom/hello/10.0.0.1:9000").await;
        store.delete("/grpc-lb-custom/hello/10.0.0.2:9000").await;
        wait_for_backends(&conn, 0).await;
        assert!(matches!(conn.pick(), Err(KvlbError::NoAvailableBackend)));

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_unknown_scheme() {
        let registry = ResolverRegistry::new();
        let result = ClientConn::dial(&registry, "dns:///hello", BalancePolicy::Weighted).await;
        assert!(matches!(result, Err(KvlbError::UnknownScheme(_))));
    }

    #[tokio::test]
    async fn test_dial_store_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let registry = registry_for(store.clone());

        let result =
            ClientConn::dial(&registry, "grpc-lb-custom:///hello", BalancePolicy::RoundRobin).await;
        assert!(matches!(result, Err(KvlbError::Connection(_))));
        assert_eq!(store.close_count(), 1);
    }
}
