//! CLI commands implementation

use anyhow::{Context, Result};
use kvlb_core::{parse_weight, KvlbConfig};
use kvlb_network::{ClientConn, KvResolverBuilder, ResolverRegistry, SharedConnector};
use kvlb_store::MemoryStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Per-address outcome of a simulation
#[derive(Debug, Serialize)]
pub struct BackendReport {
    pub address: String,
    pub weight: u32,
    pub picks: u32,
}

/// Simulation result
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub target: String,
    pub policy: String,
    pub calls: u32,
    pub failed: u32,
    pub backends: Vec<BackendReport>,
    /// Addresses in pick order
    pub sequence: Vec<String>,
}

/// Load configuration from a file or fall back to defaults
pub fn load_config(path: Option<&Path>) -> Result<KvlbConfig> {
    match path {
        Some(path) => KvlbConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(KvlbConfig::default()),
    }
}

/// Seed a memory store from the config, dial the service and pick `calls` times
pub async fn simulate(config: &KvlbConfig, service: &str, calls: u32) -> Result<SimulationReport> {
    let store = Arc::new(MemoryStore::with_entries(
        config.seed.iter().map(|e| (e.key.clone(), e.value.clone())),
    ));

    let scheme = config.discovery.scheme.clone();
    let registry = ResolverRegistry::new();
    registry.register(Arc::new(
        KvResolverBuilder::new(scheme.clone(), Arc::new(SharedConnector::new(store)))
            .with_dial_timeout(config.discovery.dial_timeout())
            .with_reconnect(config.reconnect.clone()),
    ));

    let target = format!("{}:///{}", scheme, service);
    let policy = config.balancer.policy;
    let conn = ClientConn::dial(&registry, &target, policy)
        .await
        .with_context(|| format!("dialing {}", target))?;

    let mut backends: BTreeMap<String, BackendReport> = conn
        .snapshot()
        .iter()
        .map(|r| {
            (
                r.address.clone(),
                BackendReport {
                    address: r.address.clone(),
                    weight: r.weight,
                    picks: 0,
                },
            )
        })
        .collect();

    let mut sequence = Vec::with_capacity(calls as usize);
    let mut failed = 0;
    for _ in 0..calls {
        match conn.pick() {
            Ok(record) => {
                if let Some(backend) = backends.get_mut(&record.address) {
                    backend.picks += 1;
                }
                sequence.push(record.address);
            }
            Err(e) => {
                info!(error = %e, "Pick failed");
                failed += 1;
            }
        }
    }

    conn.close().await?;

    Ok(SimulationReport {
        target,
        policy: policy.to_string(),
        calls,
        failed,
        backends: backends.into_values().collect(),
        sequence,
    })
}

/// Print a simulation report
pub fn print_report(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Target: {} ({})", report.target, report.policy);
    if report.backends.is_empty() {
        println!("No backends discovered; {} calls failed", report.failed);
        return Ok(());
    }

    println!("{:<24} {:>8} {:>8}", "ADDRESS", "WEIGHT", "PICKS");
    for backend in &report.backends {
        println!(
            "{:<24} {:>8} {:>8}",
            backend.address, backend.weight, backend.picks
        );
    }
    println!("Sequence: {}", report.sequence.join(" "));

    Ok(())
}

/// Print the parsed weight for a value
pub fn weight(value: &str) {
    println!("{:?} -> weight {}", value, parse_weight(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvlb_core::{BalancePolicy, SeedEntry};
    use std::io::Write;

    fn seeded(entries: &[(&str, &str)]) -> KvlbConfig {
        let mut config = KvlbConfig::default();
        config.seed = entries
            .iter()
            .map(|(key, value)| SeedEntry {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect();
        config
    }

    #[tokio::test]
    async fn test_simulate_weighted() {
        let config = seeded(&[
            ("/grpc-lb-custom/hello/10.0.0.1:9000", "2"),
            ("/grpc-lb-custom/hello/10.0.0.2:9000", ""),
            ("/grpc-lb-custom/other/10.0.0.3:9000", "9"),
        ]);

        let report = simulate(&config, "hello", 6).await.unwrap();
        assert_eq!(report.target, "grpc-lb-custom:///hello");
        assert_eq!(report.failed, 0);
        assert_eq!(report.backends.len(), 2);
        assert_eq!(report.backends[0].picks, 4);
        assert_eq!(report.backends[1].picks, 2);
        assert_eq!(report.backends[1].weight, 1);
    }

    #[tokio::test]
    async fn test_simulate_round_robin() {
        let mut config = seeded(&[
            ("/grpc-lb-custom/hello/10.0.0.1:9000", "5"),
            ("/grpc-lb-custom/hello/10.0.0.2:9000", "1"),
        ]);
        config.balancer.policy = BalancePolicy::RoundRobin;

        let report = simulate(&config, "hello", 4).await.unwrap();
        assert_eq!(report.policy, "round-robin");
        assert!(report.backends.iter().all(|b| b.picks == 2));
    }

    #[tokio::test]
    async fn test_simulate_no_backends() {
        let report = simulate(&KvlbConfig::default(), "hello", 3).await.unwrap();
        assert!(report.backends.is_empty());
        assert_eq!(report.failed, 3);
        assert!(print_report(&report, false).is_ok());
    }

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[seed]]\nkey = \"/grpc-lb-custom/hello/10.0.0.1:9000\"\nvalue = \"3\""
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.seed.len(), 1);
        assert!(load_config(None).unwrap().seed.is_empty());
        assert!(load_config(Some(Path::new("/nonexistent/kvlb.toml"))).is_err());
    }
}
