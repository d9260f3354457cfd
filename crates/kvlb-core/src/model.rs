//! Address record, snapshot, and dial target type definitions

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KvlbError, KvlbResult};

/// Weight assigned when a published value is missing or malformed
pub const DEFAULT_WEIGHT: u32 = 1;

/// Parse a published value as a backend weight.
///
/// Anything that is not a positive decimal integer becomes [`DEFAULT_WEIGHT`].
/// Malformed values are tolerated and never reported to the caller.
pub fn parse_weight(value: &str) -> u32 {
    match value.parse::<u32>() {
        Ok(weight) if weight > 0 => weight,
        _ => {
            debug!(value = %value, "Malformed weight, using default");
            DEFAULT_WEIGHT
        }
    }
}

/// Strip the discovery prefix from a key, leaving the routable address
pub fn address_from_key<'a>(prefix: &str, key: &'a str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

/// A backend address together with its advertised weight
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Routable network address (e.g., "10.0.0.1:9000")
    pub address: String,
    /// Relative capacity, always at least 1
    pub weight: u32,
}

impl AddressRecord {
    /// Create a new record, clamping a zero weight to the default
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight: weight.max(DEFAULT_WEIGHT),
        }
    }

    /// Build a record from a discovery key and its published value
    pub fn from_kv(prefix: &str, key: &str, value: &str) -> Self {
        Self::new(address_from_key(prefix, key), parse_weight(value))
    }
}

impl std::fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(w={})", self.address, self.weight)
    }
}

/// Point-in-time enumeration of known backends
///
/// Records are kept sorted by address so that equal sets compare equal and
/// scheduling over a snapshot is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSetSnapshot {
    records: Vec<AddressRecord>,
}

impl AddressSetSnapshot {
    /// Create a snapshot from records in any order
    pub fn new(mut records: Vec<AddressRecord>) -> Self {
        records.sort_by(|a, b| a.address.cmp(&b.address).then(a.weight.cmp(&b.weight)));
        Self { records }
    }

    /// An empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records in address order
    pub fn records(&self) -> &[AddressRecord] {
        &self.records
    }

    /// Addresses in address order
    pub fn addresses(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.address.as_str()).collect()
    }

    /// Sum of all weights
    pub fn total_weight(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.weight)).sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressRecord> {
        self.records.iter()
    }
}

impl FromIterator<AddressRecord> for AddressSetSnapshot {
    fn from_iter<I: IntoIterator<Item = AddressRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Parsed dial target of the form `scheme://authority/endpoint`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Resolver scheme (e.g., "grpc-lb-custom")
    pub scheme: String,
    /// Authority, usually empty
    pub authority: String,
    /// Service name
    pub endpoint: String,
}

impl Target {
    /// Parse a target such as `grpc-lb-custom:///hello_service`
    pub fn parse(target: &str) -> KvlbResult<Self> {
        let (scheme, rest) = target
            .split_once("://")
            .ok_or_else(|| KvlbError::InvalidTarget(format!("missing scheme in {:?}", target)))?;
        let (authority, endpoint) = rest
            .split_once('/')
            .ok_or_else(|| KvlbError::InvalidTarget(format!("missing endpoint in {:?}", target)))?;

        if scheme.is_empty() || endpoint.is_empty() {
            return Err(KvlbError::InvalidTarget(target.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    /// Key namespace watched for this target: `/<scheme>/<endpoint>/`
    pub fn prefix(&self) -> String {
        format!("/{}/{}/", self.scheme, self.endpoint)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight("5"), 5);
        assert_eq!(parse_weight(""), 1);
        assert_eq!(parse_weight("-3"), 1);
        assert_eq!(parse_weight("abc"), 1);
        assert_eq!(parse_weight("0"), 1);
        assert_eq!(parse_weight("99999999999"), 1);
    }

    #[test]
    fn test_record_from_kv() {
        let record = AddressRecord::from_kv("/svc/", "/svc/10.0.0.1:9000", "2");
        assert_eq!(record.address, "10.0.0.1:9000");
        assert_eq!(record.weight, 2);

        let record = AddressRecord::new("10.0.0.2:9000", 0);
        assert_eq!(record.weight, 1);
    }

    #[test]
    fn test_snapshot_is_order_insensitive() {
        let a = AddressSetSnapshot::new(vec![
            AddressRecord::new("10.0.0.2:9000", 1),
            AddressRecord::new("10.0.0.1:9000", 2),
        ]);
        let b: AddressSetSnapshot = vec![
            AddressRecord::new("10.0.0.1:9000", 2),
            AddressRecord::new("10.0.0.2:9000", 1),
        ]
        .into_iter()
        .collect();

        assert_eq!(a, b);
        assert_eq!(a.addresses(), vec!["10.0.0.1:9000", "10.0.0.2:9000"]);
        assert_eq!(a.total_weight(), 3);
    }

    #[test]
    fn test_target_parse() {
        let target = Target::parse("grpc-lb-custom:///grpclb_test2").unwrap();
        assert_eq!(target.scheme, "grpc-lb-custom");
        assert_eq!(target.authority, "");
        assert_eq!(target.endpoint, "grpclb_test2");
        assert_eq!(target.prefix(), "/grpc-lb-custom/grpclb_test2/");
        assert_eq!(target.to_string(), "grpc-lb-custom:///grpclb_test2");
    }

    #[test]
    fn test_target_parse_invalid() {
        assert!(matches!(
            Target::parse("grpclb_test2"),
            Err(KvlbError::InvalidTarget(_))
        ));
        assert!(matches!(
            Target::parse("grpc-lb-custom://"),
            Err(KvlbError::InvalidTarget(_))
        ));
        assert!(Target::parse(":///svc").is_err());
    }
}
