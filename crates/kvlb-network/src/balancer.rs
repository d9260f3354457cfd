//! Per-call backend selection

use kvlb_core::{AddressRecord, AddressSetSnapshot, BalancePolicy, KvlbError, KvlbResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::sink::AddressObserver;

/// Selects one backend per call from a fixed address set
pub trait Picker: Send + Sync {
    /// Pick the target for the next call
    fn pick(&self) -> KvlbResult<AddressRecord>;

    /// Policy implemented by this picker
    fn policy(&self) -> BalancePolicy;
}

/// Build a fresh picker for a snapshot
pub fn build_picker(policy: BalancePolicy, snapshot: &AddressSetSnapshot) -> Arc<dyn Picker> {
    match policy {
        BalancePolicy::Weighted => Arc::new(WeightedPicker::new(snapshot)),
        BalancePolicy::RoundRobin => Arc::new(RoundRobinPicker::new(snapshot)),
    }
}

#[derive(Debug, Clone)]
struct Credit {
    record: AddressRecord,
    current: i64,
}

/// Credits carried between picks
#[derive(Debug, Clone, Default)]
struct PickerState {
    credits: Vec<Credit>,
    total_weight: i64,
}

/// Smooth weighted round-robin
///
/// Every pick adds each backend's weight to its credit, selects the highest
/// credit (earliest address wins ties) and charges the winner the total
/// weight. Over `W` picks each backend is chosen exactly `weight` times and
/// heavy backends are interleaved with light ones instead of served in blocks.
pub struct WeightedPicker {
    state: Mutex<PickerState>,
}

impl WeightedPicker {
    /// Create a picker with all credits at zero
    pub fn new(snapshot: &AddressSetSnapshot) -> Self {
        let credits = snapshot
            .iter()
            .map(|record| Credit {
                record: record.clone(),
                current: 0,
            })
            .collect();

        Self {
            state: Mutex::new(PickerState {
                credits,
                total_weight: snapshot.total_weight() as i64,
            }),
        }
    }

    #[cfg(test)]
    fn credits(&self) -> Vec<i64> {
        self.state.lock().credits.iter().map(|c| c.current).collect()
    }
}

impl Picker for WeightedPicker {
    fn pick(&self) -> KvlbResult<AddressRecord> {
        let mut state = self.state.lock();
        if state.credits.is_empty() {
            return Err(KvlbError::NoAvailableBackend);
        }

        let mut best = 0;
        let mut best_value = i64::MIN;
        for (i, credit) in state.credits.iter_mut().enumerate() {
            credit.current += i64::from(credit.record.weight);
            // Strict comparison: the earliest address wins ties.
            if credit.current > best_value {
                best = i;
                best_value = credit.current;
            }
        }

        let total = state.total_weight;
        let selected = &mut state.credits[best];
        selected.current -= total;

        Ok(selected.record.clone())
    }

    fn policy(&self) -> BalancePolicy {
        BalancePolicy::Weighted
    }
}

/// Round-robin ignoring weights
pub struct RoundRobinPicker {
    records: Vec<AddressRecord>,
    counter: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(snapshot: &AddressSetSnapshot) -> Self {
        Self {
            records: snapshot.records().to_vec(),
            counter: AtomicUsize::new(0),
        }
    }
}

impl Picker for RoundRobinPicker {
    fn pick(&self) -> KvlbResult<AddressRecord> {
        if self.records.is_empty() {
            return Err(KvlbError::NoAvailableBackend);
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.records.len();
        Ok(self.records[idx].clone())
    }

    fn policy(&self) -> BalancePolicy {
        BalancePolicy::RoundRobin
    }
}

/// Balancer that rebuilds its picker whenever the address set changes
pub struct Balancer {
    /// Selection policy
    policy: BalancePolicy,
    /// Latest address set
    snapshot: RwLock<AddressSetSnapshot>,
    /// Picker over the latest address set
    picker: RwLock<Arc<dyn Picker>>,
}

impl Balancer {
    /// Create a balancer with no known backends
    pub fn new(policy: BalancePolicy) -> Self {
        let snapshot = AddressSetSnapshot::empty();
        Self {
            policy,
            picker: RwLock::new(build_picker(policy, &snapshot)),
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Select the target for one call
    pub fn pick(&self) -> KvlbResult<AddressRecord> {
        let picker = self.picker.read().clone();
        let picked = picker.pick()?;

        debug!(
            policy = %self.policy,
            address = %picked.address,
            weight = picked.weight,
            "Picked backend"
        );
        Ok(picked)
    }

    /// Latest address set handed to this balancer
    pub fn snapshot(&self) -> AddressSetSnapshot {
        self.snapshot.read().clone()
    }

    /// Get the current policy
    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new(BalancePolicy::Weighted)
    }
}

impl AddressObserver for Balancer {
    fn update_addresses(&self, snapshot: AddressSetSnapshot) {
        let mut current = self.snapshot.write();
        if *current == snapshot {
            return;
        }

        info!(
            policy = %self.policy,
            backends = snapshot.len(),
            total_weight = snapshot.total_weight(),
            "Rebuilding picker"
        );
        *self.picker.write() = build_picker(self.policy, &snapshot);
        *current = snapshot;
    }
}
