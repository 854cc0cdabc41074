//! Statistics collector — called on the routing hot path.
//!
//! Counter maps sit behind a reader/writer lock; scalar counters are
//! plain atomics. The collector is `Clone` and shared by handle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Default)]
struct CounterMaps {
    decisions_by_region: BTreeMap<String, u64>,
    decisions_by_strategy: BTreeMap<String, u64>,
}

/// Collects routing and failover statistics for an external sink.
#[derive(Clone, Default)]
pub struct StatsCollector {
    maps: Arc<RwLock<CounterMaps>>,
    failover_count: Arc<AtomicU64>,
    failed_failover_count: Arc<AtomicU64>,
    failover_duration_total_ms: Arc<AtomicU64>,
    dropped_stale_updates: Arc<AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one routing decision.
    pub fn record_decision(&self, region: &str, strategy: &str) {
        let mut maps = self.maps.write().expect("stats lock");
        *maps.decisions_by_region.entry(region.to_string()).or_insert(0) += 1;
        *maps
            .decisions_by_strategy
            .entry(strategy.to_string())
            .or_insert(0) += 1;
    }

    /// Record one failover attempt and its duration.
    pub fn record_failover(&self, duration_ms: u64, success: bool) {
        self.failover_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_failover_count.fetch_add(1, Ordering::Relaxed);
        }
        self.failover_duration_total_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Mirror the registry's dropped-stale-update total into the snapshot.
    pub fn note_dropped_stale_updates(&self, total: u64) {
        self.dropped_stale_updates.store(total, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let maps = self.maps.read().expect("stats lock");
        let failovers = self.failover_count.load(Ordering::Relaxed);
        let total_ms = self.failover_duration_total_ms.load(Ordering::Relaxed);
        let snapshot = StatsSnapshot {
            decisions_by_region: maps.decisions_by_region.clone(),
            decisions_by_strategy: maps.decisions_by_strategy.clone(),
            failover_count: failovers,
            failed_failover_count: self.failed_failover_count.load(Ordering::Relaxed),
            avg_failover_duration_ms: if failovers > 0 {
                total_ms as f64 / failovers as f64
            } else {
                0.0
            },
            dropped_stale_updates: self.dropped_stale_updates.load(Ordering::Relaxed),
        };
        debug!(
            decisions = snapshot.total_decisions(),
            failovers = snapshot.failover_count,
            "stats snapshot taken"
        );
        snapshot
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub decisions_by_region: BTreeMap<String, u64>,
    pub decisions_by_strategy: BTreeMap<String, u64>,
    pub failover_count: u64,
    pub failed_failover_count: u64,
    pub avg_failover_duration_ms: f64,
    pub dropped_stale_updates: u64,
}

impl StatsSnapshot {
    pub fn total_decisions(&self) -> u64 {
        self.decisions_by_region.values().sum()
    }
}
