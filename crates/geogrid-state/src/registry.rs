//! RegionRegistry — authoritative set of known regions and their health.
//!
//! The registry is shared mutable state read on every routing decision
//! and written only by probe callbacks and failover, so it sits behind
//! a single reader/writer lock with all updates kept O(1). Readers take
//! one consistent snapshot per call and never re-read mid-computation.
//!
//! Health updates are last-write-wins with a monotonic timestamp guard:
//! an update older than the stored timestamp is silently dropped, which
//! protects against out-of-order probe delivery. No retries happen here.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{GridError, GridResult};
use crate::types::{DeploymentId, Region, RegionHealth, RegionId};

struct RegionEntry {
    region: Region,
    /// Active deployments referencing this region. Removal is rejected
    /// while this is non-empty.
    in_use_by: BTreeSet<DeploymentId>,
}

/// Thread-safe region table. `Clone` shares the underlying state.
#[derive(Clone)]
pub struct RegionRegistry {
    regions: Arc<RwLock<HashMap<RegionId, RegionEntry>>>,
    dropped_stale: Arc<AtomicU64>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self {
            regions: Arc::new(RwLock::new(HashMap::new())),
            dropped_stale: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a region, or replace its definition if the id is known.
    ///
    /// Idempotent upsert: in-use tracking survives re-registration.
    pub fn register(&self, mut region: Region) -> GridResult<()> {
        if region.current_capacity > region.max_capacity {
            return Err(GridError::CapacityExceedsMax {
                region: region.id.clone(),
                current: region.current_capacity,
                max: region.max_capacity,
            });
        }
        region.health_score = region.health_score.clamp(0.0, 100.0);
        region.error_rate = region.error_rate.clamp(0.0, 1.0);
        region.cost_multiplier = region.cost_multiplier.max(0.0);

        let mut regions = self.regions.write().expect("regions lock");
        match regions.get_mut(&region.id) {
            Some(entry) => {
                debug!(region_id = %region.id, "region re-registered");
                entry.region = region;
            }
            None => {
                info!(region_id = %region.id, provider = %region.provider, "region registered");
                regions.insert(
                    region.id.clone(),
                    RegionEntry {
                        region,
                        in_use_by: BTreeSet::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Fetch a region by id.
    pub fn get(&self, id: &str) -> GridResult<Region> {
        let regions = self.regions.read().expect("regions lock");
        regions
            .get(id)
            .map(|e| e.region.clone())
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))
    }

    /// List regions sorted by id.
    ///
    /// With `healthy_only` set, only regions whose derived status is
    /// healthy are returned; callers that want degraded regions as a
    /// fallback must list everything and filter themselves.
    pub fn list(&self, healthy_only: bool) -> Vec<Region> {
        let regions = self.regions.read().expect("regions lock");
        let mut out: Vec<Region> = regions
            .values()
            .filter(|e| !healthy_only || e.region.health().status == crate::types::HealthStatus::Healthy)
            .map(|e| e.region.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Apply a probe-reported health update.
    ///
    /// Returns `Ok(false)` when the update was dropped as stale. The
    /// reported utilization is projected onto `current_capacity` so the
    /// capacity view stays consistent with what the probe saw.
    pub fn update_health(
        &self,
        id: &str,
        health_score: f64,
        error_rate: f64,
        utilization_pct: f64,
        observed_at_ms: u64,
    ) -> GridResult<bool> {
        let mut regions = self.regions.write().expect("regions lock");
        let entry = regions
            .get_mut(id)
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))?;

        if observed_at_ms < entry.region.last_health_update_ms {
            self.dropped_stale.fetch_add(1, Ordering::Relaxed);
            debug!(
                region_id = %id,
                observed_at_ms,
                stored_ms = entry.region.last_health_update_ms,
                "dropped out-of-order health update"
            );
            return Ok(false);
        }

        entry.region.health_score = health_score.clamp(0.0, 100.0);
        entry.region.error_rate = error_rate.clamp(0.0, 1.0);
        let utilization = utilization_pct.clamp(0.0, 100.0) / 100.0;
        entry.region.current_capacity =
            ((entry.region.max_capacity as f64) * utilization).round() as u64;
        entry.region.last_health_update_ms = observed_at_ms;

        debug!(
            region_id = %id,
            score = entry.region.health_score,
            error_rate = entry.region.error_rate,
            "health updated"
        );
        Ok(true)
    }

    /// Set a region's current capacity directly.
    pub fn update_capacity(&self, id: &str, current: u64) -> GridResult<()> {
        let mut regions = self.regions.write().expect("regions lock");
        let entry = regions
            .get_mut(id)
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))?;
        if current > entry.region.max_capacity {
            return Err(GridError::CapacityExceedsMax {
                region: id.to_string(),
                current,
                max: entry.region.max_capacity,
            });
        }
        entry.region.current_capacity = current;
        Ok(())
    }

    /// Remove a region. Rejected while any active deployment references it.
    pub fn remove(&self, id: &str) -> GridResult<Region> {
        let mut regions = self.regions.write().expect("regions lock");
        let entry = regions
            .get(id)
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))?;
        if let Some(deployment) = entry.in_use_by.iter().next() {
            return Err(GridError::InUse {
                region: id.to_string(),
                deployment: deployment.clone(),
            });
        }
        let entry = regions.remove(id).expect("checked above");
        info!(region_id = %id, "region removed");
        Ok(entry.region)
    }

    /// Record that `deployment` references this region.
    pub fn mark_in_use(&self, id: &str, deployment: &str) -> GridResult<()> {
        let mut regions = self.regions.write().expect("regions lock");
        let entry = regions
            .get_mut(id)
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))?;
        entry.in_use_by.insert(deployment.to_string());
        Ok(())
    }

    /// Drop a deployment's reference to this region.
    pub fn release(&self, id: &str, deployment: &str) -> GridResult<()> {
        let mut regions = self.regions.write().expect("regions lock");
        let entry = regions
            .get_mut(id)
            .ok_or_else(|| GridError::RegionNotFound(id.to_string()))?;
        entry.in_use_by.remove(deployment);
        Ok(())
    }

    /// Derived health view for one region.
    pub fn health_of(&self, id: &str) -> GridResult<RegionHealth> {
        self.get(id).map(|r| r.health())
    }

    /// Regions whose last accepted health update is older than `max_age_ms`.
    ///
    /// A region that was registered but never probed counts as stale.
    pub fn stale_regions(&self, clock: &dyn Clock, max_age_ms: u64) -> Vec<RegionId> {
        let now = clock.now_millis();
        let regions = self.regions.read().expect("regions lock");
        let mut out: Vec<RegionId> = regions
            .values()
            .filter(|e| e.region.last_health_update_ms.saturating_add(max_age_ms) < now)
            .map(|e| e.region.id.clone())
            .collect();
        out.sort();
        if !out.is_empty() {
            warn!(count = out.len(), "regions with stale health data");
        }
        out
    }

    /// Number of health updates dropped by the monotonic guard.
    pub fn dropped_stale_updates(&self) -> u64 {
        self.dropped_stale.load(Ordering::Relaxed)
    }
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::HealthStatus;
    use std::collections::BTreeSet;
    use crate::types::{ComplianceFramework, GeoCoordinates};

    fn test_region(id: &str, score: f64) -> Region {
        Region {
            id: id.to_string(),
            provider: "aws".to_string(),
            name: id.to_string(),
            coordinates: GeoCoordinates {
                latitude: 0.0,
                longitude: 0.0,
            },
            endpoint: format!("https://{id}.geogrid.dev"),
            health_score: score,
            error_rate: 0.0,
            current_capacity: 10,
            max_capacity: 100,
            cost_multiplier: 1.0,
            compliance_frameworks: BTreeSet::from([ComplianceFramework::Soc2]),
            last_health_update_ms: 0,
        }
    }

    #[test]
    fn register_and_get() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();

        let region = registry.get("us-east-1").unwrap();
        assert_eq!(region.health_score, 95.0);
        assert_eq!(
            registry.get("nope"),
            Err(GridError::RegionNotFound("nope".to_string()))
        );
    }

    #[test]
    fn register_is_idempotent_upsert() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();
        registry.mark_in_use("us-east-1", "dep-1").unwrap();

        // Re-registering replaces the definition but keeps the in-use mark.
        registry.register(test_region("us-east-1", 50.0)).unwrap();
        assert_eq!(registry.get("us-east-1").unwrap().health_score, 50.0);
        assert!(matches!(
            registry.remove("us-east-1"),
            Err(GridError::InUse { .. })
        ));
    }

    #[test]
    fn register_rejects_capacity_over_max() {
        let registry = RegionRegistry::new();
        let mut region = test_region("us-east-1", 95.0);
        region.current_capacity = 200;
        assert!(matches!(
            registry.register(region),
            Err(GridError::CapacityExceedsMax { .. })
        ));
    }

    #[test]
    fn register_clamps_score_into_range() {
        let registry = RegionRegistry::new();
        registry.register(test_region("hot", 250.0)).unwrap();
        registry.register(test_region("cold", -3.0)).unwrap();
        assert_eq!(registry.get("hot").unwrap().health_score, 100.0);
        assert_eq!(registry.get("cold").unwrap().health_score, 0.0);
    }

    #[test]
    fn list_healthy_only_filters_degraded() {
        let registry = RegionRegistry::new();
        registry.register(test_region("b-degraded", 50.0)).unwrap();
        registry.register(test_region("a-healthy", 90.0)).unwrap();
        registry.register(test_region("c-down", 10.0)).unwrap();

        let all = registry.list(false);
        assert_eq!(all.len(), 3);
        // Sorted by id.
        assert_eq!(all[0].id, "a-healthy");

        let healthy = registry.list(true);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, "a-healthy");
    }

    #[test]
    fn update_health_applies_and_projects_utilization() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();

        let applied = registry
            .update_health("us-east-1", 40.0, 0.2, 80.0, 1_000)
            .unwrap();
        assert!(applied);

        let region = registry.get("us-east-1").unwrap();
        assert_eq!(region.health_score, 40.0);
        assert_eq!(region.error_rate, 0.2);
        assert_eq!(region.current_capacity, 80);
        assert_eq!(region.last_health_update_ms, 1_000);
        assert_eq!(region.health().status, HealthStatus::Degraded);
    }

    #[test]
    fn stale_update_is_dropped_silently() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();
        registry
            .update_health("us-east-1", 40.0, 0.0, 10.0, 2_000)
            .unwrap();

        // Older observation arrives late — dropped, state untouched.
        let applied = registry
            .update_health("us-east-1", 90.0, 0.0, 50.0, 1_000)
            .unwrap();
        assert!(!applied);

        let region = registry.get("us-east-1").unwrap();
        assert_eq!(region.health_score, 40.0);
        assert_eq!(region.last_health_update_ms, 2_000);
        assert_eq!(registry.dropped_stale_updates(), 1);
    }

    #[test]
    fn update_capacity_rejects_over_max() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();

        registry.update_capacity("us-east-1", 99).unwrap();
        assert_eq!(registry.get("us-east-1").unwrap().current_capacity, 99);

        assert_eq!(
            registry.update_capacity("us-east-1", 101),
            Err(GridError::CapacityExceedsMax {
                region: "us-east-1".to_string(),
                current: 101,
                max: 100,
            })
        );
        // Rejected update mutated nothing.
        assert_eq!(registry.get("us-east-1").unwrap().current_capacity, 99);
    }

    #[test]
    fn remove_respects_in_use_marks() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();
        registry.mark_in_use("us-east-1", "dep-1").unwrap();

        let err = registry.remove("us-east-1").unwrap_err();
        assert_eq!(
            err,
            GridError::InUse {
                region: "us-east-1".to_string(),
                deployment: "dep-1".to_string(),
            }
        );

        registry.release("us-east-1", "dep-1").unwrap();
        registry.remove("us-east-1").unwrap();
        assert!(registry.get("us-east-1").is_err());
    }

    #[test]
    fn stale_regions_uses_injected_clock() {
        let registry = RegionRegistry::new();
        registry.register(test_region("us-east-1", 95.0)).unwrap();
        registry.register(test_region("eu-west-1", 95.0)).unwrap();
        registry
            .update_health("eu-west-1", 95.0, 0.0, 10.0, 90_000)
            .unwrap();

        let clock = ManualClock::new(100_000);
        // us-east-1 never probed; eu-west-1 updated 10s ago.
        assert_eq!(
            registry.stale_regions(&clock, 30_000),
            vec!["us-east-1".to_string()]
        );
        clock.advance(60_000);
        assert_eq!(registry.stale_regions(&clock, 30_000).len(), 2);
    }

    #[test]
    fn concurrent_reads_and_writes() {
        use std::thread;

        let registry = RegionRegistry::new();
        for i in 0..4 {
            registry.register(test_region(&format!("r{i}"), 90.0)).unwrap();
        }

        let mut handles = vec![];
        for t in 0..4u64 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100u64 {
                    let id = format!("r{}", i % 4);
                    registry
                        .update_health(&id, 90.0, 0.0, 10.0, t * 1_000 + i)
                        .unwrap();
                    let _ = registry.list(true);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.list(false).len(), 4);
    }
}
