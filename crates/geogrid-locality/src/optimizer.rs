//! Locality optimizer — classification, region selection, replication planning.
//!
//! Candidate evaluation is filter-then-rank: hard constraints (health,
//! compliance superset, allow-list) reject regions outright, then the
//! survivors are ranked by distance or health. Placement that would
//! break a policy fails with a compliance error, never a silent
//! downgrade to fewer or different targets.

use std::collections::BTreeSet;

use tracing::debug;

use geogrid_state::hash::fnv1a_64;
use geogrid_state::{
    ComplianceFramework, DataClass, DataPlacementPolicy, GeoCoordinates, GridError, GridResult,
    Region, RegionId, RegionRegistry, ReplicationStrategy, geo::haversine_km,
};

/// Tunables for data classification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LocalityConfig {
    /// Accesses per day at or above which data counts as hot.
    pub hot_threshold_per_day: f64,
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            hot_threshold_per_day: 10.0,
        }
    }
}

/// Plans where data may live given compliance constraints.
#[derive(Clone)]
pub struct LocalityOptimizer {
    registry: RegionRegistry,
    config: LocalityConfig,
}

impl LocalityOptimizer {
    pub fn new(registry: RegionRegistry) -> Self {
        Self {
            registry,
            config: LocalityConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LocalityConfig) -> Self {
        self.config = config;
        self
    }

    /// Classify data by access frequency.
    ///
    /// Hot data is replicated to every eligible region; cold data stays
    /// in its primary region only.
    pub fn classify_data(&self, access_frequency_per_day: f64) -> DataClass {
        if access_frequency_per_day >= self.config.hot_threshold_per_day {
            DataClass::Hot
        } else {
            DataClass::Cold
        }
    }

    /// Keep only candidates whose frameworks cover every requirement.
    ///
    /// Pure function over a caller-supplied snapshot so the router can
    /// filter its own point-in-time candidate set.
    pub fn filter_compliant(
        candidates: &[Region],
        required: &BTreeSet<ComplianceFramework>,
    ) -> Vec<Region> {
        candidates
            .iter()
            .filter(|r| r.is_compliant_with(required))
            .cloned()
            .collect()
    }

    /// Pick the best healthy region satisfying the compliance requirements.
    ///
    /// With a user location, picks the geodesically nearest survivor;
    /// otherwise picks the one with the highest health score. Ties go to
    /// the lexicographically smallest region id.
    pub fn find_optimal_region(
        &self,
        requirements: &BTreeSet<ComplianceFramework>,
        user_location: Option<&GeoCoordinates>,
    ) -> GridResult<RegionId> {
        let healthy = self.registry.list(true);
        let compliant = Self::filter_compliant(&healthy, requirements);
        if compliant.is_empty() {
            return Err(GridError::NoCompliantRegion {
                required: join_frameworks(requirements),
                candidates: healthy.len(),
            });
        }

        let winner = match user_location {
            Some(location) => compliant
                .iter()
                .map(|r| (haversine_km(location, &r.coordinates), r))
                .min_by(|(da, _), (db, _)| da.total_cmp(db))
                .map(|(_, r)| r),
            // `compliant` is id-sorted, so strict comparison keeps the
            // smallest id on ties.
            None => compliant.iter().max_by(|a, b| {
                a.health_score
                    .total_cmp(&b.health_score)
                    .then(b.id.cmp(&a.id))
            }),
        };
        let winner = winner.expect("non-empty candidate set");
        debug!(region_id = %winner.id, located = user_location.is_some(), "optimal region selected");
        Ok(winner.id.clone())
    }

    /// Healthy regions legal under the given policy, sorted by id.
    pub fn eligible_regions(&self, policy: &DataPlacementPolicy) -> Vec<Region> {
        self.registry
            .list(true)
            .into_iter()
            .filter(|r| r.is_compliant_with(&policy.required_frameworks))
            .filter(|r| {
                policy.allowed_regions.is_empty() || policy.allowed_regions.contains(&r.id)
            })
            .collect()
    }

    /// Plan replication targets for a piece of data.
    ///
    /// `full` replicates to every eligible region, `partial` follows the
    /// hot/cold classification, and `sharded` picks one stable target by
    /// FNV-1a of the data identifier — consistent across repeated calls
    /// and across ports, changing only when the eligible set changes.
    pub fn plan_replication(
        &self,
        primary: &str,
        data_id: &str,
        classification: DataClass,
        strategy: ReplicationStrategy,
        policy: &DataPlacementPolicy,
    ) -> GridResult<Vec<RegionId>> {
        // Unknown primaries are caller bugs, not empty plans.
        self.registry.get(primary)?;

        let eligible = self.eligible_regions(policy);
        let targets: Vec<RegionId> = match (strategy, classification) {
            (ReplicationStrategy::Full, _) | (ReplicationStrategy::Partial, DataClass::Hot) => {
                if eligible.is_empty() {
                    return Err(GridError::NoCompliantRegion {
                        required: join_frameworks(&policy.required_frameworks),
                        candidates: 0,
                    });
                }
                eligible.iter().map(|r| r.id.clone()).collect()
            }
            (ReplicationStrategy::Partial, DataClass::Cold) => {
                // Cold data stays home; the primary itself must still be
                // legal under the policy.
                let primary_eligible = eligible.iter().any(|r| r.id == primary);
                if !primary_eligible {
                    return Err(GridError::ComplianceViolation {
                        region: primary.to_string(),
                        policy: policy.name.clone(),
                        detail: "primary region is not eligible under this policy".to_string(),
                    });
                }
                vec![primary.to_string()]
            }
            (ReplicationStrategy::Sharded, _) => {
                if eligible.is_empty() {
                    return Err(GridError::NoCompliantRegion {
                        required: join_frameworks(&policy.required_frameworks),
                        candidates: 0,
                    });
                }
                let idx = (fnv1a_64(data_id.as_bytes()) % eligible.len() as u64) as usize;
                vec![eligible[idx].id.clone()]
            }
        };

        // A policy that forbids cross-region transfer only lets data
        // leave its primary for explicitly allow-listed regions.
        if !policy.cross_region_transfer {
            for target in &targets {
                if target != primary && !policy.allowed_regions.contains(target) {
                    return Err(GridError::ComplianceViolation {
                        region: target.clone(),
                        policy: policy.name.clone(),
                        detail: format!(
                            "cross-region transfer to {target} is not permitted"
                        ),
                    });
                }
            }
        }

        debug!(
            primary = %primary,
            strategy = ?strategy,
            targets = targets.len(),
            "replication planned"
        );
        Ok(targets)
    }
}

fn join_frameworks(required: &BTreeSet<ComplianceFramework>) -> String {
    required
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
