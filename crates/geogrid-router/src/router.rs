//! Request router — picks exactly one target region per request.
//!
//! Each strategy is a pure function over a point-in-time snapshot of
//! the healthy-region set; the snapshot is taken once per call and
//! never re-read mid-computation. The round-robin counter is the only
//! mutable routing state. An empty healthy set fails every strategy
//! the same way, so callers have a single failure path to handle.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use geogrid_locality::LocalityOptimizer;
use geogrid_metrics::StatsCollector;
use geogrid_state::geo::haversine_km;
use geogrid_state::{
    ComplianceFramework, GeoCoordinates, GridError, GridResult, Region, RegionId, RegionRegistry,
    SharedClock,
};

use crate::balancer::RoundRobinBalancer;

/// Closed set of routing strategies, selected per call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    LatencyBased,
    CapacityBased,
    ComplianceBased,
    CostBased,
    HealthBased,
    RoundRobin,
    Random,
}

impl RoutingStrategy {
    /// All strategies, for exhaustive testing and stats labels.
    pub const ALL: [RoutingStrategy; 7] = [
        Self::LatencyBased,
        Self::CapacityBased,
        Self::ComplianceBased,
        Self::CostBased,
        Self::HealthBased,
        Self::RoundRobin,
        Self::Random,
    ];
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LatencyBased => "latency_based",
            Self::CapacityBased => "capacity_based",
            Self::ComplianceBased => "compliance_based",
            Self::CostBased => "cost_based",
            Self::HealthBased => "health_based",
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        };
        f.write_str(s)
    }
}

/// Per-request context a strategy may consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_location: Option<GeoCoordinates>,
    pub compliance_requirements: BTreeSet<ComplianceFramework>,
    /// Seed for the `random` strategy, so selection is a pure function
    /// of the request.
    pub random_seed: u64,
}

impl RequestContext {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            user_location: None,
            compliance_requirements: BTreeSet::new(),
            random_seed: 0,
        }
    }

    pub fn with_location(mut self, location: GeoCoordinates) -> Self {
        self.user_location = Some(location);
        self
    }

    pub fn with_compliance(mut self, requirements: BTreeSet<ComplianceFramework>) -> Self {
        self.compliance_requirements = requirements;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

/// One routing decision. Ephemeral; optionally counted for statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub selected_region: RegionId,
    pub strategy_used: RoutingStrategy,
    /// Human-readable trace stating the winning metric value.
    pub reasoning: String,
    pub timestamp_ms: u64,
    pub candidates_considered: usize,
}

/// Routes requests to regions using a per-call strategy.
#[derive(Clone)]
pub struct Router {
    registry: RegionRegistry,
    balancer: Arc<RoundRobinBalancer>,
    clock: SharedClock,
    stats: Option<StatsCollector>,
}

impl Router {
    pub fn new(registry: RegionRegistry, clock: SharedClock) -> Self {
        Self {
            registry,
            balancer: Arc::new(RoundRobinBalancer::new()),
            clock,
            stats: None,
        }
    }

    /// Attach a stats collector; every decision is counted into it.
    pub fn with_stats(mut self, stats: StatsCollector) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Route one request.
    ///
    /// Candidates are the healthy regions at the moment of the call,
    /// sorted by id. All errors are terminal for this attempt — retrying
    /// without new information cannot change the outcome.
    pub fn route(
        &self,
        ctx: &RequestContext,
        strategy: RoutingStrategy,
    ) -> GridResult<RoutingDecision> {
        let candidates = self.registry.list(true);
        if candidates.is_empty() {
            return Err(GridError::NoHealthyRegions {
                strategy: strategy.to_string(),
                candidates: 0,
            });
        }

        let (selected, reasoning) = match strategy {
            RoutingStrategy::LatencyBased => select_by_latency(&candidates, ctx)?,
            RoutingStrategy::CapacityBased => select_by_capacity(&candidates),
            RoutingStrategy::ComplianceBased => select_by_compliance(&candidates, ctx)?,
            RoutingStrategy::CostBased => select_by_cost(&candidates),
            RoutingStrategy::HealthBased => select_by_health(&candidates),
            RoutingStrategy::RoundRobin => self.select_round_robin(&candidates),
            RoutingStrategy::Random => select_random(&candidates, ctx),
        };

        let decision = RoutingDecision {
            selected_region: selected,
            strategy_used: strategy,
            reasoning,
            timestamp_ms: self.clock.now_millis(),
            candidates_considered: candidates.len(),
        };

        if let Some(stats) = &self.stats {
            stats.record_decision(&decision.selected_region, &strategy.to_string());
        }
        debug!(
            request_id = %ctx.request_id,
            region = %decision.selected_region,
            strategy = %strategy,
            "routed"
        );
        Ok(decision)
    }

    fn select_round_robin(&self, candidates: &[Region]) -> (RegionId, String) {
        // Candidates are id-sorted, so the cycle order is deterministic
        // even as membership fluctuates between calls.
        let idx = self
            .balancer
            .next(candidates.len())
            .expect("non-empty candidate set");
        let region = &candidates[idx];
        (
            region.id.clone(),
            format!(
                "selected {}: round-robin slot {} of {} candidates",
                region.id,
                idx,
                candidates.len()
            ),
        )
    }
}

fn select_by_latency(
    candidates: &[Region],
    ctx: &RequestContext,
) -> GridResult<(RegionId, String)> {
    let location = ctx.user_location.as_ref().ok_or_else(|| {
        GridError::InvalidRoutingRequest(
            "latency_based routing requires a user location".to_string(),
        )
    })?;

    // Ties on distance go to the higher health score; equal on both
    // falls back to the id-sorted input order.
    let (distance, region) = candidates
        .iter()
        .map(|r| (haversine_km(location, &r.coordinates), r))
        .min_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then(b.health_score.total_cmp(&a.health_score))
        })
        .expect("non-empty candidate set");

    Ok((
        region.id.clone(),
        format!(
            "selected {}: distance {:.0}km, lowest of {} candidates",
            region.id,
            distance,
            candidates.len()
        ),
    ))
}

fn select_by_capacity(candidates: &[Region]) -> (RegionId, String) {
    // min_by keeps the first of equals, and the input is id-sorted, so
    // utilization ties break on region id for determinism.
    let region = candidates
        .iter()
        .min_by(|a, b| a.utilization().total_cmp(&b.utilization()))
        .expect("non-empty candidate set");
    (
        region.id.clone(),
        format!(
            "selected {}: utilization {:.1}%, lowest of {} candidates",
            region.id,
            region.utilization() * 100.0,
            candidates.len()
        ),
    )
}

fn select_by_compliance(
    candidates: &[Region],
    ctx: &RequestContext,
) -> GridResult<(RegionId, String)> {
    let survivors = LocalityOptimizer::filter_compliant(candidates, &ctx.compliance_requirements);
    if survivors.is_empty() {
        return Err(GridError::NoCompliantRegion {
            required: ctx
                .compliance_requirements
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            candidates: candidates.len(),
        });
    }

    let (id, _) = pick_healthiest(&survivors);
    Ok((
        id.clone(),
        format!(
            "selected {id}: healthiest of {} compliant ({} candidates)",
            survivors.len(),
            candidates.len()
        ),
    ))
}

fn select_by_cost(candidates: &[Region]) -> (RegionId, String) {
    let region = candidates
        .iter()
        .min_by(|a, b| {
            a.cost_multiplier
                .total_cmp(&b.cost_multiplier)
                .then(b.health_score.total_cmp(&a.health_score))
        })
        .expect("non-empty candidate set");
    (
        region.id.clone(),
        format!(
            "selected {}: cost multiplier {:.2}, lowest of {} candidates",
            region.id,
            region.cost_multiplier,
            candidates.len()
        ),
    )
}

fn select_by_health(candidates: &[Region]) -> (RegionId, String) {
    let (id, score) = pick_healthiest(candidates);
    (
        id.clone(),
        format!(
            "selected {id}: health {score:.1}, highest of {} candidates",
            candidates.len()
        ),
    )
}

fn select_random(candidates: &[Region], ctx: &RequestContext) -> (RegionId, String) {
    let mut rng = StdRng::seed_from_u64(ctx.random_seed);
    let idx = rng.gen_range(0..candidates.len());
    let region = &candidates[idx];
    (
        region.id.clone(),
        format!(
            "selected {}: uniform pick of {} candidates",
            region.id,
            candidates.len()
        ),
    )
}

/// Highest health score; ties go to the smallest region id.
fn pick_healthiest(candidates: &[Region]) -> (&RegionId, f64) {
    let region = candidates
        .iter()
        .max_by(|a, b| {
            a.health_score
                .total_cmp(&b.health_score)
                .then(b.id.cmp(&a.id))
        })
        .expect("non-empty candidate set");
    (&region.id, region.health_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geogrid_state::ManualClock;
    use std::collections::BTreeSet;
    use std::collections::HashSet;

    fn region(id: &str, score: f64) -> Region {
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
            compliance_frameworks: BTreeSet::new(),
            last_health_update_ms: 0,
        }
    }

    fn setup(regions: Vec<Region>) -> Router {
        let registry = RegionRegistry::new();
        for r in regions {
            registry.register(r).unwrap();
        }
        Router::new(registry, Arc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn empty_healthy_set_fails_every_strategy() {
        let mut down = region("us-east-1", 10.0); // Unhealthy.
        down.compliance_frameworks = BTreeSet::from([ComplianceFramework::Gdpr]);
        let router = setup(vec![down]);
        let ctx = RequestContext::new("req-1").with_location(GeoCoordinates {
            latitude: 0.0,
            longitude: 0.0,
        });

        for strategy in RoutingStrategy::ALL {
            let err = router.route(&ctx, strategy).unwrap_err();
            assert_eq!(
                err,
                GridError::NoHealthyRegions {
                    strategy: strategy.to_string(),
                    candidates: 0
                },
                "strategy {strategy}"
            );
        }
    }

    #[test]
    fn every_strategy_returns_a_member_of_the_healthy_set() {
        let mut r1 = region("a", 90.0);
        r1.compliance_frameworks = BTreeSet::from([ComplianceFramework::Gdpr]);
        let mut r2 = region("b", 80.0);
        r2.compliance_frameworks = BTreeSet::from([ComplianceFramework::Gdpr]);
        let router = setup(vec![r1, r2, region("c-degraded", 40.0)]);

        let healthy: HashSet<String> = HashSet::from(["a".to_string(), "b".to_string()]);
        let ctx = RequestContext::new("req-1")
            .with_location(GeoCoordinates {
                latitude: 10.0,
                longitude: 10.0,
            })
            .with_compliance(BTreeSet::from([ComplianceFramework::Gdpr]))
            .with_seed(7);

        for strategy in RoutingStrategy::ALL {
            let decision = router.route(&ctx, strategy).unwrap();
            assert!(
                healthy.contains(&decision.selected_region),
                "strategy {strategy} picked {}",
                decision.selected_region
            );
        }
    }

    #[test]
    fn latency_based_picks_nearest() {
        let mut us = region("us-east-1", 95.0);
        us.coordinates = GeoCoordinates {
            latitude: 37.4,
            longitude: -77.5,
        };
        let mut eu = region("eu-west-1", 90.0);
        eu.coordinates = GeoCoordinates {
            latitude: 53.3,
            longitude: -6.2,
        };
        let router = setup(vec![us, eu]);

        let berlin = GeoCoordinates {
            latitude: 52.5,
            longitude: 13.4,
        };
        let decision = router
            .route(
                &RequestContext::new("req-1").with_location(berlin),
                RoutingStrategy::LatencyBased,
            )
            .unwrap();
        assert_eq!(decision.selected_region, "eu-west-1");
        assert!(decision.reasoning.contains("distance"));
        assert_eq!(decision.candidates_considered, 2);
    }

    #[test]
    fn latency_based_without_location_is_rejected() {
        let router = setup(vec![region("a", 90.0)]);
        let err = router
            .route(&RequestContext::new("req-1"), RoutingStrategy::LatencyBased)
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidRoutingRequest(_)));
    }

    #[test]
    fn capacity_based_prefers_least_utilized_with_stable_ties() {
        let mut full = region("a", 90.0);
        full.current_capacity = 90;
        let mut idle = region("b", 90.0);
        idle.current_capacity = 5;
        let mut idle_too = region("c", 90.0);
        idle_too.current_capacity = 5;
        let router = setup(vec![full, idle, idle_too]);

        let decision = router
            .route(&RequestContext::new("req-1"), RoutingStrategy::CapacityBased)
            .unwrap();
        // b and c tie at 5% — the smaller id wins, deterministically.
        assert_eq!(decision.selected_region, "b");
    }

    #[test]
    fn compliance_based_filters_then_ranks_by_health() {
        let mut eu = region("eu-west-1", 80.0);
        eu.compliance_frameworks = BTreeSet::from([ComplianceFramework::Gdpr]);
        let us = region("us-east-1", 99.0); // Healthier but not compliant.
        let router = setup(vec![eu, us]);

        let ctx = RequestContext::new("req-1")
            .with_compliance(BTreeSet::from([ComplianceFramework::Gdpr]));
        let decision = router.route(&ctx, RoutingStrategy::ComplianceBased).unwrap();
        assert_eq!(decision.selected_region, "eu-west-1");

        let strict = RequestContext::new("req-2")
            .with_compliance(BTreeSet::from([ComplianceFramework::Hipaa]));
        let err = router.route(&strict, RoutingStrategy::ComplianceBased).unwrap_err();
        assert!(matches!(err, GridError::NoCompliantRegion { candidates: 2, .. }));
    }

    #[test]
    fn cost_based_breaks_ties_by_health() {
        let mut cheap_sick = region("a", 60.0); // Degraded — filtered out.
        cheap_sick.cost_multiplier = 0.5;
        let mut cheap = region("b", 85.0);
        cheap.cost_multiplier = 0.8;
        let mut cheap_healthier = region("c", 95.0);
        cheap_healthier.cost_multiplier = 0.8;
        let router = setup(vec![cheap_sick, cheap, cheap_healthier]);

        let decision = router
            .route(&RequestContext::new("req-1"), RoutingStrategy::CostBased)
            .unwrap();
        assert_eq!(decision.selected_region, "c");
    }

    #[test]
    fn health_based_picks_highest_score() {
        let router = setup(vec![region("a", 85.0), region("b", 92.0)]);
        let decision = router
            .route(&RequestContext::new("req-1"), RoutingStrategy::HealthBased)
            .unwrap();
        assert_eq!(decision.selected_region, "b");
        assert!(decision.reasoning.contains("92.0"));
    }

    #[test]
    fn round_robin_visits_each_region_exactly_once_per_cycle() {
        let router = setup(vec![region("a", 90.0), region("b", 90.0), region("c", 90.0)]);
        let ctx = RequestContext::new("req-1");

        let mut first_cycle = vec![];
        for _ in 0..3 {
            first_cycle.push(
                router
                    .route(&ctx, RoutingStrategy::RoundRobin)
                    .unwrap()
                    .selected_region,
            );
        }
        let distinct: HashSet<&String> = first_cycle.iter().collect();
        assert_eq!(distinct.len(), 3, "one visit per region: {first_cycle:?}");

        // The next cycle repeats the same order.
        for expected in &first_cycle {
            let got = router
                .route(&ctx, RoutingStrategy::RoundRobin)
                .unwrap()
                .selected_region;
            assert_eq!(&got, expected);
        }
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let router = setup(vec![region("a", 90.0), region("b", 90.0), region("c", 90.0)]);

        let pick = |seed: u64| {
            router
                .route(
                    &RequestContext::new("req-1").with_seed(seed),
                    RoutingStrategy::Random,
                )
                .unwrap()
                .selected_region
        };
        assert_eq!(pick(7), pick(7));
    }

    #[test]
    fn decisions_are_counted_when_stats_attached() {
        let stats = StatsCollector::new();
        let registry = RegionRegistry::new();
        registry.register(region("a", 90.0)).unwrap();
        let router =
            Router::new(registry, Arc::new(ManualClock::new(0))).with_stats(stats.clone());

        router
            .route(&RequestContext::new("req-1"), RoutingStrategy::HealthBased)
            .unwrap();
        router
            .route(&RequestContext::new("req-2"), RoutingStrategy::RoundRobin)
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.decisions_by_region["a"], 2);
        assert_eq!(snapshot.decisions_by_strategy["health_based"], 1);
    }

    #[test]
    fn decision_timestamp_comes_from_injected_clock() {
        let registry = RegionRegistry::new();
        registry.register(region("a", 90.0)).unwrap();
        let clock = Arc::new(ManualClock::new(42_000));
        let router = Router::new(registry, clock.clone());

        let decision = router
            .route(&RequestContext::new("req-1"), RoutingStrategy::HealthBased)
            .unwrap();
        assert_eq!(decision.timestamp_ms, 42_000);
    }
}
