//! Failure handler — detects region failure and promotes a replacement
//! within a bounded time budget.
//!
//! Failover is the only operation here with a hard wall-clock budget.
//! The whole attempt runs under a deadline; once the budget is gone the
//! result is terminal for that attempt and the system is left in a
//! defined degraded state: the failed region stays excluded from
//! routing and no replacement is promoted. Nothing in this module
//! blocks on network I/O — decisions are made against local state and
//! actuation is the external traffic layer's job.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use geogrid_deploy::{DeploymentOrchestrator, ElectionWeights, election};
use geogrid_locality::LocalityOptimizer;
use geogrid_metrics::StatsCollector;
use geogrid_router::{RequestContext, Router, RoutingStrategy};
use geogrid_state::hash::fnv1a_64;
use geogrid_state::{
    ComplianceFramework, DataPlacementPolicy, Deployment, DeploymentStrategy, FailoverEvent,
    FailoverStrategy, GridError, GridResult, HealthStatus, PolicyStore, RegionId, RegionRegistry,
    SharedClock,
};

/// Failover tunables.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FailoverConfig {
    /// Hard budget for one failover attempt.
    pub failover_timeout_ms: u64,
    /// Grace window for draining traffic on graceful failover.
    pub drain_window_ms: u64,
    /// Health score at which a recovered region is re-admitted.
    pub healthy_threshold: f64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failover_timeout_ms: 1_000,
            drain_window_ms: 5_000,
            healthy_threshold: 70.0,
        }
    }
}

/// Handles region failure, recovery, and operator-triggered failover.
#[derive(Clone)]
pub struct FailureHandler {
    registry: RegionRegistry,
    router: Router,
    locality: LocalityOptimizer,
    orchestrator: DeploymentOrchestrator,
    policies: PolicyStore,
    clock: SharedClock,
    config: FailoverConfig,
    weights: ElectionWeights,
    events: Arc<RwLock<Vec<FailoverEvent>>>,
    stats: Option<StatsCollector>,
}

impl FailureHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: RegionRegistry,
        router: Router,
        locality: LocalityOptimizer,
        orchestrator: DeploymentOrchestrator,
        policies: PolicyStore,
        clock: SharedClock,
        config: FailoverConfig,
    ) -> Self {
        Self {
            registry,
            router,
            locality,
            orchestrator,
            policies,
            clock,
            config,
            weights: ElectionWeights::default(),
            events: Arc::new(RwLock::new(Vec::new())),
            stats: None,
        }
    }

    /// Attach a stats collector; every failover attempt is counted.
    pub fn with_stats(mut self, stats: StatsCollector) -> Self {
        self.stats = Some(stats);
        self
    }

    /// React to a detected region failure.
    ///
    /// Marks the region unhealthy, selects a replacement restricted to
    /// regions compliant with any policy bound to the affected
    /// deployments, and promotes it in each of them. Fails with
    /// `FailoverFailed` when no eligible replacement exists or the
    /// budget is exhausted; there are no internal retries.
    pub async fn handle_region_failure(
        &self,
        failed: &str,
        reason: &str,
    ) -> GridResult<FailoverEvent> {
        let started = self.clock.now_millis();
        let budget = Duration::from_millis(self.config.failover_timeout_ms);

        match tokio::time::timeout(budget, self.run_failover(failed, reason, started)).await {
            Ok(result) => result,
            Err(_) => {
                let err = GridError::FailoverFailed {
                    from: failed.to_string(),
                    reason: "failover budget exhausted".to_string(),
                    elapsed_ms: self.config.failover_timeout_ms,
                };
                self.finish(failed, None, reason, FailoverStrategy::Immediate, started, false);
                Err(err)
            }
        }
    }

    async fn run_failover(
        &self,
        failed: &str,
        reason: &str,
        started: u64,
    ) -> GridResult<FailoverEvent> {
        warn!(region = %failed, reason = %reason, "handling region failure");

        // Exclude the region from routing before anything else; even a
        // failed failover must leave it out of rotation.
        let current = self.registry.get(failed)?;
        self.registry.update_health(
            failed,
            0.0,
            1.0,
            current.utilization() * 100.0,
            self.clock.now_millis(),
        )?;

        let affected = self.orchestrator.deployments_for_region(failed);
        let bound_policies = self.resolve_policies(&affected);

        let replacement = match self.select_replacement(failed, &bound_policies) {
            Ok(region) => region,
            Err(e) => {
                let elapsed = self.clock.now_millis().saturating_sub(started);
                self.finish(failed, None, reason, FailoverStrategy::Immediate, started, false);
                return Err(GridError::FailoverFailed {
                    from: failed.to_string(),
                    reason: format!("no eligible replacement: {e}"),
                    elapsed_ms: elapsed,
                });
            }
        };

        // The budget gates the promotion itself: never start mutating
        // deployments after the deadline has passed.
        let elapsed = self.clock.now_millis().saturating_sub(started);
        if elapsed > self.config.failover_timeout_ms {
            self.finish(failed, None, reason, FailoverStrategy::Immediate, started, false);
            return Err(GridError::FailoverFailed {
                from: failed.to_string(),
                reason: "failover budget exhausted before promotion".to_string(),
                elapsed_ms: elapsed,
            });
        }

        for deployment in &affected {
            self.promote_in(deployment, failed, &replacement)?;
        }

        let event = self.finish(
            failed,
            Some(replacement.clone()),
            reason,
            FailoverStrategy::Immediate,
            started,
            true,
        );
        info!(
            from = %failed,
            to = %replacement,
            deployments = affected.len(),
            duration_ms = event.duration_ms,
            "failover completed"
        );
        Ok(event)
    }

    /// Re-admit a region once its reported health is back above the
    /// healthy threshold.
    ///
    /// Returns `false` when the region is still below the threshold.
    /// The region's prior role is not restored: a recovered primary
    /// re-enters as standby so recovery cannot flap traffic.
    pub fn recover_region(&self, region: &str) -> GridResult<bool> {
        let health = self.registry.health_of(region)?;
        if health.health_score < self.config.healthy_threshold {
            debug!(
                region = %region,
                score = health.health_score,
                threshold = self.config.healthy_threshold,
                "region not yet healthy enough to recover"
            );
            return Ok(false);
        }

        for deployment in self.orchestrator.deployments_for_region(region) {
            self.orchestrator.recover(&deployment.id, region)?;
        }
        info!(region = %region, score = health.health_score, "region recovered");
        Ok(true)
    }

    /// Operator-triggered failover from one region to another.
    ///
    /// `Graceful` waits out the drain window before switching so
    /// in-flight routing decisions toward `from` can age out;
    /// `Immediate` switches at once.
    pub async fn failover_to(
        &self,
        from: &str,
        to: &str,
        strategy: FailoverStrategy,
        reason: &str,
    ) -> GridResult<FailoverEvent> {
        let started = self.clock.now_millis();
        self.registry.get(from)?;
        let target_health = self.registry.health_of(to)?;
        if target_health.status == HealthStatus::Unhealthy {
            return Err(GridError::FailoverFailed {
                from: from.to_string(),
                reason: format!("target region {to} is unhealthy"),
                elapsed_ms: 0,
            });
        }

        if strategy == FailoverStrategy::Graceful {
            debug!(from = %from, drain_ms = self.config.drain_window_ms, "draining before switch");
            tokio::time::sleep(Duration::from_millis(self.config.drain_window_ms)).await;
        }

        for deployment in self.orchestrator.deployments_for_region(from) {
            self.promote_in(&deployment, from, &to.to_string())?;
        }

        let event = self.finish(from, Some(to.to_string()), reason, strategy, started, true);
        info!(from = %from, to = %to, strategy = ?strategy, "manual failover completed");
        Ok(event)
    }

    /// The append-only failover audit log, oldest first.
    pub fn events(&self) -> Vec<FailoverEvent> {
        self.events.read().expect("events lock").clone()
    }

    // ── Internals ──────────────────────────────────────────────────

    fn resolve_policies(&self, affected: &[Deployment]) -> Vec<DataPlacementPolicy> {
        affected
            .iter()
            .filter_map(|d| d.policy.as_ref())
            .filter_map(|name| match self.policies.get(name) {
                Ok(policy) => Some(policy),
                Err(e) => {
                    warn!(policy = %name, error = %e, "bound policy missing, ignoring");
                    None
                }
            })
            .collect()
    }

    /// Pick the replacement region: health-ranked, restricted to the
    /// compliance requirements of every bound policy.
    fn select_replacement(
        &self,
        failed: &str,
        policies: &[DataPlacementPolicy],
    ) -> GridResult<RegionId> {
        let requirements: BTreeSet<ComplianceFramework> = policies
            .iter()
            .flat_map(|p| p.required_frameworks.iter().copied())
            .collect();

        let ctx = RequestContext::new("failover").with_compliance(requirements.clone());
        let strategy = if requirements.is_empty() {
            RoutingStrategy::HealthBased
        } else {
            RoutingStrategy::ComplianceBased
        };
        let decision = self.router.route(&ctx, strategy)?;

        // Explicit allow-lists constrain further than frameworks do. If
        // the routed pick is outside one, fall back to the healthiest
        // region every policy's eligible set contains — one bounded
        // re-selection, no loop.
        let allowed_by_all = |id: &RegionId| {
            policies
                .iter()
                .all(|p| p.allowed_regions.is_empty() || p.allowed_regions.contains(id))
        };
        if allowed_by_all(&decision.selected_region) {
            return Ok(decision.selected_region);
        }

        let mut survivors = self.registry.list(true);
        for policy in policies {
            let eligible: BTreeSet<RegionId> = self
                .locality
                .eligible_regions(policy)
                .into_iter()
                .map(|r| r.id)
                .collect();
            survivors.retain(|r| eligible.contains(&r.id));
        }
        let candidates = survivors.len();
        survivors
            .iter()
            .filter(|r| r.id != failed)
            .max_by(|a, b| a.health_score.total_cmp(&b.health_score).then(b.id.cmp(&a.id)))
            .map(|r| r.id.clone())
            .ok_or_else(|| GridError::NoCompliantRegion {
                required: requirements
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                candidates,
            })
    }

    /// Promote the replacement in one deployment. Leader-election
    /// deployments re-elect among their own surviving candidates and
    /// only fall back to the routed replacement when none are healthy.
    fn promote_in(
        &self,
        deployment: &Deployment,
        failed: &str,
        replacement: &RegionId,
    ) -> GridResult<()> {
        let replacement = if deployment.strategy == DeploymentStrategy::LeaderElection {
            let survivors: Vec<_> = deployment
                .roles
                .keys()
                .filter(|id| id.as_str() != failed)
                .filter_map(|id| self.registry.get(id).ok())
                .filter(|r| r.health().status == HealthStatus::Healthy)
                .collect();
            let seed = fnv1a_64(deployment.id.as_bytes());
            match election::elect(&survivors, &self.weights, seed) {
                Some(winner) => winner.region_id,
                None => replacement.clone(),
            }
        } else {
            replacement.clone()
        };
        self.orchestrator
            .handle_failure(&deployment.id, failed, Some(&replacement))
    }

    fn finish(
        &self,
        from: &str,
        to: Option<RegionId>,
        reason: &str,
        strategy: FailoverStrategy,
        started: u64,
        success: bool,
    ) -> FailoverEvent {
        let completed = self.clock.now_millis();
        let event = FailoverEvent {
            from_region: from.to_string(),
            to_region: to,
            reason: reason.to_string(),
            strategy,
            started_at_ms: started,
            completed_at_ms: completed,
            duration_ms: completed.saturating_sub(started),
        };
        self.events.write().expect("events lock").push(event.clone());
        if let Some(stats) = &self.stats {
            stats.record_failover(event.duration_ms, success);
        }
        event
    }
}
