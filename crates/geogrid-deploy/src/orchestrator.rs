//! Deployment orchestrator — drives the four deployment topologies.
//!
//! Deployments live in a shared table; every transition on a deployment
//! happens under the table's write lock and bumps the deployment's
//! version, so two failovers can never race to promote two different
//! replacements. Invalid input fails before any state is persisted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use geogrid_state::{
    BlueGreenSwitch, Deployment, DeploymentId, DeploymentStatus, DeploymentStrategy, GridError,
    GridResult, PolicyName, RegionId, RegionRegistry, RegionRole, ReplicationStrategy, SharedClock,
};

use crate::election::{self, CandidateScore, ElectionWeights};

/// Result of a leader election, with per-candidate scores for audit.
#[derive(Debug, Clone)]
pub struct ElectionOutcome {
    pub deployment: Deployment,
    pub scores: Vec<CandidateScore>,
}

/// Creates and transitions deployments across regions.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    registry: RegionRegistry,
    deployments: Arc<RwLock<HashMap<DeploymentId, Deployment>>>,
    clock: SharedClock,
    weights: ElectionWeights,
    seq: Arc<AtomicU64>,
}

impl DeploymentOrchestrator {
    pub fn new(registry: RegionRegistry, clock: SharedClock) -> Self {
        Self {
            registry,
            deployments: Arc::new(RwLock::new(HashMap::new())),
            clock,
            weights: ElectionWeights::default(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_election_weights(mut self, weights: ElectionWeights) -> Self {
        self.weights = weights;
        self
    }

    // ── Deployment creation ────────────────────────────────────────

    /// Deploy with every region active. No single point of failure by
    /// construction. Replication defaults to full.
    pub fn deploy_active_active(
        &self,
        regions: &[RegionId],
        replication: Option<ReplicationStrategy>,
    ) -> GridResult<Deployment> {
        self.validate_regions(regions)?;
        let roles = regions
            .iter()
            .map(|id| (id.clone(), RegionRole::Active))
            .collect();
        self.activate(
            DeploymentStrategy::ActiveActive,
            roles,
            replication.unwrap_or(ReplicationStrategy::Full),
            None,
        )
    }

    /// Deploy with one primary serving traffic and standbys receiving
    /// replicated data until promoted.
    pub fn deploy_active_passive(
        &self,
        primary: &RegionId,
        backups: &[RegionId],
        replication: ReplicationStrategy,
    ) -> GridResult<Deployment> {
        if backups.is_empty() {
            return Err(GridError::InvalidDeploymentSpec(
                "active_passive requires at least one standby".to_string(),
            ));
        }
        if backups.contains(primary) {
            return Err(GridError::InvalidDeploymentSpec(format!(
                "primary {primary} also listed as standby"
            )));
        }
        let mut all = vec![primary.clone()];
        all.extend_from_slice(backups);
        self.validate_regions(&all)?;

        let mut roles: BTreeMap<RegionId, RegionRole> = backups
            .iter()
            .map(|id| (id.clone(), RegionRole::Standby))
            .collect();
        roles.insert(primary.clone(), RegionRole::Active);
        self.activate(DeploymentStrategy::ActivePassive, roles, replication, None)
    }

    /// Elect a leader among the candidates and deploy the rest as
    /// standbys. Re-election is triggered explicitly on leader failure,
    /// never silently on a timer.
    pub fn elect_leader(&self, candidates: &[RegionId], seed: u64) -> GridResult<ElectionOutcome> {
        self.validate_regions(candidates)?;

        let regions: Vec<_> = candidates
            .iter()
            .map(|id| self.registry.get(id))
            .collect::<GridResult<_>>()?;
        let scores = election::score_candidates(&regions, &self.weights, seed);
        let leader = scores
            .first()
            .expect("validated non-empty candidate set")
            .region_id
            .clone();
        debug!(leader = %leader, candidates = scores.len(), "leader elected");

        let roles = candidates
            .iter()
            .map(|id| {
                let role = if *id == leader {
                    RegionRole::Leader
                } else {
                    RegionRole::Standby
                };
                (id.clone(), role)
            })
            .collect();
        let deployment = self.activate(
            DeploymentStrategy::LeaderElection,
            roles,
            ReplicationStrategy::Full,
            None,
        )?;
        Ok(ElectionOutcome { deployment, scores })
    }

    /// Deploy blue regions serving production and green regions staging
    /// the new version; traffic flips once after `switch_after_secs`.
    pub fn deploy_blue_green(
        &self,
        blue: &[RegionId],
        green: &[RegionId],
        switch_after_secs: u64,
    ) -> GridResult<Deployment> {
        if blue.is_empty() || green.is_empty() {
            return Err(GridError::InvalidDeploymentSpec(
                "blue_green requires at least one region on each side".to_string(),
            ));
        }
        if blue.iter().any(|id| green.contains(id)) {
            return Err(GridError::InvalidDeploymentSpec(
                "blue and green region sets overlap".to_string(),
            ));
        }
        let mut all = blue.to_vec();
        all.extend_from_slice(green);
        self.validate_regions(&all)?;

        let mut roles: BTreeMap<RegionId, RegionRole> = blue
            .iter()
            .map(|id| (id.clone(), RegionRole::Blue))
            .collect();
        for id in green {
            roles.insert(id.clone(), RegionRole::Green);
        }
        self.activate(
            DeploymentStrategy::BlueGreen,
            roles,
            ReplicationStrategy::Full,
            Some(BlueGreenSwitch {
                switch_after_ms: switch_after_secs * 1_000,
                switched: false,
            }),
        )
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> GridResult<Deployment> {
        let deployments = self.deployments.read().expect("deployments lock");
        deployments
            .get(id)
            .cloned()
            .ok_or_else(|| GridError::DeploymentNotFound(id.to_string()))
    }

    /// All deployments sorted by id.
    pub fn list(&self) -> Vec<Deployment> {
        let deployments = self.deployments.read().expect("deployments lock");
        let mut out: Vec<Deployment> = deployments.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Non-retired deployments that include the given region.
    pub fn deployments_for_region(&self, region: &str) -> Vec<Deployment> {
        let deployments = self.deployments.read().expect("deployments lock");
        let mut out: Vec<Deployment> = deployments
            .values()
            .filter(|d| d.status != DeploymentStatus::Retired && d.contains(region))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Bind a placement policy to a deployment. Failover restricts
    /// replacement selection to regions compliant with it.
    pub fn bind_policy(&self, id: &str, policy: &PolicyName) -> GridResult<()> {
        self.with_deployment_mut(id, |deployment| {
            deployment.policy = Some(policy.clone());
            Ok(())
        })
    }

    /// Check the blue/green switch window and flip roles if it elapsed.
    ///
    /// Returns `true` exactly once, on the call that performs the flip.
    pub fn poll_blue_green(&self, id: &str) -> GridResult<bool> {
        let now = self.clock.now_millis();
        self.with_deployment_mut(id, |deployment| {
            let Some(switch) = deployment.switch.as_mut() else {
                return Err(GridError::InvalidDeploymentSpec(format!(
                    "{} is not a blue/green deployment",
                    deployment.id
                )));
            };
            if switch.switched
                || now < deployment.created_at_ms.saturating_add(switch.switch_after_ms)
            {
                return Ok(false);
            }
            switch.switched = true;
            for role in deployment.roles.values_mut() {
                *role = match *role {
                    RegionRole::Blue => RegionRole::Standby,
                    RegionRole::Green => RegionRole::Active,
                    other => other,
                };
            }
            info!(deployment = %deployment.id, "blue/green traffic switched");
            Ok(true)
        })
    }

    /// Apply a region failure to one deployment.
    ///
    /// The failed region leaves the traffic rotation; the replacement
    /// (when the topology needs one) takes over the active role. Called
    /// by the failure handler after it has chosen a replacement.
    pub fn handle_failure(
        &self,
        id: &str,
        failed: &str,
        replacement: Option<&str>,
    ) -> GridResult<()> {
        let registry = self.registry.clone();
        self.with_deployment_mut(id, |deployment| {
            if deployment.status == DeploymentStatus::Retired {
                return Ok(());
            }
            deployment.status = DeploymentStatus::FailingOver;

            let failed_role = deployment.roles.get(failed).copied();
            if let Some(role) = deployment.roles.get_mut(failed) {
                *role = RegionRole::Standby;
            }
            let needs_promotion = matches!(
                failed_role,
                Some(RegionRole::Active | RegionRole::Leader | RegionRole::Blue)
            );

            match deployment.strategy {
                // All remaining actives keep serving; nothing to promote.
                DeploymentStrategy::ActiveActive => {}
                DeploymentStrategy::ActivePassive
                | DeploymentStrategy::LeaderElection
                | DeploymentStrategy::BlueGreen
                    if needs_promotion =>
                {
                    let Some(replacement) = replacement else {
                        deployment.status = DeploymentStatus::Active;
                        return Err(GridError::InvalidDeploymentSpec(format!(
                            "failover of {} requires a replacement region",
                            deployment.id
                        )));
                    };
                    let promoted_role = if deployment.strategy == DeploymentStrategy::LeaderElection
                    {
                        RegionRole::Leader
                    } else {
                        RegionRole::Active
                    };
                    if !deployment.roles.contains_key(replacement) {
                        registry.mark_in_use(replacement, &deployment.id)?;
                    }
                    deployment
                        .roles
                        .insert(replacement.to_string(), promoted_role);
                    info!(
                        deployment = %deployment.id,
                        from = %failed,
                        to = %replacement,
                        role = ?promoted_role,
                        "replacement promoted"
                    );
                }
                // The failed region held no active role; demotion is enough.
                _ => {}
            }

            deployment.status = DeploymentStatus::Active;
            Ok(())
        })
    }

    /// Re-admit a recovered region as standby.
    ///
    /// Prior roles are not restored: an ex-primary re-enters as standby
    /// so recovery cannot flap traffic back and forth.
    pub fn recover(&self, id: &str, region: &str) -> GridResult<()> {
        self.with_deployment_mut(id, |deployment| {
            if deployment.status == DeploymentStatus::Retired || !deployment.contains(region) {
                return Ok(());
            }
            deployment
                .roles
                .insert(region.to_string(), RegionRole::Standby);
            info!(deployment = %deployment.id, region = %region, "region re-admitted as standby");
            Ok(())
        })
    }

    /// Retire a deployment and release its region references.
    pub fn retire(&self, id: &str) -> GridResult<()> {
        let registry = self.registry.clone();
        self.with_deployment_mut(id, |deployment| {
            if deployment.status == DeploymentStatus::Retired {
                return Ok(());
            }
            deployment.status = DeploymentStatus::Retired;
            for region in deployment.roles.keys() {
                if let Err(e) = registry.release(region, &deployment.id) {
                    warn!(region = %region, error = %e, "release failed during retire");
                }
            }
            info!(deployment = %deployment.id, "deployment retired");
            Ok(())
        })
    }

    // ── Internals ──────────────────────────────────────────────────

    fn validate_regions(&self, regions: &[RegionId]) -> GridResult<()> {
        if regions.is_empty() {
            return Err(GridError::InvalidDeploymentSpec(
                "deployment requires at least one region".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in regions {
            if !seen.insert(id) {
                return Err(GridError::InvalidDeploymentSpec(format!(
                    "region {id} listed more than once"
                )));
            }
            // Unknown region ids fail fast, before any state changes.
            if self.registry.get(id).is_err() {
                return Err(GridError::InvalidDeploymentSpec(format!(
                    "unknown region id {id}"
                )));
            }
        }
        Ok(())
    }

    fn activate(
        &self,
        strategy: DeploymentStrategy,
        roles: BTreeMap<RegionId, RegionRole>,
        replication: ReplicationStrategy,
        switch: Option<BlueGreenSwitch>,
    ) -> GridResult<Deployment> {
        let id = format!("dep-{:04}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let mut deployment = Deployment {
            id: id.clone(),
            strategy,
            roles,
            replication,
            status: DeploymentStatus::Planning,
            version: 0,
            created_at_ms: self.clock.now_millis(),
            policy: None,
            switch,
        };
        debug!(deployment = %id, strategy = ?strategy, "deployment planned");

        // Provisioning itself is the external provider layer's job; what
        // this core provisions is the region references.
        deployment.status = DeploymentStatus::Provisioning;
        deployment.version += 1;
        let mut marked: Vec<&RegionId> = Vec::with_capacity(deployment.roles.len());
        for region in deployment.roles.keys() {
            if let Err(e) = self.registry.mark_in_use(region, &id) {
                // Roll back marks taken so far; nothing was persisted yet.
                for done in marked {
                    let _ = self.registry.release(done, &id);
                }
                return Err(e);
            }
            marked.push(region);
        }

        deployment.status = DeploymentStatus::Active;
        deployment.version += 1;
        let mut deployments = self.deployments.write().expect("deployments lock");
        deployments.insert(id.clone(), deployment.clone());
        info!(
            deployment = %id,
            strategy = ?strategy,
            regions = deployment.roles.len(),
            "deployment active"
        );
        Ok(deployment)
    }

    /// Run a transition on one deployment under the write lock, bumping
    /// its version when the closure succeeds.
    fn with_deployment_mut<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Deployment) -> GridResult<R>,
    ) -> GridResult<R> {
        let mut deployments = self.deployments.write().expect("deployments lock");
        let deployment = deployments
            .get_mut(id)
            .ok_or_else(|| GridError::DeploymentNotFound(id.to_string()))?;
        let result = f(deployment)?;
        deployment.version += 1;
        Ok(result)
    }
}
