//! Domain types for the GeoGrid control plane.
//!
//! These types represent regions, placement policies, deployments, and
//! failover records. All types are serializable to/from JSON so the
//! external configuration and metrics layers can exchange them without
//! a bespoke wire format.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Unique identifier for a region (e.g. "us-east-1").
pub type RegionId = String;

/// Unique identifier for a deployment.
pub type DeploymentId = String;

/// Name of a registered placement policy.
pub type PolicyName = String;

// ── Regions ────────────────────────────────────────────────────────

/// Geographic coordinates used for distance-based routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A named regulatory constraint restricting where data may live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceFramework {
    Gdpr,
    Hipaa,
    Soc2,
    PciDss,
    FedRamp,
    Iso27001,
}

impl std::fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gdpr => "gdpr",
            Self::Hipaa => "hipaa",
            Self::Soc2 => "soc2",
            Self::PciDss => "pci_dss",
            Self::FedRamp => "fed_ramp",
            Self::Iso27001 => "iso27001",
        };
        f.write_str(s)
    }
}

/// A deployment target in one geographic/cloud location.
///
/// Mutated only by health and capacity updates after registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub id: RegionId,
    /// Cloud provider tag (e.g. "aws", "gcp").
    pub provider: String,
    /// Human-readable region name.
    pub name: String,
    pub coordinates: GeoCoordinates,
    /// Network endpoint for the region's ingress.
    pub endpoint: String,
    /// Health score in [0, 100]; higher is healthier.
    pub health_score: f64,
    /// Error rate in [0, 1] from the last accepted probe.
    pub error_rate: f64,
    pub current_capacity: u64,
    pub max_capacity: u64,
    /// Relative cost versus baseline; >= 0.
    pub cost_multiplier: f64,
    pub compliance_frameworks: BTreeSet<ComplianceFramework>,
    /// Timestamp (epoch millis) of the last accepted health update.
    pub last_health_update_ms: u64,
}

impl Region {
    /// Capacity utilization as a fraction in [0, 1].
    ///
    /// A region with zero max capacity counts as fully utilized so it
    /// never wins a capacity-based selection.
    pub fn utilization(&self) -> f64 {
        if self.max_capacity == 0 {
            return 1.0;
        }
        self.current_capacity as f64 / self.max_capacity as f64
    }

    /// Whether this region satisfies every framework in `required`.
    pub fn is_compliant_with(&self, required: &BTreeSet<ComplianceFramework>) -> bool {
        required.is_subset(&self.compliance_frameworks)
    }

    /// Derived health view.
    pub fn health(&self) -> RegionHealth {
        RegionHealth {
            status: HealthStatus::from_score(self.health_score),
            health_score: self.health_score,
            error_rate: self.error_rate,
            capacity_utilization_pct: self.utilization() * 100.0,
        }
    }
}

/// Coarse health classification derived from the health score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Thresholds: >= 70 healthy, >= 30 degraded, below that unhealthy.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Healthy
        } else if score >= 30.0 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

/// Point-in-time health view of a region. Derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionHealth {
    pub status: HealthStatus,
    pub health_score: f64,
    pub error_rate: f64,
    pub capacity_utilization_pct: f64,
}

// ── Data placement ─────────────────────────────────────────────────

/// Access-frequency classification driving replication breadth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    Hot,
    Cold,
}

/// How broadly data is replicated across eligible regions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStrategy {
    Full,
    Partial,
    Sharded,
}

/// How tightly data is pinned to its home region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocalityLevel {
    Strict,
    Region,
    Loose,
}

/// Compliance-constrained placement rules for a class of data.
///
/// Immutable once registered; replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPlacementPolicy {
    pub name: PolicyName,
    pub required_frameworks: BTreeSet<ComplianceFramework>,
    /// Explicit allow-list; empty means unrestricted subject to compliance.
    pub allowed_regions: BTreeSet<RegionId>,
    pub locality_level: LocalityLevel,
    pub cross_region_transfer: bool,
}

// ── Deployments ────────────────────────────────────────────────────

/// Deployment topology across a set of regions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    ActiveActive,
    ActivePassive,
    LeaderElection,
    BlueGreen,
}

/// Role a region plays within a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    Active,
    Standby,
    Leader,
    Blue,
    Green,
}

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Planning,
    Provisioning,
    Active,
    FailingOver,
    Retired,
}

/// Pending blue/green traffic switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlueGreenSwitch {
    /// Millis after creation at which traffic flips.
    pub switch_after_ms: u64,
    /// Set once the flip has happened; it never flips twice.
    pub switched: bool,
}

/// A deployment of the service across participating regions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    pub strategy: DeploymentStrategy,
    /// Participating regions and their current roles.
    pub roles: BTreeMap<RegionId, RegionRole>,
    pub replication: ReplicationStrategy,
    pub status: DeploymentStatus,
    /// Bumped on every state transition; transitions on the same
    /// deployment are serialized against this.
    pub version: u64,
    pub created_at_ms: u64,
    /// Placement policy bound to this deployment, if any. Failover
    /// restricts replacement selection to regions compliant with it.
    pub policy: Option<PolicyName>,
    /// Present only for blue/green deployments.
    pub switch: Option<BlueGreenSwitch>,
}

impl Deployment {
    /// Regions currently serving traffic.
    ///
    /// Blue-role regions count as active until the blue/green switch
    /// flips them to standby.
    pub fn active_regions(&self) -> Vec<RegionId> {
        self.roles
            .iter()
            .filter(|(_, role)| {
                matches!(role, RegionRole::Active | RegionRole::Leader | RegionRole::Blue)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether the given region participates in this deployment.
    pub fn contains(&self, region: &str) -> bool {
        self.roles.contains_key(region)
    }
}

// ── Failover ───────────────────────────────────────────────────────

/// How a failover is executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Switch without draining.
    Immediate,
    /// Drain in-flight routing toward the old region for a grace window.
    Graceful,
}

/// Append-only audit record of one failover attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailoverEvent {
    pub from_region: RegionId,
    /// Replacement region, or `None` when no replacement was promoted.
    pub to_region: Option<RegionId>,
    pub reason: String,
    pub strategy: FailoverStrategy,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub duration_ms: u64,
}
