//! Daemon configuration.
//!
//! Regions, placement policies, and failover tunables are loaded from a
//! TOML file at startup. This is the external-configuration boundary:
//! the core never reloads by itself; re-running registration with a new
//! file is the reload path.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use geogrid_failover::FailoverConfig;
use geogrid_state::{ComplianceFramework, DataPlacementPolicy, GeoCoordinates, Region};

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub regions: Vec<RegionSeed>,
    #[serde(default)]
    pub policies: Vec<DataPlacementPolicy>,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// One region seeded into the registry at startup.
#[derive(Debug, Deserialize)]
pub struct RegionSeed {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub endpoint: String,
    pub max_capacity: u64,
    #[serde(default = "default_cost_multiplier")]
    pub cost_multiplier: f64,
    #[serde(default)]
    pub compliance: BTreeSet<ComplianceFramework>,
    /// Health score until the first probe reports in.
    #[serde(default = "default_initial_health")]
    pub initial_health_score: f64,
}

impl RegionSeed {
    pub fn into_region(self) -> Region {
        Region {
            id: self.id,
            provider: self.provider,
            name: self.name,
            coordinates: GeoCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            endpoint: self.endpoint,
            health_score: self.initial_health_score,
            error_rate: 0.0,
            current_capacity: 0,
            max_capacity: self.max_capacity,
            cost_multiplier: self.cost_multiplier,
            compliance_frameworks: self.compliance,
            last_health_update_ms: 0,
        }
    }
}

/// Probe-simulation loop settings.
///
/// The daemon has no live probes; it replays a seeded random walk as a
/// stand-in for the external probe subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_seed")]
    pub seed: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_probe_interval(),
            seed: default_probe_seed(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

fn default_cost_multiplier() -> f64 {
    1.0
}

fn default_initial_health() -> f64 {
    100.0
}

fn default_probe_interval() -> u64 {
    15
}

fn default_probe_seed() -> u64 {
    42
}

fn default_stats_interval() -> u64 {
    60
}

/// Load and parse the daemon config file.
pub fn load(path: &Path) -> anyhow::Result<DaemonConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: DaemonConfig =
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [probe]
        interval_secs = 5

        [failover]
        failover_timeout_ms = 1000
        drain_window_ms = 2000
        healthy_threshold = 70.0

        [[regions]]
        id = "us-east-1"
        provider = "aws"
        name = "US East (Virginia)"
        latitude = 37.4
        longitude = -77.5
        endpoint = "https://us-east-1.geogrid.dev"
        max_capacity = 1000
        compliance = ["soc2", "hipaa"]

        [[regions]]
        id = "eu-west-1"
        provider = "aws"
        name = "EU West (Dublin)"
        latitude = 53.3
        longitude = -6.2
        endpoint = "https://eu-west-1.geogrid.dev"
        max_capacity = 800
        cost_multiplier = 1.2
        compliance = ["gdpr", "soc2"]

        [[policies]]
        name = "eu-data"
        required_frameworks = ["gdpr"]
        allowed_regions = ["eu-west-1"]
        locality_level = "region"
        cross_region_transfer = false
    "#;

    #[test]
    fn parses_full_sample() {
        let config: DaemonConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.probe.interval_secs, 5);
        assert_eq!(config.probe.seed, 42); // Defaulted.
        assert_eq!(config.failover.drain_window_ms, 2000);

        let eu = config
            .regions
            .into_iter()
            .find(|r| r.id == "eu-west-1")
            .unwrap()
            .into_region();
        assert_eq!(eu.cost_multiplier, 1.2);
        assert!(eu.compliance_frameworks.contains(&ComplianceFramework::Gdpr));
        assert_eq!(eu.health_score, 100.0);

        assert_eq!(config.policies.len(), 1);
        assert!(!config.policies[0].cross_region_transfer);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert!(config.regions.is_empty());
        assert!(config.policies.is_empty());
        assert_eq!(config.failover.failover_timeout_ms, 1_000);
        assert_eq!(config.probe.interval_secs, 15);
    }
}
