//! Error taxonomy for the GeoGrid control plane.
//!
//! Every error carries enough structured detail (failed region, strategy
//! attempted, candidate count) to be logged and alerted on without
//! additional lookups. None of these are retried internally — the caller
//! decides whether to retry, escalate, or serve a default.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type GridResult<T> = Result<T, GridError>;

/// Errors surfaced by the GeoGrid core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GridError {
    #[error("no healthy regions available (strategy {strategy}, {candidates} candidates)")]
    NoHealthyRegions { strategy: String, candidates: usize },

    #[error("no region satisfies compliance requirements [{required}] ({candidates} candidates)")]
    NoCompliantRegion { required: String, candidates: usize },

    #[error("placement violates policy {policy} for region {region}: {detail}")]
    ComplianceViolation {
        region: String,
        policy: String,
        detail: String,
    },

    #[error("invalid deployment spec: {0}")]
    InvalidDeploymentSpec(String),

    #[error("invalid routing request: {0}")]
    InvalidRoutingRequest(String),

    #[error("failover from {from} failed after {elapsed_ms}ms: {reason}")]
    FailoverFailed {
        from: String,
        reason: String,
        elapsed_ms: u64,
    },

    #[error("region {region} is referenced by active deployment {deployment}")]
    InUse { region: String, deployment: String },

    #[error("region not found: {0}")]
    RegionNotFound(String),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("capacity {current} exceeds maximum {max} for region {region}")]
    CapacityExceedsMax {
        region: String,
        current: u64,
        max: u64,
    },
}
