//! geogrid-deploy — deployment topologies across regions.
//!
//! Four topologies: active-active, active-passive, leader election, and
//! blue-green. Deployments are created here and transitioned here; the
//! failure handler drives promotions through the orchestrator so every
//! transition on a deployment is serialized.

pub mod election;
pub mod orchestrator;

pub use election::{CandidateScore, ElectionBreakdown, ElectionWeights};
pub use orchestrator::{DeploymentOrchestrator, ElectionOutcome};
