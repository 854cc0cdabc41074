//! geogrid-router — per-request region selection.
//!
//! Seven strategies over the healthy-region set: latency, capacity,
//! compliance, cost, health, round-robin, and seeded random. Every
//! decision carries a human-readable reasoning trace; every strategy
//! shares one failure path when no healthy region exists.

pub mod balancer;
pub mod router;

pub use balancer::RoundRobinBalancer;
pub use router::{RequestContext, Router, RoutingDecision, RoutingStrategy};
