//! geogrid-failover — sub-second failover and recovery.
//!
//! Marks failed regions out of rotation, promotes replacements within a
//! bounded budget, re-admits recovered regions as standbys, and keeps
//! an append-only audit trail of every attempt.

pub mod handler;

pub use handler::{FailoverConfig, FailureHandler};
