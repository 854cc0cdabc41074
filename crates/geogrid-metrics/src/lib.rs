//! geogrid-metrics — decision and failover statistics.
//!
//! Counts routing decisions by region and strategy and tracks failover
//! outcomes. The snapshot is serializable for whatever metrics sink the
//! deployment uses; no exposition format is mandated here.

pub mod stats;

pub use stats::{StatsCollector, StatsSnapshot};
