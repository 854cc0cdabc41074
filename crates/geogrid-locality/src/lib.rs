//! geogrid-locality — compliance-constrained data placement.
//!
//! Decides which regions are legal and preferred for a piece of data and
//! plans replication targets. Reads region state from the registry; never
//! moves data itself (replication transport is external).

pub mod optimizer;

pub use optimizer::{LocalityConfig, LocalityOptimizer};
