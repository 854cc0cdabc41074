//! Placement-policy store.
//!
//! Policies are immutable once registered and replaced wholesale, never
//! partially patched, so readers and writers cannot race on a policy's
//! internals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{GridError, GridResult};
use crate::types::{DataPlacementPolicy, PolicyName};

/// Thread-safe policy table. `Clone` shares the underlying state.
#[derive(Clone, Default)]
pub struct PolicyStore {
    policies: Arc<RwLock<HashMap<PolicyName, DataPlacementPolicy>>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy, replacing any existing policy with the same name.
    pub fn register(&self, policy: DataPlacementPolicy) {
        let mut policies = self.policies.write().expect("policies lock");
        info!(policy = %policy.name, "placement policy registered");
        policies.insert(policy.name.clone(), policy);
    }

    /// Fetch a policy by name.
    pub fn get(&self, name: &str) -> GridResult<DataPlacementPolicy> {
        let policies = self.policies.read().expect("policies lock");
        policies
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::PolicyNotFound(name.to_string()))
    }

    /// List registered policies sorted by name.
    pub fn list(&self) -> Vec<DataPlacementPolicy> {
        let policies = self.policies.read().expect("policies lock");
        let mut out: Vec<DataPlacementPolicy> = policies.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
