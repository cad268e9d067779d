//! Named policies served by the server

use crate::config::PolicyConfig;
use anyhow::Result;
use loopguard::{MemoryStore, Policy};
use serde::Serialize;
use std::sync::Arc;

/// A policy together with the name it is served under
#[derive(Debug, Clone)]
pub struct NamedPolicy {
    pub name: String,
    pub policy: Policy,
}

/// Public description of a policy, as listed by `GET /policies`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub name: String,
    pub limit: u64,
    pub window_secs: u64,
    pub disabled: bool,
}

/// Every configured policy plus the store they share
#[derive(Debug, Clone)]
pub struct Registry {
    policies: Vec<NamedPolicy>,
    store: Arc<MemoryStore>,
}

impl Registry {
    /// Build one policy per configuration entry, all backed by `store`
    pub fn build(configs: &[PolicyConfig], store: Arc<MemoryStore>) -> Result<Self> {
        let mut policies = Vec::with_capacity(configs.len());

        for config in configs {
            let options = config.options()?.store(store.clone());
            let policy = Policy::new(config.quota()?, options);
            tracing::info!(
                name = %config.name,
                quota = %policy.quota(),
                disabled = policy.is_disabled(),
                "Registered policy"
            );
            policies.push(NamedPolicy {
                name: config.name.clone(),
                policy,
            });
        }

        Ok(Registry { policies, store })
    }

    pub fn policies(&self) -> &[NamedPolicy] {
        &self.policies
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|named| named.name.as_str())
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn summaries(&self) -> Vec<PolicySummary> {
        self.policies
            .iter()
            .map(|named| {
                let quota = named.policy.quota();
                PolicySummary {
                    name: named.name.clone(),
                    limit: quota.limit(),
                    window_secs: quota.window().as_secs(),
                    disabled: named.policy.is_disabled(),
                }
            })
            .collect()
    }
}
