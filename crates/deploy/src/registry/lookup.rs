//! Tiered address resolution over the global and local registries.

use alloy_core::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{PartitionKey, RegistryStore};
use crate::{ResolvedDeployment, VmError};

/// Selects a registry record by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePredicate {
    /// The record name equals the given string.
    Exact(String),
    /// The record name starts with the given string, for suffixed or versioned names.
    Prefix(String),
}

impl NamePredicate {
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => name == expected,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }

    /// The name or prefix being matched.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Exact(name) | Self::Prefix(name) => name,
        }
    }
}

/// Result of a tiered lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressReference {
    /// Found in the global registry.
    Global(ResolvedDeployment),
    /// Not in the global registry, found in the local one.
    Local(ResolvedDeployment),
    /// Found nowhere.
    Unset,
}

impl AddressReference {
    /// The resolved address, or the zero sentinel when unset.
    pub fn address(&self) -> Address {
        self.deployment()
            .map(|deployment| deployment.address)
            .unwrap_or(Address::ZERO)
    }

    pub fn deployment(&self) -> Option<&ResolvedDeployment> {
        match self {
            Self::Global(deployment) | Self::Local(deployment) => Some(deployment),
            Self::Unset => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Which tier answered, for logging.
    pub fn tier(&self) -> &'static str {
        match self {
            Self::Global(_) => "global",
            Self::Local(_) => "local",
            Self::Unset => "unset",
        }
    }

    /// Treat the reference as a hard dependency.
    pub fn require(
        self,
        predicate: &NamePredicate,
        key: &PartitionKey,
    ) -> Result<ResolvedDeployment> {
        match self {
            Self::Global(deployment) | Self::Local(deployment) => Ok(deployment),
            Self::Unset => Err(VmError::MissingDependency {
                name: predicate.pattern().to_string(),
                namespace: key.namespace.clone(),
                tag: key.tag.clone(),
                chain_id: key.chain_id,
            }
            .into()),
        }
    }
}

/// Read-only resolution layer: global registry first, then local, then the
/// zero sentinel. The tier order is fixed.
#[derive(Debug, Clone)]
pub struct Lookup<G, L> {
    global: G,
    local: L,
    local_namespace: String,
}

impl<G: RegistryStore, L: RegistryStore> Lookup<G, L> {
    /// `local_namespace` names this project's partition in the local store.
    pub fn new(global: G, local: L, local_namespace: impl Into<String>) -> Self {
        Self {
            global,
            local,
            local_namespace: local_namespace.into(),
        }
    }

    pub fn local_namespace(&self) -> &str {
        &self.local_namespace
    }

    pub fn global_store(&self) -> &G {
        &self.global
    }

    pub fn local_store(&self) -> &L {
        &self.local
    }

    /// Resolve a record by predicate.
    ///
    /// The global partition `(tag, chain_id, namespace)` is searched first; on a
    /// miss, the local partition `(tag, chain_id, local_namespace)`.
    pub fn resolve(
        &self,
        tag: &str,
        chain_id: u64,
        namespace: &str,
        predicate: &NamePredicate,
    ) -> Result<AddressReference> {
        let global_key = PartitionKey::new(tag, chain_id, namespace);
        if let Some(found) = find(&self.global.load_partition(&global_key)?, predicate) {
            tracing::debug!(pattern = predicate.pattern(), partition = %global_key, address = %found.address, "Resolved from global registry");
            return Ok(AddressReference::Global(found));
        }

        let local_key = global_key.with_namespace(self.local_namespace.as_str());
        if let Some(found) = find(&self.local.load_partition(&local_key)?, predicate) {
            tracing::debug!(pattern = predicate.pattern(), partition = %local_key, address = %found.address, "Resolved from local registry");
            return Ok(AddressReference::Local(found));
        }

        tracing::debug!(pattern = predicate.pattern(), namespace, tag, chain_id, "Dependency not found in any registry");
        Ok(AddressReference::Unset)
    }

    /// Resolve a hard dependency, failing when it is unset.
    pub fn require(
        &self,
        tag: &str,
        chain_id: u64,
        namespace: &str,
        predicate: &NamePredicate,
    ) -> Result<ResolvedDeployment> {
        self.resolve(tag, chain_id, namespace, predicate)?
            .require(predicate, &PartitionKey::new(tag, chain_id, namespace))
    }
}

/// Last record matching the predicate; later entries are the newer ones.
fn find(
    deployments: &[ResolvedDeployment],
    predicate: &NamePredicate,
) -> Option<ResolvedDeployment> {
    deployments
        .iter()
        .rev()
        .find(|deployment| predicate.matches(&deployment.name))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistryStore;
    use alloy_core::primitives::B256;

    const TAG: &str = "local";
    const CHAIN: u64 = 97;

    fn deployment(name: &str, byte: u8) -> ResolvedDeployment {
        ResolvedDeployment {
            name: name.to_string(),
            address: Address::repeat_byte(byte),
            transaction_hash: B256::repeat_byte(byte),
            constructor_args: vec![],
            artifact: name.to_string(),
            block_number: None,
        }
    }

    fn lookup() -> Lookup<MemoryRegistryStore, MemoryRegistryStore> {
        Lookup::new(MemoryRegistryStore::new(), MemoryRegistryStore::new(), "project")
    }

    #[test]
    fn test_global_takes_priority() {
        let lookup = lookup();
        lookup.global_store().insert(
            PartitionKey::new(TAG, CHAIN, "YieldBox"),
            vec![deployment("YieldBox", 1)],
        );
        lookup.local_store().insert(
            PartitionKey::new(TAG, CHAIN, "project"),
            vec![deployment("YieldBox", 2)],
        );

        let found = lookup
            .resolve(TAG, CHAIN, "YieldBox", &NamePredicate::exact("YieldBox"))
            .unwrap();
        assert_eq!(found.tier(), "global");
        assert_eq!(found.address(), Address::repeat_byte(1));
    }

    #[test]
    fn test_local_fallback() {
        let lookup = lookup();
        lookup.local_store().insert(
            PartitionKey::new(TAG, CHAIN, "project"),
            vec![deployment("Cluster", 3)],
        );

        let found = lookup
            .resolve(TAG, CHAIN, "tapioca-periphery", &NamePredicate::exact("Cluster"))
            .unwrap();
        assert!(matches!(found, AddressReference::Local(_)));
        assert_eq!(found.address(), Address::repeat_byte(3));
    }

    #[test]
    fn test_sentinel_when_missing() {
        let lookup = lookup();
        let found = lookup
            .resolve(TAG, CHAIN, "tapioca-periphery", &NamePredicate::exact("Cluster"))
            .unwrap();
        assert!(found.is_unset());
        assert_eq!(found.address(), Address::ZERO);
    }

    #[test]
    fn test_other_partitions_are_ignored() {
        let lookup = lookup();
        lookup.global_store().insert(
            PartitionKey::new("other-tag", CHAIN, "mocks"),
            vec![deployment("WETHMock", 4)],
        );
        lookup.global_store().insert(
            PartitionKey::new(TAG, 1, "mocks"),
            vec![deployment("WETHMock", 5)],
        );

        let found = lookup
            .resolve(TAG, CHAIN, "mocks", &NamePredicate::prefix("WETHMock"))
            .unwrap();
        assert!(found.is_unset());
    }

    #[test]
    fn test_prefix_match() {
        let lookup = lookup();
        lookup.global_store().insert(
            PartitionKey::new(TAG, CHAIN, "mocks"),
            vec![deployment("USDCMock", 6), deployment("WETHMock-v2", 7)],
        );

        let found = lookup
            .resolve(TAG, CHAIN, "mocks", &NamePredicate::prefix("WETHMock"))
            .unwrap();
        assert_eq!(found.address(), Address::repeat_byte(7));

        let exact = lookup
            .resolve(TAG, CHAIN, "mocks", &NamePredicate::exact("WETHMock"))
            .unwrap();
        assert!(exact.is_unset());
    }

    #[test]
    fn test_require_missing_dependency() {
        let lookup = lookup();
        let err = lookup
            .require(TAG, CHAIN, "mocks", &NamePredicate::prefix("WETHMock"))
            .unwrap_err();

        match err.downcast_ref::<VmError>() {
            Some(VmError::MissingDependency { name, namespace, .. }) => {
                assert_eq!(name, "WETHMock");
                assert_eq!(namespace, "mocks");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("required dependency not found"));
    }
}
