//! Deployment registry: partitioned storage of resolved deployments.
//!
//! Records are partitioned by `(tag, chain id, namespace)`. Two stores take
//! part in every run: the *global* store holding shared infrastructure
//! deployed by other projects, and the *local* store caching this project's
//! own deployments. Reads go through [`Lookup`], writes through
//! [`PersistenceWriter`].

mod file;
mod lookup;
mod memory;
mod writer;

use std::{fmt, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use file::FileRegistryStore;
pub use lookup::{AddressReference, Lookup, NamePredicate};
pub use memory::MemoryRegistryStore;
pub use writer::{MergeSummary, PersistenceWriter, merge_by_name};

use crate::{ResolvedDeployment, VmError};

/// Key of one registry partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub tag: String,
    pub chain_id: u64,
    pub namespace: String,
}

impl PartitionKey {
    pub fn new(tag: impl Into<String>, chain_id: u64, namespace: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            chain_id,
            namespace: namespace.into(),
        }
    }

    /// Same tag and chain, different namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            tag: self.tag.clone(),
            chain_id: self.chain_id,
            namespace: namespace.into(),
        }
    }

    /// Reject segments that would escape a directory-based store.
    pub fn validate(&self) -> Result<()> {
        for segment in [&self.tag, &self.namespace] {
            let invalid = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\']);
            if invalid {
                return Err(VmError::InvalidPartitionKey {
                    segment: segment.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tag, self.chain_id, self.namespace)
    }
}

/// Storage backend for registry partitions.
pub trait RegistryStore: Send + Sync {
    /// Load a partition. A partition that was never written is empty.
    fn load_partition(&self, key: &PartitionKey) -> Result<Vec<ResolvedDeployment>>;

    /// Replace a partition with the given, already merged, sequence.
    fn write_partition(&self, key: &PartitionKey, deployments: &[ResolvedDeployment]) -> Result<()>;
}

impl<T: RegistryStore + ?Sized> RegistryStore for &T {
    fn load_partition(&self, key: &PartitionKey) -> Result<Vec<ResolvedDeployment>> {
        (**self).load_partition(key)
    }

    fn write_partition(
        &self,
        key: &PartitionKey,
        deployments: &[ResolvedDeployment],
    ) -> Result<()> {
        (**self).write_partition(key, deployments)
    }
}

impl<T: RegistryStore + ?Sized> RegistryStore for Arc<T> {
    fn load_partition(&self, key: &PartitionKey) -> Result<Vec<ResolvedDeployment>> {
        (**self).load_partition(key)
    }

    fn write_partition(
        &self,
        key: &PartitionKey,
        deployments: &[ResolvedDeployment],
    ) -> Result<()> {
        (**self).write_partition(key, deployments)
    }
}
