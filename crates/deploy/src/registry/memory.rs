//! In-memory registry store.

use std::{collections::HashMap, sync::RwLock};

use anyhow::Result;

use super::{PartitionKey, RegistryStore};
use crate::ResolvedDeployment;

/// Registry store that lives for the duration of the process.
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    partitions: RwLock<HashMap<PartitionKey, Vec<ResolvedDeployment>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of partitions held.
    pub fn partition_count(&self) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Seed a partition, replacing whatever it held.
    pub fn insert(&self, key: PartitionKey, deployments: Vec<ResolvedDeployment>) {
        self.partitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, deployments);
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load_partition(&self, key: &PartitionKey) -> Result<Vec<ResolvedDeployment>> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(partitions.get(key).cloned().unwrap_or_default())
    }

    fn write_partition(
        &self,
        key: &PartitionKey,
        deployments: &[ResolvedDeployment],
    ) -> Result<()> {
        self.insert(key.clone(), deployments.to_vec());
        Ok(())
    }
}
