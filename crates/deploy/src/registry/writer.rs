//! Merge-and-write of run results into a registry partition.

use anyhow::{Context, Result};

use super::{PartitionKey, RegistryStore};
use crate::ResolvedDeployment;

/// What a save changed in a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Names not present before.
    pub added: usize,
    /// Names present before whose record changed.
    pub replaced: usize,
    /// Names present before with an identical record.
    pub unchanged: usize,
}

impl MergeSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.replaced == 0
    }
}

/// Merge `incoming` into `existing`, last write wins by name.
///
/// A name already present is replaced in place; a new name is appended in
/// incoming order. Merging the same input twice is a no-op the second time.
pub fn merge_by_name(
    existing: &mut Vec<ResolvedDeployment>,
    incoming: &[ResolvedDeployment],
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for deployment in incoming {
        match existing.iter_mut().find(|entry| entry.name == deployment.name) {
            Some(entry) if entry == deployment => summary.unchanged += 1,
            Some(entry) => {
                *entry = deployment.clone();
                summary.replaced += 1;
            }
            None => {
                existing.push(deployment.clone());
                summary.added += 1;
            }
        }
    }

    summary
}

/// The only component that mutates registry data.
#[derive(Debug, Clone)]
pub struct PersistenceWriter<S> {
    store: S,
}

impl<S: RegistryStore> PersistenceWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merge `deployments` into the partition and write it back.
    ///
    /// Nothing is written when the merge changes nothing, so an empty result
    /// list leaves the partition untouched.
    pub fn save(
        &self,
        key: &PartitionKey,
        deployments: &[ResolvedDeployment],
    ) -> Result<MergeSummary> {
        let mut merged = self
            .store
            .load_partition(key)
            .with_context(|| format!("Failed to load registry partition {key}"))?;

        let summary = merge_by_name(&mut merged, deployments);
        if summary.is_noop() {
            tracing::debug!(partition = %key, unchanged = summary.unchanged, "Registry partition already up to date");
            return Ok(summary);
        }

        self.store
            .write_partition(key, &merged)
            .with_context(|| format!("Failed to write registry partition {key}"))?;

        tracing::info!(
            partition = %key,
            added = summary.added,
            replaced = summary.replaced,
            total = merged.len(),
            "Deployments saved"
        );
        Ok(summary)
    }
}
