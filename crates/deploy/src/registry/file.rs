//! Directory-backed registry store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{PartitionKey, RegistryStore};
use crate::ResolvedDeployment;

/// Stores each partition as a pretty-printed JSON array at
/// `{root}/{tag}/{chain_id}/{namespace}.json`.
#[derive(Debug, Clone)]
pub struct FileRegistryStore {
    root: PathBuf,
}

impl FileRegistryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a partition.
    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.root
            .join(&key.tag)
            .join(key.chain_id.to_string())
            .join(format!("{}.json", key.namespace))
    }

    /// List the namespaces stored for a tag and chain.
    pub fn namespaces(&self, tag: &str, chain_id: u64) -> Result<Vec<String>> {
        let dir = self.root.join(tag).join(chain_id.to_string());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut namespaces = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read registry directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    namespaces.push(stem.to_string_lossy().to_string());
                }
            }
        }
        namespaces.sort();
        Ok(namespaces)
    }
}

impl RegistryStore for FileRegistryStore {
    fn load_partition(&self, key: &PartitionKey) -> Result<Vec<ResolvedDeployment>> {
        key.validate()?;
        let path = self.partition_path(key);
        if !path.exists() {
            tracing::trace!(partition = %key, path = %path.display(), "Partition not found, treating as empty");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read registry partition {}", path.display()))?;
        let deployments: Vec<ResolvedDeployment> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry partition {}", path.display()))?;

        tracing::debug!(partition = %key, count = deployments.len(), "Loaded registry partition");
        Ok(deployments)
    }

    fn write_partition(
        &self,
        key: &PartitionKey,
        deployments: &[ResolvedDeployment],
    ) -> Result<()> {
        key.validate()?;
        let path = self.partition_path(key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create registry directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(deployments)
            .context("Failed to serialize registry partition")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write registry partition {}", path.display()))?;

        tracing::debug!(partition = %key, path = %path.display(), count = deployments.len(), "Registry partition written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{Address, B256};
    use tempdir::TempDir;

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

    #[test]
    fn test_missing_partition_is_empty() {
        let temp_dir = TempDir::new("stackvm-registry").expect("Failed to create temp dir");
        let store = FileRegistryStore::new(temp_dir.path());

        let key = PartitionKey::new("local", 31337, "project");
        assert!(store.load_partition(&key).unwrap().is_empty());
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new("stackvm-registry").expect("Failed to create temp dir");
        let store = FileRegistryStore::new(temp_dir.path());
        let key = PartitionKey::new("local", 31337, "project");

        let deployments = vec![deployment("A", 1), deployment("B", 2)];
        store.write_partition(&key, &deployments).unwrap();

        assert!(temp_dir.path().join("local/31337/project.json").exists());
        assert_eq!(store.load_partition(&key).unwrap(), deployments);
    }

    #[test]
    fn test_corrupted_partition_errors() {
        let temp_dir = TempDir::new("stackvm-registry").expect("Failed to create temp dir");
        let store = FileRegistryStore::new(temp_dir.path());
        let key = PartitionKey::new("local", 1, "project");

        let path = store.partition_path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ invalid json }").unwrap();

        assert!(store.load_partition(&key).is_err());
    }

    #[test]
    fn test_namespaces_listing() {
        let temp_dir = TempDir::new("stackvm-registry").expect("Failed to create temp dir");
        let store = FileRegistryStore::new(temp_dir.path());

        store
            .write_partition(&PartitionKey::new("t", 5, "beta"), &[deployment("A", 1)])
            .unwrap();
        store
            .write_partition(&PartitionKey::new("t", 5, "alpha"), &[deployment("B", 2)])
            .unwrap();

        assert_eq!(store.namespaces("t", 5).unwrap(), vec!["alpha", "beta"]);
        assert!(store.namespaces("t", 6).unwrap().is_empty());
    }
}
