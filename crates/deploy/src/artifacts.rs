//! Artifact sources: turn a contract name into deployable code.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde_json::Value;

use crate::CodeReference;

/// Provides compiled code by contract name.
pub trait ArtifactSource: Send + Sync {
    fn get_code(&self, name: &str) -> Result<CodeReference>;
}

impl ArtifactSource for HashMap<String, CodeReference> {
    fn get_code(&self, name: &str) -> Result<CodeReference> {
        self.get(name)
            .cloned()
            .with_context(|| format!("Artifact not found: {name}"))
    }
}

/// Loads Foundry (`out/`) or Hardhat (`artifacts/`) JSON artifacts.
///
/// A contract `Name` is looked up as `<dir>/Name.sol/Name.json` anywhere below
/// the root; the first match in directory order wins.
///
/// The standard JSON input needed for verification comes from the compiler
/// build-info documents: the one named by a Hardhat `Name.dbg.json` next to the
/// artifact, otherwise the first document in the build-info directory whose
/// input contains the contract's source file.
#[derive(Debug, Clone)]
pub struct FileArtifactSource {
    root: PathBuf,
    build_info_dir: Option<PathBuf>,
}

impl FileArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            build_info_dir: None,
        }
    }

    /// Override the build-info directory, `<root>/build-info` by default.
    pub fn with_build_info_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_info_dir = Some(dir.into());
        self
    }

    fn build_info_dir(&self) -> PathBuf {
        self.build_info_dir
            .clone()
            .unwrap_or_else(|| self.root.join("build-info"))
    }

    /// Build-info document compiled from `source`, if one can be found.
    fn find_build_info(&self, artifact_path: &Path, source: &str) -> Result<Option<Value>> {
        // Hardhat writes `Name.dbg.json` pointing at its build-info.
        let debug_path = artifact_path.with_extension("dbg.json");
        if debug_path.exists() {
            let debug = read_json(&debug_path)?;
            if let Some(relative) = debug["buildInfo"].as_str() {
                let base = artifact_path.parent().unwrap_or(self.root.as_path());
                let build_info = read_json(&base.join(relative))?;
                if has_source(&build_info, source) {
                    return Ok(Some(build_info));
                }
            }
        }

        let dir = self.build_info_dir();
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut paths: Vec<_> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read build-info directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let build_info = read_json(&path)?;
            if has_source(&build_info, source) {
                return Ok(Some(build_info));
            }
        }
        Ok(None)
    }

    fn find_artifact(&self, name: &str) -> Result<PathBuf> {
        let file_name = format!("{name}.json");
        let dir_name = format!("{name}.sol");

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries: Vec<_> = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .collect();
            entries.sort();

            for path in entries.into_iter().rev() {
                if !path.is_dir() {
                    continue;
                }
                let candidate = path.join(&file_name);
                if path.file_name().is_some_and(|n| n == dir_name.as_str()) && candidate.exists() {
                    return Ok(candidate);
                }
                pending.push(path);
            }
        }

        anyhow::bail!(
            "Artifact for {} not found under {}",
            name,
            self.root.display()
        )
    }
}

impl ArtifactSource for FileArtifactSource {
    fn get_code(&self, name: &str) -> Result<CodeReference> {
        let path = self.find_artifact(name)?;
        let artifact = read_json(&path)?;

        let mut code = parse_artifact(name, &artifact)
            .with_context(|| format!("Invalid artifact {}", path.display()))?;

        let source = code
            .source_ref
            .rsplit_once(':')
            .map_or(code.source_ref.as_str(), |(source, _)| source)
            .to_string();
        match self.find_build_info(&path, &source)? {
            Some(build_info) => attach_build_info(&mut code, build_info),
            None => tracing::debug!(
                contract = name,
                source = %source,
                "No build-info found, verification unavailable"
            ),
        }

        tracing::debug!(
            contract = name,
            path = %path.display(),
            bytecode_len = code.bytecode.len(),
            verifiable = code.standard_json_input.is_some(),
            "Loaded artifact"
        );
        Ok(code)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn has_source(build_info: &Value, source: &str) -> bool {
    build_info["input"]["sources"].get(source).is_some()
}

/// Take the standard JSON input, and the compiler version when the artifact
/// lacks one, from a build-info document.
fn attach_build_info(code: &mut CodeReference, mut build_info: Value) {
    if code.compiler_version.is_none() {
        code.compiler_version = build_info["solcLongVersion"]
            .as_str()
            .or_else(|| build_info["solcVersion"].as_str())
            .map(String::from);
    }
    code.standard_json_input = Some(build_info["input"].take());
}

/// Parse a Foundry or Hardhat artifact document.
pub fn parse_artifact(name: &str, artifact: &Value) -> Result<CodeReference> {
    // Hardhat stores the bytecode as a string, Foundry as `{ "object": ... }`.
    let bytecode_hex = artifact["bytecode"]
        .as_str()
        .or_else(|| artifact["bytecode"]["object"].as_str())
        .context("Artifact has no bytecode")?;
    let bytecode = hex::decode(bytecode_hex.trim_start_matches("0x"))
        .context("Artifact bytecode is not valid hex (unlinked libraries?)")?;
    if bytecode.is_empty() {
        anyhow::bail!("Artifact bytecode is empty ({} is abstract or an interface)", name);
    }

    let source_ref = hardhat_source_ref(artifact)
        .or_else(|| foundry_source_ref(artifact))
        .unwrap_or_else(|| format!("{name}.sol:{name}"));

    let compiler_version = artifact["metadata"]["compiler"]["version"]
        .as_str()
        .map(String::from);

    Ok(CodeReference {
        name: name.to_string(),
        bytecode: Bytes::from(bytecode),
        abi: artifact["abi"].clone(),
        source_ref,
        compiler_version,
        standard_json_input: None,
    })
}

fn hardhat_source_ref(artifact: &Value) -> Option<String> {
    let source = artifact["sourceName"].as_str()?;
    let contract = artifact["contractName"].as_str()?;
    Some(format!("{source}:{contract}"))
}

fn foundry_source_ref(artifact: &Value) -> Option<String> {
    let target = artifact["metadata"]["settings"]["compilationTarget"].as_object()?;
    let (source, contract) = target.iter().next()?;
    Some(format!("{}:{}", source, contract.as_str()?))
}
