//! Declarative deployment plans.
//!
//! A plan lists contracts in dependency order and the setup calls to run once
//! they are deployed:
//!
//! ```toml
//! project = "linked-chain-stack"
//!
//! [[contract]]
//! name = "YieldBox"
//! args = [
//!   { lookup = { name = "WETHMock", namespace = "tapioca-mocks", required = true } },
//!   { deployed = "YieldBoxURIBuilder" },
//! ]
//!
//! [[setup]]
//! target = { deployed = "USDO" }
//! function = "setFlashloanHelper(address)"
//! args = [{ deployed = "USDOFlashloanHelper" }]
//! ```

mod runner;

use std::{collections::HashSet, path::Path};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use runner::{PlanRunner, PlanSetup, RunReport};

use crate::VmError;

/// A full deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentPlan {
    /// Project name, also the namespace the results are saved under.
    pub project: String,
    /// Contracts in deployment order.
    #[serde(default, rename = "contract")]
    pub contracts: Vec<ContractSpec>,
    /// Calls to run after every contract is deployed.
    #[serde(default, rename = "setup")]
    pub setup: Vec<SetupSpec>,
}

impl DeploymentPlan {
    /// Parse and [validate](Self::validate) a plan from TOML.
    pub fn parse(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content).context("Failed to parse deployment plan")?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check the plan without touching a chain or registry.
    ///
    /// Contract names are unique, and every `deployed` reference names a
    /// contract of the plan. Contract arguments may only reference contracts
    /// declared before them.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            anyhow::bail!("Deployment plan has an empty project name");
        }

        let mut declared = HashSet::new();
        for contract in &self.contracts {
            let mut referenced = Vec::new();
            for arg in &contract.args {
                arg.collect_deployed(&mut referenced);
            }
            if let Some(name) = referenced.into_iter().find(|name| !declared.contains(name)) {
                return Err(anyhow::Error::new(VmError::UnknownReference {
                    name: name.to_string(),
                }))
                .with_context(|| {
                    format!("{} must be declared after the contracts it references", contract.name)
                });
            }

            if !declared.insert(contract.name.as_str()) {
                return Err(VmError::DuplicateContract {
                    name: contract.name.clone(),
                }
                .into());
            }
        }

        if let Some(name) = self
            .referenced_names()
            .into_iter()
            .find(|name| !declared.contains(name))
        {
            return Err(VmError::UnknownReference {
                name: name.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Read and parse a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment plan: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid deployment plan: {}", path.display()))
    }

    /// Names of every contract the plan references through `deployed`.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for contract in &self.contracts {
            for arg in &contract.args {
                arg.collect_deployed(&mut names);
            }
        }
        for setup in &self.setup {
            setup.target.collect_deployed(&mut names);
            for arg in &setup.args {
                arg.collect_deployed(&mut names);
            }
        }
        names
    }

    /// Every lookup marked `required`, in plan order.
    pub fn required_lookups(&self) -> Vec<&LookupSpec> {
        let mut lookups = Vec::new();
        for contract in &self.contracts {
            for arg in &contract.args {
                arg.collect_lookups(&mut lookups);
            }
        }
        for setup in &self.setup {
            setup.target.collect_lookups(&mut lookups);
            for arg in &setup.args {
                arg.collect_lookups(&mut lookups);
            }
        }
        lookups.retain(|lookup| lookup.required);
        lookups
    }
}

/// One contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractSpec {
    /// Name the deployment is recorded under.
    pub name: String,
    /// Artifact to build from; defaults to `name`.
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    /// Skip the deployment when the contract is already registered.
    #[serde(default)]
    pub reuse: Option<ReuseSpec>,
    /// Extra confirmation depth for this contract alone.
    #[serde(default)]
    pub confirmations: Option<u64>,
}

impl ContractSpec {
    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }
}

/// Where to look for an already deployed copy of a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReuseSpec {
    /// Global namespace to search; the project namespace when omitted.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A constructor or call argument as written in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Keyword(ArgKeyword),
    Value(ArgValue),
}

/// Bare-string arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKeyword {
    /// The sending account.
    Signer,
    /// The zero address.
    Zero,
}

/// Single-key table arguments, e.g. `{ uint = "1" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgValue {
    Address(Address),
    /// Decimal or `0x` hex, as a string so values above `i64::MAX` fit.
    Uint(String),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Word(B256),
    Array(Vec<ArgSpec>),
    /// A contract deployed (or reused) earlier in the same run.
    Deployed(String),
    Lookup(LookupSpec),
}

impl ArgSpec {
    fn collect_deployed<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Value(ArgValue::Deployed(name)) => names.push(name),
            Self::Value(ArgValue::Array(items)) => {
                for item in items {
                    item.collect_deployed(names);
                }
            }
            _ => {}
        }
    }

    fn collect_lookups<'a>(&'a self, lookups: &mut Vec<&'a LookupSpec>) {
        match self {
            Self::Value(ArgValue::Lookup(lookup)) => lookups.push(lookup),
            Self::Value(ArgValue::Array(items)) => {
                for item in items {
                    item.collect_lookups(lookups);
                }
            }
            _ => {}
        }
    }
}

/// A registry query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSpec {
    pub name: String,
    /// Global namespace to search; the project namespace when omitted.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Match `name` as a prefix instead of exactly.
    #[serde(default)]
    pub prefix: bool,
    /// Fail the run instead of falling back to the zero address.
    #[serde(default)]
    pub required: bool,
}

/// A post-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupSpec {
    /// Must resolve to an address.
    pub target: ArgSpec,
    /// Raw calldata; exclusive with `function`.
    #[serde(default)]
    pub calldata: Option<Bytes>,
    /// Solidity signature such as `setOwner(address)`.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
        project = "linked-chain-stack"

        [[contract]]
        name = "YieldBoxURIBuilder"

        [[contract]]
        name = "YieldBox"
        artifact = "YieldBoxV2"
        args = [
          { lookup = { name = "WETHMock", namespace = "tapioca-mocks", prefix = true, required = true } },
          { deployed = "YieldBoxURIBuilder" },
        ]

        [[contract]]
        name = "Cluster"
        reuse = { namespace = "tapioca-periphery" }
        args = [{ uint = "1" }, "signer", "zero", { array = [{ bool = true }] }]

        [[setup]]
        target = { deployed = "YieldBox" }
        function = "setCluster(address)"
        args = [{ deployed = "Cluster" }]
    "#;

    #[test]
    fn test_parse_plan() {
        let plan = DeploymentPlan::parse(PLAN).unwrap();

        assert_eq!(plan.project, "linked-chain-stack");
        assert_eq!(plan.contracts.len(), 3);
        assert_eq!(plan.contracts[0].artifact_name(), "YieldBoxURIBuilder");
        assert_eq!(plan.contracts[1].artifact_name(), "YieldBoxV2");
        assert_eq!(
            plan.contracts[1].args[0],
            ArgSpec::Value(ArgValue::Lookup(LookupSpec {
                name: "WETHMock".to_string(),
                namespace: Some("tapioca-mocks".to_string()),
                prefix: true,
                required: true,
            }))
        );
        assert_eq!(
            plan.contracts[2].reuse.as_ref().unwrap().namespace.as_deref(),
            Some("tapioca-periphery")
        );
        assert_eq!(plan.contracts[2].args[1], ArgSpec::Keyword(ArgKeyword::Signer));
        assert_eq!(plan.contracts[2].args[2], ArgSpec::Keyword(ArgKeyword::Zero));
        assert_eq!(plan.setup.len(), 1);
        assert_eq!(plan.setup[0].function.as_deref(), Some("setCluster(address)"));
    }

    #[test]
    fn test_referenced_names() {
        let plan = DeploymentPlan::parse(PLAN).unwrap();
        assert_eq!(
            plan.referenced_names(),
            vec!["YieldBoxURIBuilder", "YieldBox", "Cluster"]
        );
    }

    #[test]
    fn test_required_lookups() {
        let plan = DeploymentPlan::parse(
            r#"
            project = "p"
            [[contract]]
            name = "A"
            args = [
              { lookup = { name = "Optional" } },
              { array = [{ lookup = { name = "Nested", required = true } }] },
            ]

            [[setup]]
            target = { lookup = { name = "Target", required = true } }
            calldata = "0x"
            "#,
        )
        .unwrap();

        let names: Vec<_> = plan.required_lookups().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Nested", "Target"]);
    }

    #[test]
    fn test_parse_rejects_duplicate_contracts() {
        let err = DeploymentPlan::parse(
            r#"
            project = "p"
            [[contract]]
            name = "Oracle"
            [[contract]]
            name = "Oracle"
            artifact = "SeerOracle"
            "#,
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<VmError>(),
            Some(&VmError::DuplicateContract {
                name: "Oracle".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejects_forward_and_unknown_references() {
        let err = DeploymentPlan::parse(
            r#"
            project = "p"
            [[contract]]
            name = "A"
            args = [{ deployed = "B" }]
            [[contract]]
            name = "B"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VmError>(),
            Some(&VmError::UnknownReference { name: "B".to_string() })
        );

        let err = DeploymentPlan::parse(
            r#"
            project = "p"
            [[contract]]
            name = "A"
            [[setup]]
            target = { deployed = "Nowhere" }
            calldata = "0x"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VmError>(),
            Some(&VmError::UnknownReference {
                name: "Nowhere".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = DeploymentPlan::parse(
            r#"
            project = "p"
            [[contract]]
            name = "A"
            constructor = []
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("constructor"));
    }

    #[test]
    fn test_parse_rejects_empty_project() {
        assert!(DeploymentPlan::parse("project = \"\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir::TempDir::new("stackvm-plan").unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, "project = \"solo\"\n[[contract]]\nname = \"A\"\n").unwrap();

        let plan = DeploymentPlan::load(&path).unwrap();
        assert_eq!(plan.contracts[0].name, "A");
        assert!(plan.setup.is_empty());
    }
}
