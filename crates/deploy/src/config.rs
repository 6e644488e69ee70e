//! Run configuration.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, address};
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ConfirmationPolicy,
    setup::{FallbackPolicy, MULTICALL3_ADDRESS},
    verify::EtherscanConfig,
};

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "StackVm.toml";

/// Prefix of the environment overrides, e.g. `STACKVM_CHAIN__RPC_URL`.
pub const ENV_PREFIX: &str = "STACKVM_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Confirmation depth per network class.
    #[serde(default)]
    pub confirmations: ConfirmationPolicy,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub setup: SetupConfig,

    /// Verification is unavailable when unset.
    #[serde(default)]
    pub etherscan: Option<EtherscanConfig>,
}

impl StackConfig {
    /// Load configuration, later sources overriding earlier ones:
    /// 1. Default values
    /// 2. `path`, or `StackVm.toml` in the current directory (if present)
    /// 3. Environment variables with the `STACKVM_` prefix, nested with `__`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            anyhow::bail!("Config file not found: {}", file.display());
        }

        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))
    }
}

/// Registry locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root of the local registry this project writes to.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Root of the shared, read-only global registry.
    #[serde(default = "default_global_dir")]
    pub global_dir: PathBuf,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_global_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stackvm")
        .join("global")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            global_dir: default_global_dir(),
        }
    }
}

/// Target chain connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: Url,

    /// Unlocked account transactions are sent from.
    #[serde(default = "default_from")]
    pub from: Address,

    /// Receipt polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_rpc_url() -> Url {
    Url::parse("http://127.0.0.1:8545").expect("Default RPC URL is valid")
}

/// First prefunded account of anvil and hardhat dev nodes.
fn default_from() -> Address {
    address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            from: default_from(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Compiled artifacts location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
    /// Compiler build-info documents, used for source verification.
    /// Defaults to `<dir>/build-info`.
    #[serde(default)]
    pub build_info_dir: Option<PathBuf>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            build_info_dir: None,
        }
    }
}

/// Post-deployment setup behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Multicall3 contract used for the aggregated attempt.
    #[serde(default = "default_multicall")]
    pub multicall: Address,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

fn default_multicall() -> Address {
    MULTICALL3_ADDRESS
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            multicall: default_multicall(),
            fallback: FallbackPolicy::default(),
        }
    }
}
