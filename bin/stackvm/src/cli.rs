use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stackvm_deploy::NetworkClass;
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default deployment tag.
const DEFAULT_TAG: &str = "local";

#[derive(Parser)]
#[command(name = "stackvm")]
#[command(
    author,
    version,
    about = "Deploy, register and wire multi-contract stacks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "STACKVM_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a StackVm.toml configuration file.
    ///
    /// If not provided, ./StackVm.toml is used when present.
    #[arg(long, global = true, alias = "conf", env = "STACKVM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a deployment plan.
    Deploy(DeployArgs),
    /// Show the deployments recorded in a registry partition.
    List(ListArgs),
    /// Resolve a contract through the global then local registry.
    Resolve(ResolveArgs),
}

/// Selects the `(tag, chain id)` part of a registry partition.
#[derive(Debug, Clone, Args)]
pub struct PartitionArgs {
    /// Deployment tag, e.g. the environment name.
    #[arg(long, env = "STACKVM_TAG", default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Chain id of the target network.
    ///
    /// If not provided, it is queried from the configured RPC endpoint.
    #[arg(long, env = "STACKVM_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Override the RPC endpoint from the configuration.
    #[arg(long, alias = "rpc", env = "STACKVM_RPC_URL")]
    pub rpc_url: Option<Url>,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Path to the deployment plan.
    #[arg(long, env = "STACKVM_PLAN")]
    pub plan: PathBuf,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Network class, selecting the confirmation depth.
    #[arg(long, env = "STACKVM_NETWORK", default_value_t = NetworkClass::Ephemeral)]
    pub network: NetworkClass,

    /// Submit the deployed contracts for source verification.
    #[arg(long, env = "STACKVM_VERIFY")]
    pub verify: bool,

    /// Print progress for every deployed contract.
    #[arg(short, long)]
    pub interactive: bool,

    /// Override the artifacts directory from the configuration.
    #[arg(long, env = "STACKVM_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Namespace to show. If not provided, every namespace of the partition is shown.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Read the global registry instead of the local one.
    #[arg(long)]
    pub global: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    /// Contract name, or name prefix with --prefix.
    pub name: String,

    /// Global namespace to search.
    #[arg(long)]
    pub namespace: String,

    /// Local namespace (project) searched after the global one.
    ///
    /// Defaults to --namespace.
    #[arg(long)]
    pub project: Option<String>,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Match the name as a prefix.
    #[arg(long)]
    pub prefix: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "stackvm",
            "deploy",
            "--plan",
            "plan.toml",
            "--tag",
            "prod",
            "--chain-id",
            "42161",
            "--network",
            "live",
            "--verify",
        ])
        .unwrap();

        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.plan, PathBuf::from("plan.toml"));
        assert_eq!(args.partition.tag, "prod");
        assert_eq!(args.partition.chain_id, Some(42161));
        assert_eq!(args.network, NetworkClass::Live);
        assert!(args.verify);
        assert!(!args.interactive);
    }

    #[test]
    fn test_parse_resolve_defaults() {
        let cli = Cli::try_parse_from([
            "stackvm",
            "resolve",
            "WETH",
            "--namespace",
            "tapioca-mocks",
            "--prefix",
            "-v",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        let Command::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.name, "WETH");
        assert!(args.prefix);
        assert_eq!(args.partition.tag, DEFAULT_TAG);
        assert!(args.project.is_none());
    }
}
