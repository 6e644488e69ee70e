//! stackvm deploys multi-contract stacks from a plan, records them in
//! namespaced registries and wires them together.

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs, ListArgs, PartitionArgs, ResolveArgs};
use stackvm_deploy::{
    AddressReference, AttemptResult, DeploymentPlan, EtherscanVerifier, FileArtifactSource,
    FileRegistryStore, Lookup, NamePredicate, PartitionKey, PlanRunner, RegistryStore,
    ResolvedDeployment, RpcChainClient, StackConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = StackConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Deploy(args) => deploy(&config, args).await,
        Command::List(args) => list(&config, args).await,
        Command::Resolve(args) => resolve(&config, args).await,
    }
}

fn chain_client(config: &StackConfig, partition: &PartitionArgs) -> Result<RpcChainClient> {
    let url = partition
        .rpc_url
        .clone()
        .unwrap_or_else(|| config.chain.rpc_url.clone());
    Ok(RpcChainClient::new(url, config.chain.from)?
        .with_poll_interval(Duration::from_millis(config.chain.poll_interval_ms)))
}

async fn chain_id(client: &RpcChainClient, partition: &PartitionArgs) -> Result<u64> {
    match partition.chain_id {
        Some(chain_id) => Ok(chain_id),
        None => client
            .chain_id()
            .await
            .with_context(|| format!("Failed to query chain id from {}", client.url())),
    }
}

async fn deploy(config: &StackConfig, args: DeployArgs) -> Result<()> {
    let plan = DeploymentPlan::load(&args.plan)?;
    let client = chain_client(config, &args.partition)?;
    let chain_id = chain_id(&client, &args.partition).await?;
    let confirmations = config.confirmations.required(args.network);

    tracing::info!(
        plan = %args.plan.display(),
        project = %plan.project,
        tag = %args.partition.tag,
        chain_id,
        network = %args.network,
        confirmations,
        "Loading deployment plan..."
    );

    let verifier = if args.verify {
        match &config.etherscan {
            Some(etherscan) => Some(EtherscanVerifier::new(etherscan.clone())?),
            None => {
                tracing::warn!("Verification requested but no [etherscan] section is configured, skipping");
                None
            }
        }
    } else {
        None
    };

    let artifacts_dir = args.artifacts.unwrap_or_else(|| config.artifacts.dir.clone());
    let mut artifacts = FileArtifactSource::new(artifacts_dir);
    if let Some(build_info_dir) = &config.artifacts.build_info_dir {
        artifacts = artifacts.with_build_info_dir(build_info_dir);
    }
    let runner = PlanRunner::new(
        client,
        artifacts,
        FileRegistryStore::new(&config.registry.global_dir),
        FileRegistryStore::new(&config.registry.local_dir),
        args.partition.tag.as_str(),
        chain_id,
    )
    .with_confirmations(confirmations)
    .with_interactive(args.interactive)
    .with_multicall(config.setup.multicall)
    .with_fallback(config.setup.fallback);

    let report = runner.run(&plan, verifier.as_ref()).await?;

    let mut all = report.deployments.clone();
    all.extend(report.reused.iter().cloned());
    println!("{}", deployments_table(&all));

    match &report.setup {
        AttemptResult::NoCalls => {}
        AttemptResult::Aggregated(tx_hash) => {
            tracing::info!(tx_hash = %tx_hash, "Setup applied in one transaction");
        }
        AttemptResult::Degraded { tx_hashes, skipped } => {
            tracing::warn!(
                confirmed = tx_hashes.len(),
                skipped = skipped.len(),
                "Setup applied call by call"
            );
        }
    }

    if let Some(verification) = &report.verification {
        for (name, error) in &verification.failed {
            tracing::warn!(name = %name, error = %error, "Not verified");
        }
    }

    tracing::info!(
        partition = %report.partition,
        deployed = report.deployments.len(),
        reused = report.reused.len(),
        "Deployment complete"
    );

    Ok(())
}

async fn list(config: &StackConfig, args: ListArgs) -> Result<()> {
    let root = if args.global {
        &config.registry.global_dir
    } else {
        &config.registry.local_dir
    };
    let store = FileRegistryStore::new(root);

    let chain_id = if let Some(chain_id) = args.partition.chain_id {
        chain_id
    } else {
        let client = chain_client(config, &args.partition)?;
        chain_id(&client, &args.partition).await?
    };

    let namespaces = match args.namespace {
        Some(namespace) => vec![namespace],
        None => store.namespaces(&args.partition.tag, chain_id)?,
    };

    if namespaces.is_empty() {
        println!(
            "No deployments recorded for {}/{} in {}",
            args.partition.tag,
            chain_id,
            root.display()
        );
        return Ok(());
    }

    for namespace in namespaces {
        let key = PartitionKey::new(args.partition.tag.as_str(), chain_id, namespace);
        key.validate()?;
        let deployments = store.load_partition(&key)?;
        println!("{key}");
        println!("{}", deployments_table(&deployments));
    }

    Ok(())
}

async fn resolve(config: &StackConfig, args: ResolveArgs) -> Result<()> {
    let chain_id = if let Some(chain_id) = args.partition.chain_id {
        chain_id
    } else {
        let client = chain_client(config, &args.partition)?;
        chain_id(&client, &args.partition).await?
    };

    let project = args.project.as_deref().unwrap_or(&args.namespace);
    let lookup = Lookup::new(
        FileRegistryStore::new(&config.registry.global_dir),
        FileRegistryStore::new(&config.registry.local_dir),
        project,
    );
    let predicate = if args.prefix {
        NamePredicate::prefix(args.name.as_str())
    } else {
        NamePredicate::exact(args.name.as_str())
    };

    match lookup.resolve(&args.partition.tag, chain_id, &args.namespace, &predicate)? {
        AddressReference::Unset => {
            println!(
                "{} not found (unset, {})",
                predicate.pattern(),
                AddressReference::Unset.address()
            );
        }
        found => {
            let tier = found.tier();
            if let Some(deployment) = found.deployment() {
                println!("{} {} ({tier})", deployment.name, deployment.address);
            }
        }
    }

    Ok(())
}

fn deployments_table(deployments: &[ResolvedDeployment]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Address", "Transaction", "Block"]);
    for deployment in deployments {
        table.add_row(vec![
            deployment.name.clone(),
            deployment.address.to_string(),
            deployment.transaction_hash.to_string(),
            deployment
                .block_number
                .map(|block| block.to_string())
                .unwrap_or_default(),
        ]);
    }
    table
}
