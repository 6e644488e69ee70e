use std::str::FromStr;

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};

use super::{ArgKeyword, ArgSpec, ArgValue, DeploymentPlan, LookupSpec, SetupSpec};
use crate::{
    ArtifactSource, ChainClient, ConstructorArg, DeploymentUnit, DeploymentVm, PartitionKey,
    PersistenceWriter, RegistryStore, ResolvedDeployment, SetupCall, VmError,
    registry::{Lookup, MergeSummary, NamePredicate},
    setup::{
        AttemptResult, FallbackPolicy, MULTICALL3_ADDRESS, Multicall3, SetupBuilder, SetupExecutor,
    },
    types::encode_call,
    verify::{VerificationReport, Verifier},
};

/// Outcome of a plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub partition: PartitionKey,
    /// Contracts deployed by this run, in execution order.
    pub deployments: Vec<ResolvedDeployment>,
    /// Contracts found in a registry and not redeployed.
    pub reused: Vec<ResolvedDeployment>,
    pub saved: MergeSummary,
    /// `None` when verification was not requested.
    pub verification: Option<VerificationReport>,
    pub setup: AttemptResult,
}

/// Runs a [`DeploymentPlan`] end to end: deploy, save, verify, setup.
pub struct PlanRunner<C, A, G, L> {
    client: C,
    artifacts: A,
    global: G,
    local: L,
    tag: String,
    chain_id: u64,
    confirmations: u64,
    interactive: bool,
    multicall: Address,
    fallback: FallbackPolicy,
}

impl<C, A, G, L> PlanRunner<C, A, G, L>
where
    C: ChainClient + Clone,
    A: ArtifactSource,
    G: RegistryStore,
    L: RegistryStore,
{
    /// `local` is the store results are saved to; `global` is read-only.
    pub fn new(
        client: C,
        artifacts: A,
        global: G,
        local: L,
        tag: impl Into<String>,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            artifacts,
            global,
            local,
            tag: tag.into(),
            chain_id,
            confirmations: 1,
            interactive: false,
            multicall: MULTICALL3_ADDRESS,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_multicall(mut self, multicall: Address) -> Self {
        self.multicall = multicall;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Run the plan. Verification runs only when a verifier is given and its
    /// failures are reported, not returned.
    ///
    /// The plan is validated and every required lookup resolved before the
    /// first transaction is sent. When a deployment fails, whatever was
    /// confirmed before it is saved before the error is returned.
    pub async fn run<V: Verifier>(
        &self,
        plan: &DeploymentPlan,
        verifier: Option<&V>,
    ) -> Result<RunReport> {
        let key = PartitionKey::new(self.tag.as_str(), self.chain_id, plan.project.as_str());
        key.validate()?;
        plan.validate()?;

        tracing::info!(
            partition = %key,
            contracts = plan.contracts.len(),
            setup_calls = plan.setup.len(),
            confirmations = self.confirmations,
            "Running deployment plan"
        );

        let lookup = Lookup::new(&self.global, &self.local, plan.project.as_str());
        self.check_required(plan, &lookup)?;

        let writer = PersistenceWriter::new(&self.local);
        let mut vm = DeploymentVm::new(self.client.clone(), key.clone());
        let mut reused = Vec::new();

        if let Err(e) = self.deploy_all(plan, &lookup, &mut vm, &mut reused).await {
            if !vm.list().is_empty() {
                match vm.save(&writer) {
                    Ok(summary) => tracing::warn!(
                        partition = %key,
                        saved = vm.list().len(),
                        added = summary.added,
                        "Saved confirmed deployments before failing"
                    ),
                    Err(save_err) => tracing::error!(
                        partition = %key,
                        error = %format!("{save_err:#}"),
                        "Failed to save confirmed deployments"
                    ),
                }
            }
            return Err(e);
        }

        let saved = vm.save(&writer)?;
        tracing::info!(
            partition = %key,
            added = saved.added,
            replaced = saved.replaced,
            unchanged = saved.unchanged,
            "Saved deployments"
        );

        let verification = match verifier {
            Some(verifier) => Some(vm.verify(verifier).await),
            None => None,
        };

        let deployments = vm.list().to_vec();
        let known: Vec<ResolvedDeployment> = deployments.iter().chain(&reused).cloned().collect();
        let builder = PlanSetup::new(
            &plan.setup,
            &lookup,
            &self.tag,
            self.chain_id,
            self.client.sender(),
        );
        let builders: [&dyn SetupBuilder; 1] = [&builder];
        let multicall = Multicall3::new(vm.client()).at(self.multicall);
        let setup = SetupExecutor::new(vm.client(), multicall)
            .with_policy(self.fallback)
            .run_builders(&known, &builders)
            .await?;

        Ok(RunReport {
            partition: key,
            deployments,
            reused,
            saved,
            verification,
            setup,
        })
    }

    /// Resolve every required lookup of the plan, failing on the first missing one.
    fn check_required<GS: RegistryStore, LS: RegistryStore>(
        &self,
        plan: &DeploymentPlan,
        lookup: &Lookup<GS, LS>,
    ) -> Result<()> {
        let resolver = Resolver {
            known: [&[], &[]],
            lookup,
            tag: &self.tag,
            chain_id: self.chain_id,
            sender: self.client.sender(),
        };
        for spec in plan.required_lookups() {
            resolver.lookup(spec)?;
        }
        Ok(())
    }

    async fn deploy_all<GS: RegistryStore, LS: RegistryStore>(
        &self,
        plan: &DeploymentPlan,
        lookup: &Lookup<GS, LS>,
        vm: &mut DeploymentVm<C>,
        reused: &mut Vec<ResolvedDeployment>,
    ) -> Result<()> {
        let sender = self.client.sender();

        for contract in &plan.contracts {
            if let Some(reuse) = &contract.reuse {
                let namespace = reuse.namespace.as_deref().unwrap_or(&plan.project);
                let predicate = NamePredicate::exact(&contract.name);
                let found = lookup.resolve(&self.tag, self.chain_id, namespace, &predicate)?;
                if let Some(deployment) = found.deployment() {
                    tracing::info!(
                        name = %contract.name,
                        address = %deployment.address,
                        tier = found.tier(),
                        "Reusing deployed contract"
                    );
                    reused.push(deployment.clone());
                    continue;
                }
            }

            let mut referenced = Vec::new();
            for arg in &contract.args {
                arg.collect_deployed(&mut referenced);
            }
            if referenced.iter().any(|name| vm.is_pending(name)) {
                tracing::debug!(name = %contract.name, "Flushing queue to resolve dependencies");
                vm.execute(self.confirmations, self.interactive).await?;
            }

            let resolver = Resolver {
                known: [vm.list(), reused.as_slice()],
                lookup,
                tag: &self.tag,
                chain_id: self.chain_id,
                sender,
            };
            let args = contract
                .args
                .iter()
                .map(|arg| resolver.resolve(arg))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Failed to resolve arguments of {}", contract.name))?;

            let code = self.artifacts.get_code(contract.artifact_name())?;
            let unit = DeploymentUnit::new(
                contract.name.as_str(),
                code,
                args,
                contract.confirmations.unwrap_or(self.confirmations),
            );
            vm.add(unit);
        }

        vm.execute(self.confirmations, self.interactive).await
    }
}

/// Turns argument specs into concrete values for one point of a run.
struct Resolver<'r, G, L> {
    /// Executed and reused deployments; the last match by name wins.
    known: [&'r [ResolvedDeployment]; 2],
    lookup: &'r Lookup<G, L>,
    tag: &'r str,
    chain_id: u64,
    sender: Address,
}

impl<G: RegistryStore, L: RegistryStore> Resolver<'_, G, L> {
    fn resolve(&self, spec: &ArgSpec) -> Result<ConstructorArg> {
        let value = match spec {
            ArgSpec::Keyword(ArgKeyword::Signer) => ConstructorArg::Address(self.sender),
            ArgSpec::Keyword(ArgKeyword::Zero) => ConstructorArg::Address(Address::ZERO),
            ArgSpec::Value(value) => match value {
                ArgValue::Address(address) => ConstructorArg::Address(*address),
                ArgValue::Uint(raw) => ConstructorArg::Uint(
                    U256::from_str(raw.trim())
                        .with_context(|| format!("Invalid uint argument: {raw}"))?,
                ),
                ArgValue::Bool(value) => ConstructorArg::Bool(*value),
                ArgValue::String(value) => ConstructorArg::String(value.clone()),
                ArgValue::Bytes(value) => ConstructorArg::Bytes(value.clone()),
                ArgValue::Word(value) => ConstructorArg::Word(*value),
                ArgValue::Array(items) => ConstructorArg::Array(
                    items.iter().map(|item| self.resolve(item)).collect::<Result<_>>()?,
                ),
                ArgValue::Deployed(name) => ConstructorArg::Address(self.deployed(name)?),
                ArgValue::Lookup(spec) => ConstructorArg::Address(self.lookup(spec)?),
            },
        };
        Ok(value)
    }

    fn deployed(&self, name: &str) -> Result<Address> {
        self.known
            .iter()
            .flat_map(|deployments| deployments.iter())
            .filter(|deployment| deployment.name == name)
            .last()
            .map(|deployment| deployment.address)
            .ok_or_else(|| VmError::UnknownReference { name: name.to_string() }.into())
    }

    fn lookup(&self, spec: &LookupSpec) -> Result<Address> {
        let predicate = if spec.prefix {
            NamePredicate::prefix(spec.name.as_str())
        } else {
            NamePredicate::exact(spec.name.as_str())
        };
        let namespace = spec.namespace.as_deref().unwrap_or(self.lookup.local_namespace());

        if spec.required {
            return Ok(self
                .lookup
                .require(self.tag, self.chain_id, namespace, &predicate)?
                .address);
        }

        let found = self.lookup.resolve(self.tag, self.chain_id, namespace, &predicate)?;
        if found.is_unset() {
            tracing::warn!(
                pattern = predicate.pattern(),
                namespace,
                "Optional dependency not found, using the zero address"
            );
        }
        Ok(found.address())
    }
}

/// [`SetupBuilder`] for the `[[setup]]` entries of a plan.
pub struct PlanSetup<'a, G, L> {
    specs: &'a [SetupSpec],
    lookup: &'a Lookup<G, L>,
    tag: &'a str,
    chain_id: u64,
    sender: Address,
}

impl<'a, G: RegistryStore, L: RegistryStore> PlanSetup<'a, G, L> {
    pub fn new(
        specs: &'a [SetupSpec],
        lookup: &'a Lookup<G, L>,
        tag: &'a str,
        chain_id: u64,
        sender: Address,
    ) -> Self {
        Self {
            specs,
            lookup,
            tag,
            chain_id,
            sender,
        }
    }
}

impl<G: RegistryStore, L: RegistryStore> SetupBuilder for PlanSetup<'_, G, L> {
    fn build(&self, deployments: &[ResolvedDeployment]) -> Result<Vec<SetupCall>> {
        let resolver = Resolver {
            known: [deployments, &[]],
            lookup: self.lookup,
            tag: self.tag,
            chain_id: self.chain_id,
            sender: self.sender,
        };

        self.specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                build_call(&resolver, spec)
                    .with_context(|| format!("Invalid setup entry #{index}"))
            })
            .collect()
    }
}

fn build_call<G: RegistryStore, L: RegistryStore>(
    resolver: &Resolver<'_, G, L>,
    spec: &SetupSpec,
) -> Result<SetupCall> {
    let target = resolver
        .resolve(&spec.target)?
        .as_address()
        .context("Setup target must resolve to an address")?;

    let payload = match (&spec.calldata, &spec.function) {
        (Some(calldata), None) if spec.args.is_empty() => calldata.clone(),
        (Some(_), None) => anyhow::bail!("Setup entry with raw calldata cannot take args"),
        (None, Some(function)) => {
            let args = spec
                .args
                .iter()
                .map(|arg| resolver.resolve(arg))
                .collect::<Result<Vec<_>>>()?;
            encode_call(function, &args)
        }
        (Some(_), Some(_)) => anyhow::bail!("Setup entry has both calldata and function"),
        (None, None) => anyhow::bail!("Setup entry needs calldata or function"),
    };

    Ok(SetupCall::new(target, payload))
}
