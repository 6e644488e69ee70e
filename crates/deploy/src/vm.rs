//! The orchestration queue ("VM").
//!
//! Units are added in dependency order, executed strictly FIFO, and the
//! results are merged into the registry partition of the run.
//!
//! ```no_run
//! use stackvm_deploy::{DeploymentVm, PartitionKey, RpcChainClient};
//! # fn units() -> (stackvm_deploy::DeploymentUnit, stackvm_deploy::DeploymentUnit) { unimplemented!() }
//!
//! # async fn example(client: RpcChainClient) -> anyhow::Result<()> {
//! let (yield_box, usdo) = units();
//! let mut vm = DeploymentVm::new(client, PartitionKey::new("local", 31337, "my-project"));
//! vm.add(yield_box).add(usdo);
//! vm.execute(1, true).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use anyhow::Result;

use crate::{
    ChainClient, CodeReference, DeploymentUnit, ExecutionEngine, PartitionKey, PersistenceWriter,
    RegistryStore, ResolvedDeployment,
    registry::MergeSummary,
    verify::{VerificationReport, VerificationRequest, Verifier},
};

/// Lifecycle of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum VmState {
    /// Units may be added.
    Building,
    /// `execute` completed.
    Executed,
    /// Results were written to the registry.
    Saved,
    /// Results were submitted for verification.
    Verified,
}

/// Ordered queue of pending deployments for one run.
pub struct DeploymentVm<C> {
    engine: ExecutionEngine<C>,
    key: PartitionKey,
    pending: VecDeque<DeploymentUnit>,
    results: Vec<ResolvedDeployment>,
    /// Code of each result, index-aligned with `results`.
    executed_code: Vec<CodeReference>,
    state: VmState,
}

impl<C: ChainClient> DeploymentVm<C> {
    /// Create an empty queue whose results belong to partition `key`.
    pub fn new(client: C, key: PartitionKey) -> Self {
        Self {
            engine: ExecutionEngine::new(client),
            key,
            pending: VecDeque::new(),
            results: Vec::new(),
            executed_code: Vec::new(),
            state: VmState::Building,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn client(&self) -> &C {
        self.engine.client()
    }

    /// Append a unit. Chainable.
    pub fn add(&mut self, unit: DeploymentUnit) -> &mut Self {
        tracing::debug!(name = %unit.name, position = self.pending.len(), "Queued deployment");
        self.pending.push_back(unit);
        self
    }

    /// Units waiting to be executed, in execution order.
    pub fn pending(&self) -> impl Iterator<Item = &DeploymentUnit> {
        self.pending.iter()
    }

    /// Whether a unit with this name is queued but not executed yet.
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.iter().any(|unit| unit.name == name)
    }

    /// Drain the queue in insertion order, deploying each unit and waiting for
    /// at least `confirmations` confirmations (or the unit's own requirement
    /// when stricter).
    ///
    /// The first failure stops the run: the failing unit and everything after
    /// it stay queued, while results confirmed before it remain in [`Self::list`].
    /// Calling `execute` again after more `add` calls appends to the results.
    pub async fn execute(&mut self, confirmations: u64, interactive: bool) -> Result<()> {
        let total = self.pending.len();
        tracing::info!(partition = %self.key, units = total, confirmations, "Executing deployment queue");

        let mut done = 0;
        while let Some(unit) = self.pending.pop_front() {
            let resolved = match self.engine.execute_unit(&unit, confirmations).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.pending.push_front(unit);
                    return Err(e);
                }
            };
            done += 1;

            if interactive {
                tracing::info!(
                    "[{}/{}] {} deployed at {} (tx {})",
                    done,
                    total,
                    resolved.name,
                    resolved.address,
                    resolved.transaction_hash
                );
            }

            self.results.push(resolved);
            self.executed_code.push(unit.code);
        }

        self.state = VmState::Executed;
        tracing::info!(partition = %self.key, deployed = done, total = self.results.len(), "Deployment queue executed");
        Ok(())
    }

    /// Resolved deployments in execution order. Empty before `execute`.
    pub fn list(&self) -> &[ResolvedDeployment] {
        &self.results
    }

    /// The resolved deployment with this name, if executed.
    pub fn get(&self, name: &str) -> Option<&ResolvedDeployment> {
        self.results.iter().find(|deployment| deployment.name == name)
    }

    /// Merge the results into the run's registry partition. Idempotent.
    pub fn save<S: RegistryStore>(
        &mut self,
        writer: &PersistenceWriter<S>,
    ) -> Result<MergeSummary> {
        let summary = writer.save(&self.key, &self.results)?;
        if self.state == VmState::Executed {
            self.state = VmState::Saved;
        }
        Ok(summary)
    }

    /// Submit every result for verification.
    ///
    /// Failures are collected in the report and logged; they never fail the run.
    pub async fn verify<V: Verifier>(&mut self, verifier: &V) -> VerificationReport {
        let mut report = VerificationReport::default();

        for (deployment, code) in self.results.iter().zip(&self.executed_code) {
            let request = VerificationRequest::new(deployment, code);
            match verifier.submit(&request).await {
                Ok(()) => {
                    tracing::info!(name = %deployment.name, address = %deployment.address, "Contract verified");
                    report.verified.push(deployment.name.clone());
                }
                Err(e) => {
                    tracing::warn!(name = %deployment.name, address = %deployment.address, error = %format!("{e:#}"), "Verification failed");
                    report.failed.push((deployment.name.clone(), format!("{e:#}")));
                }
            }
        }

        self.state = VmState::Verified;
        report
    }
}
