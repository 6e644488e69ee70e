//! Execution engine: one unit in, one resolved deployment out.

use anyhow::{Context, Result};

use crate::{ChainClient, DeploymentUnit, ResolvedDeployment, VmError};

/// Depth actually awaited for a unit: the stricter of the run-wide and the
/// unit's own requirement.
pub fn effective_confirmations(unit: &DeploymentUnit, confirmations: u64) -> u64 {
    confirmations.max(unit.confirmations_required).max(1)
}

/// Deploys units against a [`ChainClient`].
#[derive(Debug, Clone)]
pub struct ExecutionEngine<C> {
    client: C,
}

impl<C: ChainClient> ExecutionEngine<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy `unit` and block until it is confirmed.
    ///
    /// The confirmation wait is bounded only by chain liveness.
    pub async fn execute_unit(
        &self,
        unit: &DeploymentUnit,
        confirmations: u64,
    ) -> Result<ResolvedDeployment> {
        let confirmations = effective_confirmations(unit, confirmations);

        tracing::info!(
            name = %unit.name,
            artifact = %unit.code.name,
            args = unit.constructor_args.len(),
            confirmations,
            "Deploying contract"
        );

        let deployed = self
            .client
            .deploy(&unit.code, &unit.constructor_args)
            .await
            .with_context(|| VmError::DeploymentFailed {
                name: unit.name.clone(),
            })?;

        tracing::info!(
            name = %unit.name,
            address = %deployed.address,
            tx_hash = %deployed.transaction_hash,
            confirmations,
            "Deployment submitted, waiting for confirmations (no timeout)"
        );

        let receipt = self
            .client
            .wait_confirmations(deployed.transaction_hash, confirmations)
            .await
            .with_context(|| VmError::DeploymentFailed {
                name: unit.name.clone(),
            })?;

        let address = receipt.contract_address.unwrap_or(deployed.address);

        Ok(ResolvedDeployment {
            name: unit.name.clone(),
            address,
            transaction_hash: deployed.transaction_hash,
            constructor_args: unit.constructor_args.clone(),
            artifact: unit.code.name.clone(),
            block_number: Some(receipt.block_number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodeReference;

    #[test]
    fn test_effective_confirmations_takes_stricter() {
        let code = CodeReference::from_bytecode("A", vec![0x00]);
        let live = DeploymentUnit::new("A", code.clone(), vec![], 12);
        let local = DeploymentUnit::new("A", code, vec![], 1);

        assert_eq!(effective_confirmations(&live, 3), 12);
        assert_eq!(effective_confirmations(&local, 3), 3);
        assert_eq!(effective_confirmations(&local, 0), 1);
    }
}
