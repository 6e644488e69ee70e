//! Domain errors attached as context to `anyhow` errors.
//!
//! Callers that need to tell failure classes apart can recover them with
//! `err.downcast_ref::<VmError>()`.

use alloy_core::primitives::{Address, B256};
use derive_more::{Display, Error};

/// Failure classes of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum VmError {
    /// A hard dependency resolved to the sentinel address.
    #[display("required dependency not found: {name} (namespace {namespace}, tag {tag}, chain {chain_id})")]
    MissingDependency {
        name: String,
        namespace: String,
        tag: String,
        chain_id: u64,
    },

    /// The deployment transaction of a unit failed or was rejected.
    #[display("deployment of {name} failed")]
    DeploymentFailed { name: String },

    /// A mined transaction reported a failed status.
    #[display("transaction {hash} reverted")]
    TransactionReverted { hash: B256 },

    /// A plan referenced a contract that is neither queued nor deployed in this run.
    #[display("unknown contract reference: {name}")]
    UnknownReference { name: String },

    /// Two contracts of one plan share a name.
    #[display("contract {name} is declared more than once")]
    DuplicateContract { name: String },

    /// A sequential setup call failed.
    #[display("setup call #{index} to {target} failed")]
    SetupCallFailed { index: usize, target: Address },

    /// A partition key component cannot be used as a storage path segment.
    #[display("invalid partition key segment: {segment:?}")]
    InvalidPartitionKey { segment: String },
}
