//! stackvm-deploy - Deployment orchestration for multi-contract stacks.
//!
//! This crate queues contract deployments, executes them in order against a
//! chain, records the results in namespaced registries and runs the
//! configuration calls that wire the deployed contracts together.

mod error;
pub use error::VmError;

mod types;
pub use types::{
    CodeReference, ConstructorArg, DeployedContract, DeploymentUnit, ResolvedDeployment, SetupCall,
    TransactionReceipt, encode_args, encode_call,
};

mod network;
pub use network::{
    ConfirmationPolicy, DEFAULT_EPHEMERAL_CONFIRMATIONS, DEFAULT_LIVE_CONFIRMATIONS, NetworkClass,
};

pub mod registry;
pub use registry::{
    AddressReference, FileRegistryStore, Lookup, MemoryRegistryStore, NamePredicate,
    PartitionKey, PersistenceWriter, RegistryStore,
};

pub mod rpc;

mod chain;
pub use chain::{ChainClient, RpcChainClient};

mod artifacts;
pub use artifacts::{ArtifactSource, FileArtifactSource, parse_artifact};

mod execution;
pub use execution::{ExecutionEngine, effective_confirmations};

mod vm;
pub use vm::{DeploymentVm, VmState};

pub mod verify;
pub use verify::{EtherscanConfig, EtherscanVerifier, VerificationReport, Verifier};

pub mod setup;
pub use setup::{AttemptResult, FallbackPolicy, Multicall3, SetupExecutor};

pub mod plan;
pub use plan::{DeploymentPlan, PlanRunner, RunReport};

pub mod config;
pub use config::StackConfig;
