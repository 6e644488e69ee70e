//! Source verification of deployed contracts.

mod etherscan;

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::Result;

pub use etherscan::{EtherscanConfig, EtherscanVerifier};

use crate::{CodeReference, ConstructorArg, ResolvedDeployment, types::encode_args};

/// Everything a verifier needs to match a deployment against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub name: String,
    pub address: Address,
    /// `path/to/Source.sol:ContractName`.
    pub source_ref: String,
    pub compiler_version: Option<String>,
    pub standard_json_input: Option<serde_json::Value>,
    pub constructor_args: Vec<ConstructorArg>,
}

impl VerificationRequest {
    pub fn new(deployment: &ResolvedDeployment, code: &CodeReference) -> Self {
        Self {
            name: deployment.name.clone(),
            address: deployment.address,
            source_ref: code.source_ref.clone(),
            compiler_version: code.compiler_version.clone(),
            standard_json_input: code.standard_json_input.clone(),
            constructor_args: deployment.constructor_args.clone(),
        }
    }

    /// ABI-encoded constructor arguments as unprefixed hex.
    pub fn encoded_constructor_args(&self) -> String {
        hex::encode(encode_args(&self.constructor_args))
    }
}

/// External verification service.
pub trait Verifier: Send + Sync {
    fn submit(&self, request: &VerificationRequest) -> impl Future<Output = Result<()>> + Send;
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub verified: Vec<String>,
    /// Name and error message of every failed submission.
    pub failed: Vec<(String, String)>,
}

impl VerificationReport {
    pub fn all_verified(&self) -> bool {
        self.failed.is_empty()
    }
}
