//! Core data model: deployable units, their resolved outcomes and setup calls.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256, keccak256},
};
use serde::{Deserialize, Serialize};

/// A fully resolved constructor or call argument.
///
/// Has no "pending" variant: a unit can only be built once every dependency
/// address is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ConstructorArg {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Word(B256),
    Array(Vec<ConstructorArg>),
}

impl ConstructorArg {
    /// Convert into a dynamic Solidity value for ABI encoding.
    pub fn to_sol_value(&self) -> DynSolValue {
        match self {
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Uint(value) => DynSolValue::Uint(*value, 256),
            Self::Bool(value) => DynSolValue::Bool(*value),
            Self::String(value) => DynSolValue::String(value.clone()),
            Self::Bytes(value) => DynSolValue::Bytes(value.to_vec()),
            Self::Word(value) => DynSolValue::FixedBytes(*value, 32),
            Self::Array(values) => {
                DynSolValue::Array(values.iter().map(Self::to_sol_value).collect())
            }
        }
    }

    /// The address carried by this argument, if any.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl From<Address> for ConstructorArg {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<U256> for ConstructorArg {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for ConstructorArg {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<bool> for ConstructorArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ConstructorArg {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// ABI-encode a sequence of arguments as function/constructor parameters.
pub fn encode_args(args: &[ConstructorArg]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(ConstructorArg::to_sol_value).collect()).abi_encode_params()
}

/// Calldata for `signature` (e.g. `setOwner(address)`) applied to `args`.
pub fn encode_call(signature: &str, args: &[ConstructorArg]) -> Bytes {
    let selector = keccak256(signature.as_bytes());
    let mut data = selector[..4].to_vec();
    data.extend(encode_args(args));
    data.into()
}

/// Handle to compiled code for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReference {
    /// Contract (artifact) name.
    pub name: String,
    /// Creation bytecode.
    pub bytecode: Bytes,
    /// Contract ABI as emitted by the compiler.
    #[serde(default)]
    pub abi: serde_json::Value,
    /// Fully qualified source reference, e.g. `contracts/YieldBox.sol:YieldBox`.
    pub source_ref: String,
    /// Compiler version used to build the artifact, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    /// Solidity standard JSON input, when the artifact source provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_json_input: Option<serde_json::Value>,
}

impl CodeReference {
    /// Build a code reference from raw bytecode with no ABI or compiler metadata.
    pub fn from_bytecode(name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        let name = name.into();
        Self {
            source_ref: format!("{name}.sol:{name}"),
            name,
            bytecode: bytecode.into(),
            abi: serde_json::Value::Null,
            compiler_version: None,
            standard_json_input: None,
        }
    }

    /// Creation payload: bytecode followed by the encoded constructor arguments.
    pub fn creation_payload(&self, args: &[ConstructorArg]) -> Bytes {
        let mut payload = self.bytecode.to_vec();
        payload.extend(encode_args(args));
        payload.into()
    }
}

/// One component waiting to be deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentUnit {
    pub name: String,
    pub constructor_args: Vec<ConstructorArg>,
    pub code: CodeReference,
    /// Minimum confirmation depth for this unit, always at least 1.
    pub confirmations_required: u64,
}

impl DeploymentUnit {
    pub fn new(
        name: impl Into<String>,
        code: CodeReference,
        constructor_args: Vec<ConstructorArg>,
        confirmations_required: u64,
    ) -> Self {
        Self {
            name: name.into(),
            constructor_args,
            code,
            confirmations_required: confirmations_required.max(1),
        }
    }
}

/// Outcome of executing a [`DeploymentUnit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDeployment {
    pub name: String,
    pub address: Address,
    pub transaction_hash: B256,
    #[serde(rename = "args", default)]
    pub constructor_args: Vec<ConstructorArg>,
    /// Artifact the deployment was built from.
    #[serde(default)]
    pub artifact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// A single post-deployment configuration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupCall {
    pub target: Address,
    pub payload: Bytes,
}

impl SetupCall {
    pub fn new(target: Address, payload: impl Into<Bytes>) -> Self {
        Self {
            target,
            payload: payload.into(),
        }
    }
}

/// Address and hash returned by a deployment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub transaction_hash: B256,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    pub success: bool,
}
