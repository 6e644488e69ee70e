//! Chain client interface consumed by the execution engine and setup executor.

mod json_rpc;

use std::{future::Future, sync::Arc};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;

pub use json_rpc::RpcChainClient;

use crate::{CodeReference, ConstructorArg, DeployedContract, TransactionReceipt};

/// Low-level access to the target chain.
///
/// Every method is a suspension point: callers wait for the network round-trip
/// before moving on.
pub trait ChainClient: Send + Sync {
    /// Submit a deployment transaction for `code` with `args`.
    fn deploy(
        &self,
        code: &CodeReference,
        args: &[ConstructorArg],
    ) -> impl Future<Output = Result<DeployedContract>> + Send;

    /// Block until `transaction_hash` has `confirmations` confirmations.
    ///
    /// There is no timeout: if the chain never reaches the depth, this never
    /// returns. A reverted transaction is an error.
    fn wait_confirmations(
        &self,
        transaction_hash: B256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;

    /// Submit a plain call transaction.
    fn send_transaction(
        &self,
        target: Address,
        payload: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// The sending account, used by plans that pass the signer as an argument.
    fn sender(&self) -> Address;
}

impl<T: ChainClient> ChainClient for Arc<T> {
    fn deploy(
        &self,
        code: &CodeReference,
        args: &[ConstructorArg],
    ) -> impl Future<Output = Result<DeployedContract>> + Send {
        (**self).deploy(code, args)
    }

    fn wait_confirmations(
        &self,
        transaction_hash: B256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send {
        (**self).wait_confirmations(transaction_hash, confirmations)
    }

    fn send_transaction(
        &self,
        target: Address,
        payload: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send {
        (**self).send_transaction(target, payload)
    }

    fn sender(&self) -> Address {
        (**self).sender()
    }
}
