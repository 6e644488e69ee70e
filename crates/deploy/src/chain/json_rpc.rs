//! [`ChainClient`] over Ethereum JSON-RPC with an unlocked sender account.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::ChainClient;
use crate::{
    CodeReference, ConstructorArg, DeployedContract, TransactionReceipt, VmError,
    rpc::{self, deserialize_u64_from_hex},
};

/// Default interval between receipt and block polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive polls without a new block before a stall warning is logged.
const STALL_WARN_POLLS: u32 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    contract_address: Option<Address>,
    status: Option<String>,
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            // Receipts without a status field predate Byzantium and carry no failure signal.
            success: receipt.status.as_deref().is_none_or(|status| status == "0x1"),
        }
    }
}

/// Chain client sending `eth_sendTransaction` from an account the node has unlocked
/// (Anvil, Hardhat node, or a signing proxy).
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    from: Address,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn new(url: Url, from: Address) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_TIMEOUT)?,
            url,
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        let id: String = self.call("eth_chainId", vec![]).await?;
        rpc::parse_hex_u64(&id).context("Invalid eth_chainId response")
    }

    /// Current head block number.
    pub async fn block_number(&self) -> Result<u64> {
        let number: String = self.call("eth_blockNumber", vec![]).await?;
        rpc::parse_hex_u64(&number).context("Invalid eth_blockNumber response")
    }

    async fn receipt(&self, transaction_hash: B256) -> Result<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .call(
                "eth_getTransactionReceipt",
                vec![serde_json::json!(transaction_hash)],
            )
            .await?;
        Ok(receipt.map(Into::into))
    }

    async fn send(&self, to: Option<Address>, data: Bytes) -> Result<B256> {
        let mut tx = serde_json::json!({
            "from": self.from,
            "data": data,
        });
        if let Some(to) = to {
            tx["to"] = serde_json::json!(to);
        }

        self.call("eth_sendTransaction", vec![tx]).await
    }

    /// Poll until the transaction is mined. Unbounded.
    async fn wait_for_receipt(&self, transaction_hash: B256) -> Result<TransactionReceipt> {
        let mut polls = 0u32;
        loop {
            if let Some(receipt) = self.receipt(transaction_hash).await? {
                return Ok(receipt);
            }

            polls += 1;
            if polls % STALL_WARN_POLLS == 0 {
                tracing::warn!(
                    tx_hash = %transaction_hash,
                    waited = ?self.poll_interval * polls,
                    "Transaction still not mined, continuing to wait"
                );
            } else {
                tracing::trace!(tx_hash = %transaction_hash, "Receipt not available yet");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl ChainClient for RpcChainClient {
    async fn deploy(
        &self,
        code: &CodeReference,
        args: &[ConstructorArg],
    ) -> Result<DeployedContract> {
        let transaction_hash = self
            .send(None, code.creation_payload(args))
            .await
            .with_context(|| format!("Failed to submit deployment of {}", code.name))?;

        tracing::debug!(contract = %code.name, tx_hash = %transaction_hash, "Deployment transaction sent");

        let receipt = self.wait_for_receipt(transaction_hash).await?;
        if !receipt.success {
            return Err(VmError::TransactionReverted {
                hash: transaction_hash,
            }
            .into());
        }

        let address = receipt
            .contract_address
            .context("Deployment receipt has no contract address")?;

        Ok(DeployedContract {
            address,
            transaction_hash,
        })
    }

    async fn wait_confirmations(
        &self,
        transaction_hash: B256,
        confirmations: u64,
    ) -> Result<TransactionReceipt> {
        let confirmations = confirmations.max(1);
        let mut last_head = None;
        let mut stalled_polls = 0u32;

        loop {
            let receipt = self.wait_for_receipt(transaction_hash).await?;
            if !receipt.success {
                return Err(VmError::TransactionReverted {
                    hash: transaction_hash,
                }
                .into());
            }

            let head = self.block_number().await?;
            let depth = head.saturating_sub(receipt.block_number) + 1;
            if depth >= confirmations {
                // The receipt may have moved to another block during a reorg.
                if let Some(current) = self.receipt(transaction_hash).await? {
                    if current.block_number == receipt.block_number {
                        tracing::debug!(tx_hash = %transaction_hash, block = receipt.block_number, depth, "Transaction confirmed");
                        return Ok(current);
                    }
                }
                tracing::debug!(tx_hash = %transaction_hash, "Receipt changed block, waiting again");
            } else if last_head == Some(head) {
                stalled_polls += 1;
                if stalled_polls % STALL_WARN_POLLS == 0 {
                    tracing::warn!(
                        tx_hash = %transaction_hash,
                        head,
                        depth,
                        confirmations,
                        "No new blocks observed while waiting for confirmations"
                    );
                }
            } else {
                stalled_polls = 0;
                tracing::trace!(tx_hash = %transaction_hash, head, depth, confirmations, "Waiting for confirmations");
            }
            last_head = Some(head);

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn send_transaction(&self, target: Address, payload: Bytes) -> Result<B256> {
        self.send(Some(target), payload)
            .await
            .with_context(|| format!("Failed to send transaction to {target}"))
    }

    fn sender(&self) -> Address {
        self.from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_status_mapping() {
        let json = serde_json::json!({
            "transactionHash": B256::repeat_byte(1),
            "blockNumber": "0x2a",
            "contractAddress": Address::repeat_byte(2),
            "status": "0x1"
        });
        let receipt: TransactionReceipt =
            serde_json::from_value::<RpcReceipt>(json).unwrap().into();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 42);
        assert_eq!(receipt.contract_address, Some(Address::repeat_byte(2)));

        let json = serde_json::json!({
            "transactionHash": B256::repeat_byte(1),
            "blockNumber": "0x2a",
            "contractAddress": null,
            "status": "0x0"
        });
        let receipt: TransactionReceipt =
            serde_json::from_value::<RpcReceipt>(json).unwrap().into();
        assert!(!receipt.success);
        assert!(receipt.contract_address.is_none());
    }
}
