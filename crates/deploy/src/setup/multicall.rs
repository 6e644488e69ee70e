use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, address, keccak256},
};
use anyhow::{Context, Result};

use super::Aggregator;
use crate::{ChainClient, SetupCall};

/// Canonical Multicall3 deployment, present at the same address on most chains.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

const AGGREGATE3_SIGNATURE: &str = "aggregate3((address,bool,bytes)[])";

/// Calldata for `aggregate3` with every call marked as not allowed to fail,
/// so any failing inner call reverts the whole batch.
pub fn encode_aggregate3(calls: &[SetupCall]) -> Bytes {
    let entries = calls
        .iter()
        .map(|call| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(call.target),
                DynSolValue::Bool(false),
                DynSolValue::Bytes(call.payload.to_vec()),
            ])
        })
        .collect();

    let selector = keccak256(AGGREGATE3_SIGNATURE.as_bytes());
    let mut data = selector[..4].to_vec();
    data.extend(DynSolValue::Tuple(vec![DynSolValue::Array(entries)]).abi_encode_params());
    data.into()
}

/// [`Aggregator`] backed by a Multicall3 contract.
pub struct Multicall3<'a, C> {
    client: &'a C,
    address: Address,
}

impl<'a, C: ChainClient> Multicall3<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            address: MULTICALL3_ADDRESS,
        }
    }

    /// Use a Multicall3 deployed somewhere other than the canonical address.
    pub fn at(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl<C: ChainClient> Aggregator for Multicall3<'_, C> {
    async fn aggregate(&self, calls: &[SetupCall]) -> Result<B256> {
        tracing::debug!(multicall = %self.address, calls = calls.len(), "Submitting aggregate3");
        self.client
            .send_transaction(self.address, encode_aggregate3(calls))
            .await
            .context("Failed to send aggregate3 transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate3_selector() {
        let data = encode_aggregate3(&[]);
        assert_eq!(&data[..4], &[0x82, 0xad, 0x56, 0xcb]);
        // offset to the array, then an empty length word
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_aggregate3_disallows_failure() {
        let call = SetupCall::new(Address::repeat_byte(0x22), vec![0xde, 0xad]);
        let data = encode_aggregate3(&[call]);

        // selector | array offset | length | tuple offset | target | allowFailure | ...
        let word = |index: usize| &data[4 + index * 32..4 + (index + 1) * 32];
        assert_eq!(word(1)[31], 1);
        assert_eq!(&word(3)[12..], Address::repeat_byte(0x22).as_slice());
        assert_eq!(word(4), &[0u8; 32]);
    }
}
