//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

pub mod http;

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use stackvm_deploy::{
    ChainClient, CodeReference, ConstructorArg, DeployedContract, TransactionReceipt, VmError,
    verify::{VerificationRequest, Verifier},
};

/// Account the fake chain sends from.
pub const SENDER: Address = Address::repeat_byte(0x5e);

/// A deployment the fake chain received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRecord {
    pub artifact: String,
    pub args: Vec<ConstructorArg>,
    pub address: Address,
}

#[derive(Debug, Default)]
struct ChainState {
    nonce: u8,
    block: u64,
    deploys: Vec<DeployRecord>,
    sends: Vec<(Address, Bytes)>,
    waits: Vec<(B256, u64)>,
    reverted: HashSet<B256>,
    created: HashMap<B256, Address>,
}

/// Chain that mines every transaction instantly and records what it was sent.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    rejected_artifacts: Mutex<HashSet<String>>,
    reverting_targets: Mutex<HashSet<Address>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to deploy the named artifact.
    pub fn reject_artifact(&self, artifact: &str) {
        self.rejected_artifacts.lock().unwrap().insert(artifact.to_string());
    }

    /// Mine calls to `target` with a failed status.
    pub fn revert_calls_to(&self, target: Address) {
        self.reverting_targets.lock().unwrap().insert(target);
    }

    pub fn deploys(&self) -> Vec<DeployRecord> {
        self.state.lock().unwrap().deploys.clone()
    }

    pub fn deployed_artifacts(&self) -> Vec<String> {
        self.deploys().into_iter().map(|record| record.artifact).collect()
    }

    pub fn sends(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().sends.clone()
    }

    pub fn send_targets(&self) -> Vec<Address> {
        self.sends().into_iter().map(|(target, _)| target).collect()
    }

    /// Every `(transaction, depth)` pair the chain was asked to wait for.
    pub fn waits(&self) -> Vec<(B256, u64)> {
        self.state.lock().unwrap().waits.clone()
    }

    fn next_hash(state: &mut ChainState) -> B256 {
        state.nonce += 1;
        B256::with_last_byte(state.nonce)
    }
}

impl ChainClient for MockChain {
    async fn deploy(
        &self,
        code: &CodeReference,
        args: &[ConstructorArg],
    ) -> Result<DeployedContract> {
        if self.rejected_artifacts.lock().unwrap().contains(&code.name) {
            anyhow::bail!("deployment of {} rejected by node", code.name);
        }

        let mut state = self.state.lock().unwrap();
        let transaction_hash = Self::next_hash(&mut state);
        let address = Address::with_last_byte(state.nonce);
        state.created.insert(transaction_hash, address);
        state.deploys.push(DeployRecord {
            artifact: code.name.clone(),
            args: args.to_vec(),
            address,
        });

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
        let mut state = self.state.lock().unwrap();
        state.waits.push((transaction_hash, confirmations));
        state.block += 1;

        if state.reverted.contains(&transaction_hash) {
            return Err(VmError::TransactionReverted {
                hash: transaction_hash,
            }
            .into());
        }

        Ok(TransactionReceipt {
            transaction_hash,
            block_number: state.block,
            contract_address: state.created.get(&transaction_hash).copied(),
            success: true,
        })
    }

    async fn send_transaction(&self, target: Address, payload: Bytes) -> Result<B256> {
        let reverts = self.reverting_targets.lock().unwrap().contains(&target);

        let mut state = self.state.lock().unwrap();
        let transaction_hash = Self::next_hash(&mut state);
        state.sends.push((target, payload));
        if reverts {
            state.reverted.insert(transaction_hash);
        }
        Ok(transaction_hash)
    }

    fn sender(&self) -> Address {
        SENDER
    }
}

/// Verifier that records submissions and fails for chosen names.
#[derive(Debug, Default)]
pub struct RecordingVerifier {
    failing: HashSet<String>,
    submitted: Mutex<Vec<VerificationRequest>>,
}

impl RecordingVerifier {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|name| name.to_string()).collect(),
            submitted: Mutex::default(),
        }
    }

    pub fn submitted(&self) -> Vec<VerificationRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

impl Verifier for RecordingVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<()> {
        self.submitted.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.name) {
            anyhow::bail!("explorer rejected {}", request.name);
        }
        Ok(())
    }
}

/// Artifact set with one trivial contract per name.
pub fn artifacts(names: &[&str]) -> HashMap<String, CodeReference> {
    names
        .iter()
        .map(|name| {
            let code = CodeReference::from_bytecode(*name, vec![0x60, 0x80, 0x60, 0x40]);
            (name.to_string(), code)
        })
        .collect()
}

pub fn code(name: &str) -> CodeReference {
    CodeReference::from_bytecode(name, vec![0x60, 0x80, 0x60, 0x40])
}
