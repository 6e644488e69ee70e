//! Post-deployment setup: configuration calls between deployed components.
//!
//! Calls are first attempted as one atomic aggregated transaction. If that
//! fails for any reason, every call is sent as its own transaction, in order,
//! giving up atomicity so that calls which can succeed on their own still do.

mod multicall;

use std::future::Future;

use alloy_core::primitives::B256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use multicall::{MULTICALL3_ADDRESS, Multicall3, encode_aggregate3};

use crate::{ChainClient, ResolvedDeployment, SetupCall, VmError};

/// Submits a batch of calls atomically.
pub trait Aggregator: Send + Sync {
    /// Returns the hash of the aggregated transaction. The transaction reverts
    /// as a whole when any inner call fails.
    fn aggregate(&self, calls: &[SetupCall]) -> impl Future<Output = Result<B256>> + Send;
}

/// Produces setup calls from the resolved deployments of a run.
pub trait SetupBuilder: Send + Sync {
    fn build(&self, deployments: &[ResolvedDeployment]) -> Result<Vec<SetupCall>>;
}

impl<F> SetupBuilder for F
where
    F: Fn(&[ResolvedDeployment]) -> Result<Vec<SetupCall>> + Send + Sync,
{
    fn build(&self, deployments: &[ResolvedDeployment]) -> Result<Vec<SetupCall>> {
        self(deployments)
    }
}

/// What to do when a call fails in the sequential fallback.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Stop at the first failing call and return its error.
    #[default]
    FailFast,
    /// Record the failing call and go on with the rest.
    SkipAndContinue,
}

/// A call the sequential fallback gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCall {
    pub index: usize,
    pub call: SetupCall,
    pub error: String,
}

/// How the setup calls were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// There was nothing to do; no transaction was sent.
    NoCalls,
    /// All calls went through in one aggregated transaction.
    Aggregated(B256),
    /// The aggregated attempt failed and calls were sent one by one.
    Degraded {
        tx_hashes: Vec<B256>,
        skipped: Vec<SkippedCall>,
    },
}

impl AttemptResult {
    /// Number of transactions this attempt ended up confirming.
    pub fn transaction_count(&self) -> usize {
        match self {
            Self::NoCalls => 0,
            Self::Aggregated(_) => 1,
            Self::Degraded { tx_hashes, .. } => tx_hashes.len(),
        }
    }
}

/// Runs setup calls with the aggregated-then-sequential policy.
pub struct SetupExecutor<'a, C, A> {
    client: &'a C,
    aggregator: A,
    policy: FallbackPolicy,
}

impl<'a, C: ChainClient, A: Aggregator> SetupExecutor<'a, C, A> {
    pub fn new(client: &'a C, aggregator: A) -> Self {
        Self {
            client,
            aggregator,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the calls from every builder, then execute them.
    pub async fn run_builders(
        &self,
        deployments: &[ResolvedDeployment],
        builders: &[&dyn SetupBuilder],
    ) -> Result<AttemptResult> {
        let mut calls = Vec::new();
        for builder in builders {
            calls.extend(builder.build(deployments)?);
        }
        self.run(&calls).await
    }

    /// Execute `calls`: one aggregated transaction, or on failure one
    /// transaction per call in input order.
    pub async fn run(&self, calls: &[SetupCall]) -> Result<AttemptResult> {
        tracing::info!(calls = calls.len(), "After deployment setup calls");
        if calls.is_empty() {
            return Ok(AttemptResult::NoCalls);
        }

        match self.try_aggregated(calls).await {
            Ok(tx_hash) => {
                tracing::info!(tx_hash = %tx_hash, "After deployment setup multicall confirmed");
                return Ok(AttemptResult::Aggregated(tx_hash));
            }
            Err(e) => {
                tracing::warn!(
                    error = %format!("{e:#}"),
                    policy = %self.policy,
                    "Aggregated setup failed, sending calls one by one"
                );
            }
        }

        self.run_sequential(calls).await
    }

    async fn try_aggregated(&self, calls: &[SetupCall]) -> Result<B256> {
        let tx_hash = self
            .aggregator
            .aggregate(calls)
            .await
            .context("Failed to submit aggregated setup transaction")?;
        self.client
            .wait_confirmations(tx_hash, 1)
            .await
            .context("Aggregated setup transaction failed")?;
        Ok(tx_hash)
    }

    async fn run_sequential(&self, calls: &[SetupCall]) -> Result<AttemptResult> {
        let mut tx_hashes = Vec::with_capacity(calls.len());
        let mut skipped = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            match self.send_one(call).await {
                Ok(tx_hash) => {
                    tracing::info!(index, target = %call.target, tx_hash = %tx_hash, "Setup call confirmed");
                    tx_hashes.push(tx_hash);
                }
                Err(e) => match self.policy {
                    FallbackPolicy::FailFast => {
                        return Err(e.context(VmError::SetupCallFailed {
                            index,
                            target: call.target,
                        }));
                    }
                    FallbackPolicy::SkipAndContinue => {
                        tracing::warn!(index, target = %call.target, error = %format!("{e:#}"), "Setup call failed, skipping");
                        skipped.push(SkippedCall {
                            index,
                            call: call.clone(),
                            error: format!("{e:#}"),
                        });
                    }
                },
            }
        }

        Ok(AttemptResult::Degraded { tx_hashes, skipped })
    }

    async fn send_one(&self, call: &SetupCall) -> Result<B256> {
        let tx_hash = self
            .client
            .send_transaction(call.target, call.payload.clone())
            .await?;
        self.client.wait_confirmations(tx_hash, 1).await?;
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Address;
    use std::str::FromStr;

    #[test]
    fn test_fallback_policy_parse() {
        assert_eq!(
            FallbackPolicy::from_str("skip-and-continue").unwrap(),
            FallbackPolicy::SkipAndContinue
        );
        assert_eq!(FallbackPolicy::default(), FallbackPolicy::FailFast);
        assert_eq!(FallbackPolicy::FailFast.to_string(), "fail-fast");
    }

    #[test]
    fn test_closure_setup_builder() {
        let builder = |deployments: &[ResolvedDeployment]| -> Result<Vec<SetupCall>> {
            Ok(deployments
                .iter()
                .map(|d| SetupCall::new(d.address, vec![0x01]))
                .collect())
        };

        let deployments = vec![ResolvedDeployment {
            name: "A".to_string(),
            address: Address::repeat_byte(1),
            transaction_hash: B256::ZERO,
            constructor_args: vec![],
            artifact: "A".to_string(),
            block_number: None,
        }];

        let calls = builder.build(&deployments).unwrap();
        assert_eq!(calls, vec![SetupCall::new(Address::repeat_byte(1), vec![0x01])]);
    }

    #[test]
    fn test_transaction_count() {
        assert_eq!(AttemptResult::NoCalls.transaction_count(), 0);
        assert_eq!(AttemptResult::Aggregated(B256::ZERO).transaction_count(), 1);
        assert_eq!(
            AttemptResult::Degraded {
                tx_hashes: vec![B256::ZERO, B256::ZERO],
                skipped: vec![],
            }
            .transaction_count(),
            2
        );
    }
}
