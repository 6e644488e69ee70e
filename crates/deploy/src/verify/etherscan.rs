//! Etherscan-compatible verification API client.

use std::time::Duration;

use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{VerificationRequest, Verifier};
use crate::rpc;

/// Verification API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtherscanConfig {
    /// API endpoint, e.g. `https://api.etherscan.io/api`.
    pub api_url: Url,
    pub api_key: String,
    /// Seconds between status checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Status checks before a submission is reported as unconfirmed.
    #[serde(default = "default_max_status_polls")]
    pub max_status_polls: usize,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_status_polls() -> usize {
    24
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

#[derive(Debug, Display, Error)]
#[display("verification still pending")]
struct StillPending;

/// Submits `verifysourcecode` requests and polls `checkverifystatus`.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    config: EtherscanConfig,
    client: reqwest::Client,
}

impl EtherscanVerifier {
    pub fn new(config: EtherscanConfig) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_TIMEOUT)?,
            config,
        })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<EtherscanResponse> {
        let response = self
            .client
            .post(self.config.api_url.clone())
            .form(form)
            .send()
            .await
            .context("Failed to reach verification API")?;

        if !response.status().is_success() {
            anyhow::bail!("Verification API request failed: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse verification API response")
    }

    async fn check_status(&self, guid: &str) -> Result<()> {
        let response = self
            .post(&[
                ("apikey", self.config.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .await?;

        if response.result.contains("Pending") {
            return Err(StillPending.into());
        }
        if response.status == "1" || response.result.contains("Already Verified") {
            return Ok(());
        }
        anyhow::bail!("Verification rejected: {}", response.result)
    }
}

impl Verifier for EtherscanVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<()> {
        let standard_json = request
            .standard_json_input
            .as_ref()
            .context("No standard JSON input available for this artifact")?;
        let compiler_version = request
            .compiler_version
            .as_deref()
            .context("Compiler version unknown for this artifact")?;

        let source_code = serde_json::to_string(standard_json)
            .context("Failed to serialize standard JSON input")?;
        let address = request.address.to_string();
        let compiler_version = format!("v{}", compiler_version.trim_start_matches('v'));
        let constructor_args = request.encoded_constructor_args();

        let response = self
            .post(&[
                ("apikey", self.config.api_key.as_str()),
                ("module", "contract"),
                ("action", "verifysourcecode"),
                ("contractaddress", address.as_str()),
                ("sourceCode", source_code.as_str()),
                ("codeformat", "solidity-standard-json-input"),
                ("contractname", request.source_ref.as_str()),
                ("compilerversion", compiler_version.as_str()),
                // Misspelling is part of the Etherscan API.
                ("constructorArguements", constructor_args.as_str()),
            ])
            .await?;

        if response.status != "1" {
            if response.result.contains("already verified") {
                tracing::debug!(name = %request.name, "Contract already verified");
                return Ok(());
            }
            anyhow::bail!("{}: {}", response.message, response.result);
        }

        let guid = response.result;
        tracing::debug!(name = %request.name, guid = %guid, "Verification submitted");

        (|| async { self.check_status(&guid).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_secs(self.config.poll_interval_secs))
                    .with_max_times(self.config.max_status_polls),
            )
            .when(|e: &anyhow::Error| e.is::<StillPending>())
            .await
    }
}
