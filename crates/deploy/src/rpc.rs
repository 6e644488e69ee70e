//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level attempts before a request is reported as failed.
const MAX_TRANSPORT_RETRIES: usize = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Connection failures are retried with exponential backoff. Timeouts are
/// retried only for [read-only](is_read_only) methods, since the node may have
/// accepted a timed out `eth_sendTransaction`. An error object in the response
/// is returned as-is, never retried.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });

    let response = (|| async { client.post(url).json(&body).send().await })
        .retry(ExponentialBuilder::default().with_max_times(MAX_TRANSPORT_RETRIES))
        .when(|e: &reqwest::Error| is_retryable(method, e))
        .notify(|e: &reqwest::Error, delay: Duration| {
            tracing::debug!(error = %e, method, ?delay, "RPC transport error, retrying...");
        })
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Whether a method only reads chain state and can be repeated freely.
pub fn is_read_only(method: &str) -> bool {
    !matches!(
        method,
        "eth_sendTransaction" | "eth_sendRawTransaction" | "eth_sendRawTransactionSync"
    )
}

fn is_retryable(method: &str, error: &reqwest::Error) -> bool {
    error.is_connect() || (error.is_timeout() && is_read_only(method))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Parse a `0x`-prefixed quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}
