//! Balance indexer backed by the Ethplorer `getAddressInfo` endpoint.

use alloy_primitives::Address;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::models::BalanceEntry;
use crate::sources::BalanceIndexer;

#[derive(Debug, Deserialize)]
struct AddressInfoResponse {
    #[serde(default)]
    tokens: Option<Vec<TokenHolding>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TokenHolding {
    #[serde(rename = "tokenInfo")]
    token_info: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone)]
pub struct EthplorerClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl EthplorerClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Ethplorer HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn address_info_url(&self, owner: Address) -> String {
        format!("{}/getAddressInfo/{owner:?}", self.base_url)
    }
}

#[async_trait]
impl BalanceIndexer for EthplorerClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn token_balances(&self, owner: Address) -> Result<Vec<BalanceEntry>> {
        let response = self
            .http
            .get(self.address_info_url(owner))
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .context("Ethplorer request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Unexpected Ethplorer status code: {status}, body: {body}");
        }

        let body = response
            .text()
            .await
            .context("Failed to read Ethplorer response")?;
        let entries = parse_address_info(&body)?;

        info!("Ethplorer reported {} tokens for {}", entries.len(), owner);
        Ok(entries)
    }
}

fn parse_address_info(body: &str) -> Result<Vec<BalanceEntry>> {
    let response: AddressInfoResponse =
        serde_json::from_str(body).context("Malformed Ethplorer response")?;

    if let Some(error) = response.error {
        bail!("Ethplorer error {}: {}", error.code, error.message);
    }

    Ok(response
        .tokens
        .unwrap_or_default()
        .into_iter()
        .map(|holding| BalanceEntry {
            contract_address: holding.token_info.address,
            symbol: holding.token_info.symbol,
        })
        .collect())
}
