use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ETHPLORER_API_URL: &str = "https://api.ethplorer.io";
const DEFAULT_ETHPLORER_API_KEY: &str = "freekey";
const DEFAULT_TOKEN_LIST_URL: &str =
    "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets";

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub ethplorer_api_url: String,
    pub ethplorer_api_key: String,
    pub token_list_url: String,
    pub token_registry_address: Option<Address>,
    pub discovery_concurrency: usize,
    pub approval_from_block: u64,
    pub rpc_request_timeout: Duration,
    pub rpc_max_retries: usize,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls = std::env::var("JSON_RPC_URLS")
            .or_else(|_| std::env::var("JSON_RPC_URL"))
            .map(|raw| parse_url_list(&raw))
            .context("JSON_RPC_URLS (or JSON_RPC_URL) must be set in .env")?;
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS does not contain any URL");
        }

        let token_registry_address = std::env::var("TOKEN_REGISTRY_ADDRESS")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| Address::from_str(raw.trim()))
            .transpose()
            .context("Invalid TOKEN_REGISTRY_ADDRESS format")?;

        Ok(Config {
            json_rpc_urls,
            ethplorer_api_url: env_or("ETHPLORER_API_URL", DEFAULT_ETHPLORER_API_URL),
            ethplorer_api_key: env_or("ETHPLORER_API_KEY", DEFAULT_ETHPLORER_API_KEY),
            token_list_url: env_or("TOKEN_LIST_URL", DEFAULT_TOKEN_LIST_URL),
            token_registry_address,
            discovery_concurrency: env_parse("DISCOVERY_CONCURRENCY", 16)?,
            approval_from_block: env_parse("APPROVAL_FROM_BLOCK", 0)?,
            rpc_request_timeout: Duration::from_secs(env_parse("RPC_REQUEST_TIMEOUT_SECS", 120)?),
            rpc_max_retries: env_parse("RPC_MAX_RETRIES", 5)?,
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

/// Splits a comma separated URL list, dropping blanks.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        Err(_) => Ok(default),
    }
}
