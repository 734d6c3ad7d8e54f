use alloy::contract;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::{RpcError, TransportError};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

use crate::events::IERC20;
use crate::sources::Erc20Reader;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timeout after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// The node answered but the call reverted or returned undecodable data.
    #[error("call rejected: {0}")]
    Rejected(String),
}

impl ChainError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Transport(_) | ChainError::Timeout(_))
    }
}

impl From<TransportError> for ChainError {
    fn from(error: TransportError) -> Self {
        match error {
            RpcError::Transport(kind) => ChainError::Transport(kind.to_string()),
            other => ChainError::Rejected(other.to_string()),
        }
    }
}

impl From<contract::Error> for ChainError {
    fn from(error: contract::Error) -> Self {
        match error {
            contract::Error::TransportError(inner) => inner.into(),
            other => ChainError::Rejected(other.to_string()),
        }
    }
}

/// Chain RPC handle shared by every concurrent task. Cloning is cheap.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], request_timeout: Duration, max_retries: usize) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            providers.push(ProviderBuilder::new().connect_http(parsed_url).erased());
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries,
            request_timeout,
        })
    }

    fn get_provider(&self) -> DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        self.providers[index].clone()
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error: &ChainError) {
        warn!(
            "RPC error on {}: {}, rotating provider",
            self.get_current_url(),
            error
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> ChainError {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            self.request_timeout.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        ChainError::Timeout(self.request_timeout)
    }

    /// Runs `request` against the current provider with timeout and retry.
    /// Only transport failures and timeouts are retried.
    pub(crate) async fn execute<T, E, F, Fut>(&self, request: F) -> Result<T, ChainError>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ChainError>,
    {
        RetryIf::spawn(
            self.get_retry_strategy(),
            || {
                let attempt = request(self.get_provider());
                async move {
                    match timeout(self.request_timeout, attempt).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => {
                            let error: ChainError = e.into();
                            if error.is_retryable() {
                                self.handle_error(&error);
                            }
                            Err(error)
                        }
                        Err(_) => Err(self.handle_timeout()),
                    }
                }
            },
            ChainError::is_retryable,
        )
        .await
    }

    /// Fetches every log matching `filter` in a single request.
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        self.execute(|provider| {
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await }
        })
        .await
    }
}

#[async_trait]
impl Erc20Reader for RpcClient {
    async fn symbol(&self, token: Address) -> Result<String, ChainError> {
        self.execute(move |provider| async move {
            IERC20::new(token, provider).symbol().call().await
        })
        .await
    }

    async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        self.execute(move |provider| async move {
            IERC20::new(token, provider).decimals().call().await
        })
        .await
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ChainError> {
        self.execute(move |provider| async move {
            IERC20::new(token, provider).totalSupply().call().await
        })
        .await
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.execute(move |provider| async move {
            IERC20::new(token, provider).balanceOf(owner).call().await
        })
        .await
    }
}
