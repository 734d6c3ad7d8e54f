use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::events::ITokenRegistry;
use crate::rpc::RpcClient;

/// Curated-registry membership for a token contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryChecker: Send + Sync {
    async fn is_registered(&self, token: Address) -> Result<bool>;
}

/// On-chain token registry exposing `getTokenMetaData(address)`. Unlisted
/// tokens come back as an all-zero entry.
pub struct TokenRegistry {
    client: RpcClient,
    address: Address,
}

impl TokenRegistry {
    pub fn new(client: RpcClient, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl RegistryChecker for TokenRegistry {
    async fn is_registered(&self, token: Address) -> Result<bool> {
        let registry = self.address;
        let entry = self
            .client
            .execute(move |provider| async move {
                ITokenRegistry::new(registry, provider)
                    .getTokenMetaData(token)
                    .call()
                    .await
            })
            .await
            .with_context(|| format!("Registry lookup failed for {token}"))?;

        Ok(is_listed_entry(token, entry.tokenAddress))
    }
}

fn is_listed_entry(token: Address, listed_address: Address) -> bool {
    !listed_address.is_zero() && listed_address == token
}

/// Used when no registry contract is configured.
pub struct UnlistedRegistry;

#[async_trait]
impl RegistryChecker for UnlistedRegistry {
    async fn is_registered(&self, _token: Address) -> Result<bool> {
        Ok(false)
    }
}
