//! Metadata resolution for one candidate contract.
//!
//! Supply and balance always come from the contract. Symbol and decimals come
//! from the community token list when it knows the token, otherwise from the
//! contract itself.

use alloy_primitives::Address;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::models::{ContractRef, TokenMetadata};
use crate::rpc::ChainError;
use crate::sources::{ListedToken, TokenList};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("supply or balance of {token} unavailable: {source}")]
    Holdings {
        token: Address,
        #[source]
        source: ChainError,
    },

    #[error("{token} does not expose ERC-20 symbol/decimals: {source}")]
    Interface {
        token: Address,
        #[source]
        source: ChainError,
    },
}

#[derive(Clone)]
pub struct MetadataResolver {
    token_list: Arc<dyn TokenList>,
}

impl MetadataResolver {
    pub fn new(token_list: Arc<dyn TokenList>) -> Self {
        Self { token_list }
    }

    pub async fn resolve(
        &self,
        contract: &ContractRef,
        owner: Address,
    ) -> Result<TokenMetadata, MetadataError> {
        let token = contract.address();

        let holdings = async { tokio::try_join!(contract.total_supply(), contract.balance_of(owner)) };
        let (holdings, listed) = tokio::join!(holdings, self.token_list.lookup(token));
        let (total_supply, balance) =
            holdings.map_err(|source| MetadataError::Holdings { token, source })?;

        let ListedToken { symbol, decimals } = match listed {
            Ok(listed) => listed,
            Err(e) => {
                debug!("Token list miss for {}: {}, reading contract", token, e);
                let (symbol, decimals) = tokio::try_join!(contract.symbol(), contract.decimals())
                    .map_err(|source| MetadataError::Interface { token, source })?;
                ListedToken { symbol, decimals }
            }
        };

        Ok(TokenMetadata {
            symbol,
            decimals,
            total_supply,
            balance,
        })
    }
}
