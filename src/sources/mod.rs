//! Boundaries to the external data the discovery pipeline consumes.

pub mod approvals;
pub mod ethplorer;
pub mod token_list;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::models::{ApprovalEvent, BalanceEntry};
use crate::rpc::ChainError;

pub use approvals::ChainApprovalSource;
pub use ethplorer::EthplorerClient;
pub use token_list::{AssetsTokenList, ListedToken, TokenListError};

/// Full approval history where `owner` is the approving address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApprovalSource: Send + Sync {
    async fn approvals_by_owner(&self, owner: Address) -> anyhow::Result<Vec<ApprovalEvent>>;
}

/// Third-party report of every token balance held by `owner`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceIndexer: Send + Sync {
    async fn token_balances(&self, owner: Address) -> anyhow::Result<Vec<BalanceEntry>>;
}

/// Address-indexed community metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenList: Send + Sync {
    async fn lookup(&self, token: Address) -> Result<ListedToken, TokenListError>;
}

/// Direct ERC-20 reads against a token contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Erc20Reader: Send + Sync {
    async fn symbol(&self, token: Address) -> Result<String, ChainError>;

    async fn decimals(&self, token: Address) -> Result<u8, ChainError>;

    async fn total_supply(&self, token: Address) -> Result<U256, ChainError>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
}
