use alloy_primitives::{Address, B256, U256};
use std::fmt;
use std::sync::Arc;

use crate::rpc::ChainError;
use crate::sources::Erc20Reader;

/// One historical `Approval` where the queried address is the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEvent {
    pub contract_address: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

/// One token entry reported by the balance indexer. The address is kept as
/// reported and only normalized during candidate assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    pub contract_address: String,
    pub symbol: Option<String>,
}

/// A normalized contract address together with the handle used to read it.
#[derive(Clone)]
pub struct ContractRef {
    address: Address,
    reader: Arc<dyn Erc20Reader>,
}

impl ContractRef {
    pub fn new(address: Address, reader: Arc<dyn Erc20Reader>) -> Self {
        Self { address, reader }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 form of the address.
    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }

    pub async fn symbol(&self) -> Result<String, ChainError> {
        self.reader.symbol(self.address).await
    }

    pub async fn decimals(&self) -> Result<u8, ChainError> {
        self.reader.decimals(self.address).await
    }

    pub async fn total_supply(&self) -> Result<U256, ChainError> {
        self.reader.total_supply(self.address).await
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256, ChainError> {
        self.reader.balance_of(self.address, owner).await
    }
}

impl fmt::Debug for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContractRef").field(&self.address).finish()
    }
}

impl PartialEq for ContractRef {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ContractRef {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    pub balance: U256,
}

/// A resolved token for one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub metadata: TokenMetadata,
    pub contract: ContractRef,
    pub registered: bool,
    pub approvals: Vec<ApprovalEvent>,
}

impl TokenRecord {
    pub fn address(&self) -> Address {
        self.contract.address()
    }
}
