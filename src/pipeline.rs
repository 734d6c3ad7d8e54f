//! Token discovery for a single address.
//!
//! Candidates come from two sources: the approval history (contracts the
//! address has interacted with) and the balance indexer (contracts it holds).
//! Both lists are deduplicated, merged, and every surviving contract is
//! resolved concurrently. Contracts whose metadata cannot be resolved are
//! dropped without failing the run.

use alloy_primitives::Address;
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{ApprovalEvent, BalanceEntry, ContractRef, TokenRecord};
use crate::registry::RegistryChecker;
use crate::resolver::{MetadataError, MetadataResolver};
use crate::sources::{ApprovalSource, BalanceIndexer, Erc20Reader};

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Failures that abort a whole discovery run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("approval history unavailable for {owner}")]
    ApprovalHistory {
        owner: Address,
        #[source]
        source: anyhow::Error,
    },

    #[error("balance indexer unavailable for {owner}")]
    BalanceIndex {
        owner: Address,
        #[source]
        source: anyhow::Error,
    },
}

pub struct DiscoveryPipeline {
    approvals: Arc<dyn ApprovalSource>,
    indexer: Arc<dyn BalanceIndexer>,
    resolver: MetadataResolver,
    registry: Arc<dyn RegistryChecker>,
    reader: Arc<dyn Erc20Reader>,
    concurrency: usize,
}

impl DiscoveryPipeline {
    pub fn new(
        approvals: Arc<dyn ApprovalSource>,
        indexer: Arc<dyn BalanceIndexer>,
        resolver: MetadataResolver,
        registry: Arc<dyn RegistryChecker>,
        reader: Arc<dyn Erc20Reader>,
    ) -> Self {
        Self {
            approvals,
            indexer,
            resolver,
            registry,
            reader,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps how many contracts are resolved at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns every resolvable token for `owner`, sorted by symbol.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn discover(&self, owner: Address) -> Result<Vec<TokenRecord>, DiscoveryError> {
        let (events, balances) = tokio::try_join!(
            async {
                self.approvals
                    .approvals_by_owner(owner)
                    .await
                    .map_err(|source| DiscoveryError::ApprovalHistory { owner, source })
            },
            async {
                self.indexer
                    .token_balances(owner)
                    .await
                    .map_err(|source| DiscoveryError::BalanceIndex { owner, source })
            },
        )?;

        let candidates = merge_candidates(&events, &balances);
        info!(
            "{} candidate contracts from {} approvals and {} indexer entries",
            candidates.len(),
            events.len(),
            balances.len()
        );

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_count = candidates.len();
        let mut tokens: Vec<TokenRecord> = stream::iter(candidates)
            .map(|address| {
                let contract = ContractRef::new(address, Arc::clone(&self.reader));
                let approvals = approvals_for(&events, address);
                self.resolve_contract(owner, contract, approvals)
            })
            // Completion order varies between runs; yield in merge order so
            // equal symbols sort the same way every time.
            .buffered(self.concurrency)
            .filter_map(|outcome| async move {
                match outcome {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!("Dropping contract: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        sort_by_symbol(&mut tokens);
        info!(
            "Resolved {} of {} candidate contracts for {}",
            tokens.len(),
            candidate_count,
            owner
        );

        Ok(tokens)
    }

    async fn resolve_contract(
        &self,
        owner: Address,
        contract: ContractRef,
        approvals: Vec<ApprovalEvent>,
    ) -> Result<TokenRecord, MetadataError> {
        let (registered, metadata) = tokio::join!(
            self.check_registry(contract.address()),
            self.resolver.resolve(&contract, owner)
        );

        Ok(TokenRecord {
            metadata: metadata?,
            contract,
            registered,
            approvals,
        })
    }

    /// Registry failures count as "not registered".
    async fn check_registry(&self, token: Address) -> bool {
        match self.registry.is_registered(token).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!("Registry check failed for {}: {:#}", token, e);
                false
            }
        }
    }
}

/// Keeps the first occurrence of every key, preserving order.
pub fn dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

pub fn normalize_address(raw: &str) -> Option<Address> {
    Address::from_str(raw.trim()).ok()
}

/// Approval-derived contracts first, then indexer contracts with a symbol.
pub fn merge_candidates(events: &[ApprovalEvent], balances: &[BalanceEntry]) -> Vec<Address> {
    let from_approvals = dedup_by_key(events.iter().map(|e| e.contract_address), |a| *a);

    let from_indexer = dedup_by_key(
        balances
            .iter()
            .filter(|entry| entry.symbol.is_some())
            .filter_map(|entry| {
                let address = normalize_address(&entry.contract_address);
                if address.is_none() {
                    debug!("Ignoring indexer entry with invalid address {}", entry.contract_address);
                }
                address
            }),
        |a| *a,
    );

    dedup_by_key(from_approvals.into_iter().chain(from_indexer), |a| *a)
}

pub fn approvals_for(events: &[ApprovalEvent], token: Address) -> Vec<ApprovalEvent> {
    events
        .iter()
        .filter(|e| e.contract_address == token)
        .cloned()
        .collect()
}

/// Case-insensitive first, then case-sensitive. Identical symbols compare
/// equal and are left in merge order by the stable sort.
pub fn compare_symbols(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_by_symbol(tokens: &mut [TokenRecord]) {
    tokens.sort_by(|a, b| compare_symbols(&a.metadata.symbol, &b.metadata.symbol));
}
