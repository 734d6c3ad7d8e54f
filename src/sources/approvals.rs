use alloy::eips::BlockNumberOrTag;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::events::{IERC20, decode_approval_event};
use crate::models::ApprovalEvent;
use crate::rpc::RpcClient;
use crate::sources::ApprovalSource;

/// Reads `Approval` logs straight from the chain.
pub struct ChainApprovalSource {
    client: RpcClient,
    from_block: u64,
}

impl ChainApprovalSource {
    pub fn new(client: RpcClient, from_block: u64) -> Self {
        Self { client, from_block }
    }

    /// `Approval` logs of any contract whose indexed owner is `owner`.
    pub fn approval_filter(&self, owner: Address) -> Filter {
        Filter::new()
            .event_signature(IERC20::Approval::SIGNATURE_HASH)
            .topic1(owner.into_word())
            .from_block(self.from_block)
            .to_block(BlockNumberOrTag::Latest)
    }
}

#[async_trait]
impl ApprovalSource for ChainApprovalSource {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn approvals_by_owner(&self, owner: Address) -> Result<Vec<ApprovalEvent>> {
        let filter = self.approval_filter(owner);
        let logs = self
            .client
            .get_logs(&filter)
            .await
            .with_context(|| format!("Failed to fetch approval logs for {owner}"))?;

        info!("Received {} approval logs for {}", logs.len(), owner);

        let mut approvals = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_approval_event(&log) {
                Ok(event) => approvals.push(event),
                Err(e) => {
                    debug!(
                        "Skipping non ERC-20 approval log from {}: {}",
                        log.address(),
                        e
                    );
                }
            }
        }

        Ok(approvals)
    }
}
