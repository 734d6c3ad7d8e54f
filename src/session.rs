//! Run state published to consumers of the discovery pipeline.
//!
//! Every `run_discovery` call takes a new generation number. A run only
//! publishes its terminal state if no newer run started in the meantime;
//! stale completions are dropped on arrival. In-flight requests of a
//! superseded run are not cancelled.

use alloy_primitives::Address;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::TokenRecord;
use crate::pipeline::{DiscoveryError, DiscoveryPipeline};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiscoveryPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryState {
    pub address: Option<Address>,
    pub phase: DiscoveryPhase,
    pub tokens: Arc<Vec<TokenRecord>>,
}

impl DiscoveryState {
    pub fn loading(&self) -> bool {
        self.phase == DiscoveryPhase::Loading
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Published { tokens: usize },
    /// A newer run started before this one finished.
    Superseded,
}

pub struct DiscoverySession {
    pipeline: Arc<DiscoveryPipeline>,
    generation: AtomicU64,
    registered_only: AtomicBool,
    state: watch::Sender<DiscoveryState>,
}

impl DiscoverySession {
    pub fn new(pipeline: Arc<DiscoveryPipeline>) -> Self {
        let (state, _) = watch::channel(DiscoveryState::default());
        Self {
            pipeline,
            generation: AtomicU64::new(0),
            registered_only: AtomicBool::new(false),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DiscoveryState {
        self.state.borrow().clone()
    }

    pub async fn run_discovery(&self, address: Address) -> Result<RunOutcome, DiscoveryError> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = DiscoveryState {
                address: Some(address),
                phase: DiscoveryPhase::Loading,
                tokens: Arc::default(),
            };
        });
        info!("Discovery run #{} started for {}", generation, address);

        let result = self.pipeline.discover(address).await;

        let mut published = false;
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = match &result {
                Ok(tokens) => DiscoveryState {
                    address: Some(address),
                    phase: DiscoveryPhase::Loaded,
                    tokens: Arc::new(tokens.clone()),
                },
                Err(e) => DiscoveryState {
                    address: Some(address),
                    phase: DiscoveryPhase::Failed(format!("{e:#}")),
                    tokens: Arc::default(),
                },
            };
            published = true;
            true
        });

        if !published {
            debug!("Discarding stale result of run #{} for {}", generation, address);
            return Ok(RunOutcome::Superseded);
        }

        match result {
            Ok(tokens) => Ok(RunOutcome::Published {
                tokens: tokens.len(),
            }),
            Err(e) => {
                warn!("Discovery run #{} failed: {:#}", generation, e);
                Err(e)
            }
        }
    }

    /// Changing the filter wakes subscribers without touching the published
    /// state; they re-read `visible_tokens()`.
    pub fn set_registered_only(&self, registered_only: bool) {
        let previous = self.registered_only.swap(registered_only, Ordering::SeqCst);
        if previous != registered_only {
            self.state.send_modify(|_| {});
        }
    }

    pub fn registered_only(&self) -> bool {
        self.registered_only.load(Ordering::SeqCst)
    }

    /// The published tokens with the display filter applied, in published order.
    pub fn visible_tokens(&self) -> Vec<TokenRecord> {
        let registered_only = self.registered_only();
        self.state
            .borrow()
            .tokens
            .iter()
            .filter(|token| !registered_only || token.registered)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalEvent, BalanceEntry};
    use crate::pipeline::tests::{OWNER, entry, reader_with_symbols, registry_with, unlisted};
    use crate::resolver::MetadataResolver;
    use crate::sources::{ApprovalSource, MockApprovalSource, MockBalanceIndexer};
    use alloy_primitives::address;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    const OTHER_OWNER: Address = address!("0x2222222222222222222222222222222222222222");
    const LISTED: Address = address!("0x6b175474e89094c44da98b954eedeac495271d0f");
    const UNLISTED: Address = address!("0xdddddddddddddddddddddddddddddddddddddddd");
    const LATE: Address = address!("0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

    fn symbols(tokens: &[TokenRecord]) -> Vec<String> {
        tokens.iter().map(|t| t.metadata.symbol.clone()).collect()
    }

    fn session_with(
        approvals: Arc<dyn ApprovalSource>,
        indexer: MockBalanceIndexer,
    ) -> DiscoverySession {
        let reader = reader_with_symbols(HashMap::from([
            (LISTED, "DAI"),
            (UNLISTED, "SCAM"),
            (LATE, "OLD"),
        ]));
        let pipeline = DiscoveryPipeline::new(
            approvals,
            Arc::new(indexer),
            MetadataResolver::new(Arc::new(unlisted())),
            Arc::new(registry_with(&[LISTED])),
            Arc::new(reader),
        );
        DiscoverySession::new(Arc::new(pipeline))
    }

    fn no_approvals(times: usize) -> Arc<dyn ApprovalSource> {
        let mut approvals = MockApprovalSource::new();
        approvals
            .expect_approvals_by_owner()
            .times(times)
            .returning(|_| Ok(Vec::new()));
        Arc::new(approvals)
    }

    fn indexer_with(entries: Vec<BalanceEntry>, times: usize) -> MockBalanceIndexer {
        let mut indexer = MockBalanceIndexer::new();
        indexer
            .expect_token_balances()
            .times(times)
            .returning(move |_| Ok(entries.clone()));
        indexer
    }

    #[tokio::test]
    async fn test_run_moves_from_idle_to_loaded() {
        let session = session_with(
            no_approvals(1),
            indexer_with(vec![entry(LISTED, Some("DAI"))], 1),
        );
        assert_eq!(session.state().phase, DiscoveryPhase::Idle);

        let outcome = session.run_discovery(OWNER).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Published { tokens: 1 }));
        let state = session.state();
        assert_eq!(state.phase, DiscoveryPhase::Loaded);
        assert!(!state.loading());
        assert_eq!(state.address, Some(OWNER));
        assert_eq!(symbols(&state.tokens), vec!["DAI"]);
    }

    #[tokio::test]
    async fn test_filter_toggle_does_not_rerun_discovery() {
        let session = session_with(
            no_approvals(1),
            indexer_with(
                vec![entry(UNLISTED, Some("SCAM")), entry(LISTED, Some("DAI"))],
                1,
            ),
        );
        session.run_discovery(OWNER).await.unwrap();
        assert_eq!(symbols(&session.visible_tokens()), vec!["DAI", "SCAM"]);

        session.set_registered_only(true);
        assert_eq!(symbols(&session.visible_tokens()), vec!["DAI"]);

        session.set_registered_only(false);
        assert_eq!(symbols(&session.visible_tokens()), vec!["DAI", "SCAM"]);
    }

    #[tokio::test]
    async fn test_filter_toggle_notifies_subscribers() {
        let session = session_with(
            no_approvals(1),
            indexer_with(
                vec![entry(UNLISTED, Some("SCAM")), entry(LISTED, Some("DAI"))],
                1,
            ),
        );
        session.run_discovery(OWNER).await.unwrap();
        let mut updates = session.subscribe();
        assert!(!updates.has_changed().unwrap());

        session.set_registered_only(true);

        assert!(updates.has_changed().unwrap());
        let state = updates.borrow_and_update().clone();
        assert_eq!(state.phase, DiscoveryPhase::Loaded);
        assert_eq!(symbols(&state.tokens), vec!["DAI", "SCAM"]);
        assert_eq!(symbols(&session.visible_tokens()), vec!["DAI"]);

        session.set_registered_only(true);
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_source_failure_publishes_failed_state_and_clears_tokens() {
        let mut approvals = MockApprovalSource::new();
        let mut calls = 0;
        approvals.expect_approvals_by_owner().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(Vec::new())
            } else {
                Err(anyhow::anyhow!("node unavailable"))
            }
        });
        let session = session_with(
            Arc::new(approvals),
            indexer_with(vec![entry(LISTED, Some("DAI"))], 2),
        );
        session.run_discovery(OWNER).await.unwrap();
        assert_eq!(session.state().tokens.len(), 1);

        let error = session.run_discovery(OTHER_OWNER).await.unwrap_err();

        assert!(matches!(error, DiscoveryError::ApprovalHistory { .. }));
        let state = session.state();
        assert!(matches!(state.phase, DiscoveryPhase::Failed(_)));
        assert_eq!(state.address, Some(OTHER_OWNER));
        assert!(state.tokens.is_empty());
    }

    /// Holds back the approval history of `OWNER` until released.
    struct GatedApprovals {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ApprovalSource for GatedApprovals {
        async fn approvals_by_owner(&self, owner: Address) -> anyhow::Result<Vec<ApprovalEvent>> {
            if owner == OWNER {
                self.gate.notified().await;
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_superseded_run_does_not_overwrite_newer_state() {
        let gate = Arc::new(Notify::new());
        let mut indexer = MockBalanceIndexer::new();
        indexer.expect_token_balances().returning(|owner| {
            if owner == OWNER {
                Ok(vec![entry(LATE, Some("OLD"))])
            } else {
                Ok(vec![entry(LISTED, Some("DAI"))])
            }
        });
        let session = session_with(
            Arc::new(GatedApprovals {
                gate: Arc::clone(&gate),
            }),
            indexer,
        );
        let mut updates = session.subscribe();

        let stale = session.run_discovery(OWNER);
        tokio::pin!(stale);
        assert!(futures::poll!(&mut stale).is_pending());
        assert!(session.state().loading());

        let fresh = session.run_discovery(OTHER_OWNER).await.unwrap();
        assert!(matches!(fresh, RunOutcome::Published { tokens: 1 }));

        gate.notify_one();
        let stale = stale.await.unwrap();
        assert!(matches!(stale, RunOutcome::Superseded));

        let state = updates.borrow_and_update().clone();
        assert_eq!(state.address, Some(OTHER_OWNER));
        assert_eq!(state.phase, DiscoveryPhase::Loaded);
        assert_eq!(symbols(&state.tokens), vec!["DAI"]);
    }
}
