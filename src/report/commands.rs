use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::report::formatters::{OutputFormat, format_approvals, format_tokens};
use crate::session::{DiscoveryPhase, DiscoverySession};

pub fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|_| anyhow::anyhow!("Invalid address format: {}", raw))
}

pub async fn cmd_scan(
    session: &DiscoverySession,
    address: &str,
    show_approvals: bool,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;

    session
        .run_discovery(address)
        .await
        .context("Token discovery failed")?;

    let tokens = session.visible_tokens();
    println!("{}", format_tokens(&tokens, format));
    if show_approvals {
        println!("{}", format_approvals(&tokens, format));
    }

    Ok(())
}

/// Reads one address per line from stdin. Each line starts a new run that
/// supersedes any run still in flight; every settled state is printed.
pub async fn cmd_watch(session: Arc<DiscoverySession>, format: &OutputFormat) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = session.subscribe();
    let mut runs = JoinSet::new();
    let mut stdin_open = true;

    while stdin_open || !runs.is_empty() {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match parse_address(&line) {
                        Ok(address) => {
                            info!("Switching discovery to {}", address);
                            let session = Arc::clone(&session);
                            runs.spawn(async move { session.run_discovery(address).await });
                        }
                        Err(e) => warn!("{}", e),
                    },
                    None => stdin_open = false,
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                print_settled_state(&session, format);
            }
            Some(_) = runs.join_next(), if !runs.is_empty() => {}
        }
    }

    if updates.has_changed().unwrap_or(false) {
        print_settled_state(&session, format);
    }

    Ok(())
}

fn print_settled_state(session: &DiscoverySession, format: &OutputFormat) {
    let state = session.state();
    match state.phase {
        DiscoveryPhase::Loaded => {
            if let Some(address) = state.address {
                eprintln!("Tokens for {address}:");
            }
            println!("{}", format_tokens(&session.visible_tokens(), format));
        }
        DiscoveryPhase::Failed(message) => eprintln!("Discovery failed: {message}"),
        DiscoveryPhase::Idle | DiscoveryPhase::Loading => {}
    }
}
