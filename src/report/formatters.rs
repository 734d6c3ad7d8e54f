use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

use crate::models::{ApprovalEvent, TokenRecord};

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_tokens(tokens: &[TokenRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_tokens_table(tokens),
        OutputFormat::Json => format_tokens_json(tokens),
        OutputFormat::Csv => format_tokens_csv(tokens),
    }
}

fn format_tokens_table(tokens: &[TokenRecord]) -> String {
    if tokens.is_empty() {
        return "No tokens found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Symbol",
            "Registered",
            "Balance",
            "Total Supply",
            "Approvals",
            "Contract",
        ]);

    for token in tokens {
        let metadata = &token.metadata;
        table.add_row(vec![
            Cell::new(&metadata.symbol),
            Cell::new(if token.registered { "yes" } else { "no" }),
            Cell::new(format_amount(metadata.balance, metadata.decimals)),
            Cell::new(format_amount(metadata.total_supply, metadata.decimals)),
            Cell::new(token.approvals.len()),
            Cell::new(token.contract.checksummed()),
        ]);
    }

    table.to_string()
}

fn format_tokens_json(tokens: &[TokenRecord]) -> String {
    let json_tokens: Vec<_> = tokens
        .iter()
        .map(|t| {
            let metadata = &t.metadata;
            json!({
                "symbol": metadata.symbol,
                "decimals": metadata.decimals,
                "registered": t.registered,
                "contract": t.contract.checksummed(),
                "balance": format_amount(metadata.balance, metadata.decimals),
                "balance_raw": metadata.balance.to_string(),
                "total_supply": format_amount(metadata.total_supply, metadata.decimals),
                "total_supply_raw": metadata.total_supply.to_string(),
                "approvals": t.approvals.iter().map(approval_json).collect::<Vec<_>>(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_tokens).unwrap_or_else(|_| "[]".to_string())
}

fn approval_json(approval: &ApprovalEvent) -> serde_json::Value {
    json!({
        "spender": approval.spender.to_checksum(None),
        "value": approval.value.to_string(),
        "block_number": approval.block_number,
        "transaction_hash": approval.transaction_hash.map(|h| format!("{h:?}")),
    })
}

fn format_tokens_csv(tokens: &[TokenRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "symbol",
        "decimals",
        "registered",
        "contract",
        "balance",
        "balance_raw",
        "total_supply",
        "total_supply_raw",
        "approvals",
    ]);

    for token in tokens {
        let metadata = &token.metadata;
        let _ = wtr.write_record([
            &metadata.symbol,
            &metadata.decimals.to_string(),
            &token.registered.to_string(),
            &token.contract.checksummed(),
            &format_amount(metadata.balance, metadata.decimals),
            &metadata.balance.to_string(),
            &format_amount(metadata.total_supply, metadata.decimals),
            &metadata.total_supply.to_string(),
            &token.approvals.len().to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

/// One row per approval event, grouped by token in the given token order.
pub fn format_approvals(tokens: &[TokenRecord], format: &OutputFormat) -> String {
    let rows: Vec<(&TokenRecord, &ApprovalEvent)> = tokens
        .iter()
        .flat_map(|token| token.approvals.iter().map(move |approval| (token, approval)))
        .collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No approvals found.".to_string();
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Token", "Spender", "Allowance", "Block", "Tx Hash"]);

            for (token, approval) in rows {
                table.add_row(vec![
                    Cell::new(&token.metadata.symbol),
                    Cell::new(approval.spender.to_checksum(None)),
                    Cell::new(format_allowance(approval.value, token.metadata.decimals)),
                    Cell::new(
                        approval
                            .block_number
                            .map_or("N/A".to_string(), |b| b.to_string()),
                    ),
                    Cell::new(
                        approval
                            .transaction_hash
                            .map_or("N/A".to_string(), |h| format_tx_hash(&format!("{h:?}"))),
                    ),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => {
            let json_rows: Vec<_> = rows
                .into_iter()
                .map(|(token, approval)| {
                    let mut value = approval_json(approval);
                    value["token"] = json!(token.metadata.symbol);
                    value["contract"] = json!(token.contract.checksummed());
                    value
                })
                .collect();
            serde_json::to_string_pretty(&json_rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["token", "contract", "spender", "value", "block_number", "transaction_hash"]);
            for (token, approval) in rows {
                let _ = wtr.write_record([
                    &token.metadata.symbol,
                    &token.contract.checksummed(),
                    &approval.spender.to_checksum(None),
                    &approval.value.to_string(),
                    &approval.block_number.map_or(String::new(), |b| b.to_string()),
                    &approval
                        .transaction_hash
                        .map_or(String::new(), |h| format!("{h:?}")),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

fn format_allowance(value: U256, decimals: u8) -> String {
    if value == U256::MAX {
        "Unlimited".to_string()
    } else {
        format_amount(value, decimals)
    }
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 10 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractRef, TokenMetadata};
    use crate::sources::MockErc20Reader;
    use alloy_primitives::{Address, B256, address};
    use std::sync::Arc;

    const DAI: Address = address!("0x6b175474e89094c44da98b954eedeac495271d0f");

    fn dai(approvals: Vec<ApprovalEvent>) -> TokenRecord {
        TokenRecord {
            metadata: TokenMetadata {
                symbol: "DAI".to_string(),
                decimals: 18,
                total_supply: U256::from(5_000_000_000_000_000_000u128),
                balance: U256::from(1_500_000_000_000_000_000u128),
            },
            contract: ContractRef::new(DAI, Arc::new(MockErc20Reader::new())),
            registered: true,
            approvals,
        }
    }

    fn unlimited_approval() -> ApprovalEvent {
        ApprovalEvent {
            contract_address: DAI,
            owner: address!("0x1111111111111111111111111111111111111111"),
            spender: address!("0x2222222222222222222222222222222222222222"),
            value: U256::MAX,
            block_number: Some(12_345),
            transaction_hash: Some(B256::repeat_byte(0xab)),
            log_index: Some(0),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!(OutputFormat::from("JSON"), OutputFormat::Json));
        assert!(matches!(OutputFormat::from("csv"), OutputFormat::Csv));
        assert!(matches!(OutputFormat::from("anything"), OutputFormat::Table));
    }

    #[test]
    fn test_table_shows_checksummed_contract_and_symbol() {
        let output = format_tokens(&[dai(vec![])], &OutputFormat::Table);
        assert!(output.contains("DAI"));
        assert!(output.contains("0x6B175474E89094C44Da98b954EedeAC495271d0F"));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_tokens(&[], &OutputFormat::Table), "No tokens found.");
        assert_eq!(format_approvals(&[], &OutputFormat::Table), "No approvals found.");
    }

    #[test]
    fn test_json_keeps_raw_values() {
        let output = format_tokens(&[dai(vec![unlimited_approval()])], &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value[0]["symbol"], "DAI");
        assert_eq!(value[0]["registered"], true);
        assert_eq!(value[0]["balance_raw"], "1500000000000000000");
        assert_eq!(value[0]["total_supply_raw"], "5000000000000000000");
        assert_eq!(value[0]["approvals"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let output = format_tokens(&[dai(vec![])], &OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("symbol,decimals,registered,contract"));
        assert!(lines[1].starts_with("DAI,18,true,0x6B175474E89094C44Da98b954EedeAC495271d0F"));
    }

    #[test]
    fn test_unlimited_allowance_label() {
        let output = format_approvals(&[dai(vec![unlimited_approval()])], &OutputFormat::Table);
        assert!(output.contains("Unlimited"));
        assert!(output.contains("12345"));
        assert!(output.contains("0xabab...abab"));
    }

    #[test]
    fn test_approvals_csv_rows() {
        let output = format_approvals(
            &[dai(vec![unlimited_approval(), unlimited_approval()])],
            &OutputFormat::Csv,
        );
        assert_eq!(output.lines().count(), 3);
    }
}
