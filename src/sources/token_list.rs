//! Community token list laid out as one `info.json` per checksummed address.

use alloy_primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::sources::TokenList;

#[derive(Debug, Error)]
pub enum TokenListError {
    #[error("token {0} is not listed")]
    NotFound(Address),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(StatusCode),

    #[error("malformed token info: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListedToken {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone)]
pub struct AssetsTokenList {
    http: Client,
    base_url: String,
}

impl AssetsTokenList {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TokenListError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn info_url(&self, token: Address) -> String {
        format!("{}/{}/info.json", self.base_url, token.to_checksum(None))
    }
}

#[async_trait]
impl TokenList for AssetsTokenList {
    async fn lookup(&self, token: Address) -> Result<ListedToken, TokenListError> {
        let response = self.http.get(self.info_url(token)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TokenListError::NotFound(token)),
            status if !status.is_success() => Err(TokenListError::Status(status)),
            _ => {
                let body = response.text().await?;
                parse_token_info(&body)
            }
        }
    }
}

fn parse_token_info(body: &str) -> Result<ListedToken, TokenListError> {
    serde_json::from_str(body).map_err(|e| TokenListError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_info_url_uses_checksummed_address() {
        let list = AssetsTokenList::new("https://assets.example/ethereum/assets/", Duration::from_secs(5))
            .unwrap();
        let token = address!("0x6b175474e89094c44da98b954eedeac495271d0f");
        assert_eq!(
            list.info_url(token),
            "https://assets.example/ethereum/assets/0x6B175474E89094C44Da98b954EedeAC495271d0F/info.json"
        );
    }

    #[test]
    fn test_parse_token_info() {
        let body = r#"{
            "name": "Dai Stablecoin",
            "website": "https://makerdao.com",
            "type": "ERC20",
            "symbol": "DAI",
            "decimals": 18,
            "status": "active",
            "id": "0x6B175474E89094C44Da98b954EedeAC495271d0F"
        }"#;

        assert_eq!(
            parse_token_info(body).unwrap(),
            ListedToken {
                symbol: "DAI".to_string(),
                decimals: 18,
            }
        );
    }

    #[test]
    fn test_parse_token_info_without_decimals_is_malformed() {
        let result = parse_token_info(r#"{ "symbol": "DAI" }"#);
        assert!(matches!(result, Err(TokenListError::Malformed(_))));
    }
}
