//! Alchemy NFT API: owners of the token-A collection on Base.
//!
//! <https://docs.alchemy.com/reference/getownersforcontract-v3>

use serde::Deserialize;

use tipcast_core::error::EngineError;
use tipcast_core::types::HolderMap;

use crate::http::{HttpClientConfig, JsonClient};
use crate::Quantity;

pub const PROVIDER: &str = "alchemy";

/// NFT API base for Base mainnet. The API key is appended as a path segment.
pub const BASE_MAINNET_NFT_URL: &str = "https://base-mainnet.g.alchemy.com/nft/v3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnersResponse {
    #[serde(default)]
    owners: Vec<Owner>,
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Owner {
    owner_address: String,
    #[serde(default)]
    token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Deserialize)]
struct TokenBalance {
    balance: Quantity,
}

/// Fold one page of owners into `holders`. An owner's balance is the sum of
/// its per-token balances.
fn absorb_page(holders: &mut HolderMap, owners: Vec<Owner>) {
    for owner in owners {
        let total: f64 = owner.token_balances.iter().map(|b| b.balance.value()).sum();
        *holders.entry(owner.owner_address.to_lowercase()).or_default() += total;
    }
}

/// Client for `getOwnersForContract`.
pub struct AlchemyNftClient {
    http: JsonClient,
    base_url: String,
    contract: String,
}

impl AlchemyNftClient {
    pub fn new(api_key: &str, contract: impl Into<String>, config: HttpClientConfig) -> Result<Self, EngineError> {
        Ok(Self {
            http: JsonClient::new(PROVIDER, config)?,
            base_url: format!("{BASE_MAINNET_NFT_URL}/{api_key}"),
            contract: contract.into(),
        })
    }

    /// Point at a different endpoint (already including the key, if needed).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// All owners of the collection, following `pageKey` until exhausted.
    pub async fn owners(&self) -> Result<HolderMap, EngineError> {
        let url = format!("{}/getOwnersForContract", self.base_url);
        let mut holders = HolderMap::new();
        let mut page_key: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let resp: OwnersResponse = self
                .http
                .send(|http| {
                    let mut req = http.get(&url).query(&[
                        ("contractAddress", self.contract.as_str()),
                        ("withTokenBalances", "true"),
                    ]);
                    if let Some(key) = &page_key {
                        req = req.query(&[("pageKey", key.as_str())]);
                    }
                    req
                })
                .await?;
            pages += 1;

            absorb_page(&mut holders, resp.owners);

            match resp.page_key.filter(|k| !k.is_empty()) {
                Some(next) if page_key.as_deref() == Some(next.as_str()) => {
                    return Err(EngineError::provider(PROVIDER, format!("page key {next} repeated")));
                }
                Some(next) => page_key = Some(next),
                None => break,
            }
        }

        tracing::debug!(pages, holders = holders.len(), "token A holders fetched");
        Ok(holders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_owners_and_sums_balances() {
        let body = json!({
            "owners": [
                {
                    "ownerAddress": "0xAbC",
                    "tokenBalances": [
                        { "tokenId": "1", "balance": "1" },
                        { "tokenId": "7", "balance": 2 }
                    ]
                },
                { "ownerAddress": "0xdef", "tokenBalances": [{ "tokenId": "3", "balance": "1" }] }
            ],
            "pageKey": "next-page"
        });
        let resp: OwnersResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.page_key.as_deref(), Some("next-page"));

        let mut holders = HolderMap::new();
        absorb_page(&mut holders, resp.owners);
        assert_eq!(holders["0xabc"], 3.0);
        assert_eq!(holders["0xdef"], 1.0);
    }

    #[test]
    fn last_page_has_no_key_and_owner_repeats_accumulate() {
        let body = json!({ "owners": [{ "ownerAddress": "0xabc", "tokenBalances": [{ "balance": "2" }] }] });
        let resp: OwnersResponse = serde_json::from_value(body).unwrap();
        assert!(resp.page_key.is_none());

        let mut holders = HolderMap::from([("0xabc".to_string(), 1.0)]);
        absorb_page(&mut holders, resp.owners);
        assert_eq!(holders["0xabc"], 3.0);
    }

    #[test]
    fn base_url_embeds_key() {
        let client = AlchemyNftClient::new("k3y", "0xnft", HttpClientConfig::default()).unwrap();
        assert_eq!(client.base_url, "https://base-mainnet.g.alchemy.com/nft/v3/k3y");
    }
}
