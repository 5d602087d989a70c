//! Moralis EVM API: ERC-20 owners of the token-B contract on Base.
//!
//! <https://docs.moralis.io/web3-data-api/evm/reference/get-token-owners>

use serde::Deserialize;

use tipcast_core::error::EngineError;
use tipcast_core::types::HolderMap;

use crate::http::{HttpClientConfig, JsonClient};
use crate::Quantity;

pub const PROVIDER: &str = "moralis";

pub const DEFAULT_BASE_URL: &str = "https://deep-index.moralis.io/api/v2.2";

/// Moralis chain id for Base mainnet (8453).
pub const BASE_CHAIN: &str = "0x2105";

const PAGE_LIMIT: &str = "100";

#[derive(Debug, Deserialize)]
struct OwnersResponse {
    #[serde(default)]
    result: Vec<TokenOwner>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenOwner {
    owner_address: String,
    balance: Option<Quantity>,
    balance_formatted: Option<Quantity>,
}

impl TokenOwner {
    /// Balance in whole tokens, falling back to the raw balance.
    fn tokens(&self) -> f64 {
        self.balance_formatted
            .as_ref()
            .or(self.balance.as_ref())
            .map(Quantity::value)
            .unwrap_or(0.0)
    }
}

/// Fold one page into `holders`, keeping owners with at least `min_balance`.
fn absorb_page(holders: &mut HolderMap, owners: Vec<TokenOwner>, min_balance: f64) {
    for owner in owners {
        let balance = owner.tokens();
        if balance >= min_balance {
            holders.insert(owner.owner_address.to_lowercase(), balance);
        }
    }
}

/// Client for the ERC-20 owners endpoint.
pub struct MoralisClient {
    http: JsonClient,
    base_url: String,
    api_key: String,
    token: String,
    chain: String,
}

impl MoralisClient {
    pub fn new(api_key: impl Into<String>, token: impl Into<String>, config: HttpClientConfig) -> Result<Self, EngineError> {
        Ok(Self {
            http: JsonClient::new(PROVIDER, config)?,
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            token: token.into(),
            chain: BASE_CHAIN.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = chain.into();
        self
    }

    /// Owners with `balance >= min_balance`, largest first, all pages.
    pub async fn owners(&self, min_balance: f64) -> Result<HolderMap, EngineError> {
        let url = format!("{}/erc20/{}/owners", self.base_url, self.token);
        let mut holders = HolderMap::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let resp: OwnersResponse = self
                .http
                .send(|http| {
                    let mut req = http
                        .get(&url)
                        .header("X-API-Key", &self.api_key)
                        .query(&[("chain", self.chain.as_str()), ("order", "DESC"), ("limit", PAGE_LIMIT)]);
                    if let Some(c) = &cursor {
                        req = req.query(&[("cursor", c.as_str())]);
                    }
                    req
                })
                .await?;
            pages += 1;

            // Sorted descending: once a page ends below the threshold the
            // remaining pages cannot contribute.
            let exhausted = resp.result.last().is_some_and(|o| o.tokens() < min_balance);
            absorb_page(&mut holders, resp.result, min_balance);

            match resp.cursor.filter(|c| !c.is_empty()) {
                _ if exhausted => break,
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(EngineError::provider(PROVIDER, format!("cursor {next} repeated")));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(pages, holders = holders.len(), min_balance, "token B holders fetched");
        Ok(holders)
    }
}
