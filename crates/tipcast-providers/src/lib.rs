//! tipcast-providers: HTTP clients for the external data Tipcast consumes.
//!
//! | Provider | Trait | Data |
//! |----------|-------|------|
//! | [`alchemy`] + [`moralis`] via [`OnchainHolders`] | `HolderSnapshot` | token A (NFT) and token B (ERC-20) holders on Base |
//! | [`airstack`] | `RankingSource` | Farcaster social-capital ranking |
//! | [`neynar`] | `FeedSearch`, `IdentityResolver` | cast search, bulk profiles |
//!
//! All requests share [`http::JsonClient`]: per-request timeout plus retry
//! with exponential backoff on transport errors, 429 and 5xx.

pub mod airstack;
pub mod alchemy;
pub mod error;
pub mod http;
pub mod moralis;
pub mod neynar;

pub use airstack::AirstackClient;
pub use alchemy::AlchemyNftClient;
pub use error::HttpError;
pub use http::{HttpClientConfig, JsonClient, RetryConfig, RetryPolicy};
pub use moralis::MoralisClient;
pub use neynar::NeynarClient;

use async_trait::async_trait;
use serde::Deserialize;

use tipcast_core::error::EngineError;
use tipcast_core::provider::HolderSnapshot;
use tipcast_core::types::HolderMap;

/// Holder snapshots from Alchemy (token A) and Moralis (token B).
pub struct OnchainHolders {
    pub nft: AlchemyNftClient,
    pub erc20: MoralisClient,
}

#[async_trait]
impl HolderSnapshot for OnchainHolders {
    async fn token_a_holders(&self) -> Result<HolderMap, EngineError> {
        self.nft.owners().await
    }

    async fn token_b_holders(&self, min_balance: f64) -> Result<HolderMap, EngineError> {
        self.erc20.owners(min_balance).await
    }
}

/// A numeric amount that providers send either as a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    /// Numeric value; unparseable text counts as zero.
    pub(crate) fn value(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_accepts_numbers_and_strings() {
        let q: Quantity = serde_json::from_str("3").unwrap();
        assert_eq!(q.value(), 3.0);
        let q: Quantity = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(q.value(), 12.5);
        let q: Quantity = serde_json::from_str("\"n/a\"").unwrap();
        assert_eq!(q.value(), 0.0);
    }
}
