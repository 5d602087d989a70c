//! Traits for the external data providers the engines consume.
//!
//! Concrete HTTP clients live in `tipcast-providers`; tests use in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{Fid, HolderMap, PostPage, Profile, RankingPage};

/// Token holder snapshots for the two tokens that gate eligibility.
#[async_trait]
pub trait HolderSnapshot: Send + Sync {
    /// Holders of token A (the NFT collection), unfiltered.
    async fn token_a_holders(&self) -> Result<HolderMap, EngineError>;

    /// Holders of token B with `balance >= min_balance`.
    async fn token_b_holders(&self, min_balance: f64) -> Result<HolderMap, EngineError>;
}

/// Paginated social-capital ranking, sorted ascending by rank.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Fetch one page of identities linked to any of `filter_addresses`.
    ///
    /// `cursor` is `None` for the first page.
    async fn rankings_page(
        &self,
        filter_addresses: &[String],
        cursor: Option<&str>,
    ) -> Result<RankingPage, EngineError>;
}

/// Cursor-based post search for a single author, newest first.
#[async_trait]
pub trait FeedSearch: Send + Sync {
    async fn search_posts(
        &self,
        fid: Fid,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PostPage, EngineError>;
}

/// Bulk profile lookup. Unknown ids are simply absent from the result.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_identities(&self, fids: &[Fid]) -> Result<HashMap<Fid, Profile>, EngineError>;
}
