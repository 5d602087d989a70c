//! Neynar v2: Farcaster cast search and bulk user lookup.
//!
//! <https://docs.neynar.com/reference/search-casts>
//! <https://docs.neynar.com/reference/fetch-bulk-users>

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use tipcast_core::error::EngineError;
use tipcast_core::provider::{FeedSearch, IdentityResolver};
use tipcast_core::types::{Fid, Post, PostPage, Profile};

use crate::http::{HttpClientConfig, JsonClient};

pub const PROVIDER: &str = "neynar";

pub const DEFAULT_BASE_URL: &str = "https://api.neynar.com/v2/farcaster";

/// Largest page the search endpoint accepts.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Largest id list the bulk user endpoint accepts.
pub const BULK_USERS_CHUNK: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    casts: Vec<Cast>,
    next: Option<NextCursor>,
}

#[derive(Debug, Deserialize)]
struct NextCursor {
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cast {
    hash: String,
    #[serde(default)]
    text: String,
    timestamp: DateTime<Utc>,
    author: User,
    parent_author: Option<ParentAuthor>,
}

#[derive(Debug, Deserialize)]
struct ParentAuthor {
    fid: Option<Fid>,
}

#[derive(Debug, Deserialize)]
struct User {
    fid: Fid,
    username: Option<String>,
    display_name: Option<String>,
    pfp_url: Option<String>,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Profile {
            fid: u.fid,
            username: u.username,
            display_name: u.display_name,
            pfp_url: u.pfp_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkUsersResponse {
    #[serde(default)]
    users: Vec<User>,
}

fn into_page(resp: SearchResponse) -> PostPage {
    let posts = resp
        .result
        .casts
        .into_iter()
        .map(|c| Post {
            hash: c.hash,
            text: c.text,
            timestamp: c.timestamp,
            author: c.author.into(),
            parent_fid: c.parent_author.and_then(|p| p.fid),
        })
        .collect();

    PostPage {
        posts,
        next_cursor: resp
            .result
            .next
            .and_then(|n| n.cursor)
            .filter(|c| !c.is_empty()),
    }
}

/// Neynar API client: post search and profile lookup.
pub struct NeynarClient {
    http: JsonClient,
    base_url: String,
    api_key: String,
}

impl NeynarClient {
    pub fn new(api_key: impl Into<String>, config: HttpClientConfig) -> Result<Self, EngineError> {
        Ok(Self {
            http: JsonClient::new(PROVIDER, config)?,
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, http: &reqwest::Client, path: &str) -> reqwest::RequestBuilder {
        http.get(format!("{}/{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("x-neynar-experimental", "true")
    }
}

#[async_trait]
impl FeedSearch for NeynarClient {
    async fn search_posts(
        &self,
        fid: Fid,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PostPage, EngineError> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT).to_string();
        let author = fid.to_string();

        let resp: SearchResponse = self
            .http
            .send(|http| {
                let mut req = self.get(http, "cast/search").query(&[
                    ("q", query),
                    ("author_fid", author.as_str()),
                    ("limit", limit.as_str()),
                ]);
                if let Some(c) = cursor {
                    req = req.query(&[("cursor", c)]);
                }
                req
            })
            .await?;

        Ok(into_page(resp))
    }
}

#[async_trait]
impl IdentityResolver for NeynarClient {
    async fn resolve_identities(&self, fids: &[Fid]) -> Result<HashMap<Fid, Profile>, EngineError> {
        let mut profiles = HashMap::with_capacity(fids.len());
        for chunk in fids.chunks(BULK_USERS_CHUNK) {
            let ids = chunk.iter().map(Fid::to_string).collect::<Vec<_>>().join(",");
            let resp: BulkUsersResponse = self
                .http
                .send(|http| self.get(http, "user/bulk").query(&[("fids", ids.as_str())]))
                .await?;
            profiles.extend(resp.users.into_iter().map(|u| (u.fid, Profile::from(u))));
        }
        Ok(profiles)
    }
}
