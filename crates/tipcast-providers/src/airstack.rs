//! Airstack GraphQL: Farcaster social-capital rankings.
//!
//! Identities are filtered to those linked to one of the eligible addresses
//! and ordered by social-capital rank, 200 per page.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use tipcast_core::error::EngineError;
use tipcast_core::provider::RankingSource;
use tipcast_core::types::{RankingEntry, RankingPage};

use crate::http::{HttpClientConfig, JsonClient};

pub const PROVIDER: &str = "airstack";

pub const DEFAULT_URL: &str = "https://api.airstack.xyz/gql";

const RANKINGS_QUERY: &str = r#"
query GetUserSocialCapitalRank($cursor: String = "", $filterAddresses: [Address!] = []) {
  Socials(
    input: {
      blockchain: ethereum
      filter: {
        dappName: { _eq: farcaster }
        userAssociatedAddresses: { _in: $filterAddresses }
      }
      order: { socialCapitalRank: ASC }
      limit: 200
      cursor: $cursor
    }
  ) {
    pageInfo { hasNextPage nextCursor }
    Social {
      fid: userId
      username: profileName
      connectedAddresses { address blockchain }
      socialCapital { rank: socialCapitalRank }
      profileDisplayName
      profileImage
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Data {
    socials: Option<Socials>,
}

#[derive(Debug, Deserialize)]
struct Socials {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(rename = "Social", default)]
    social: Option<Vec<Social>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Social {
    fid: String,
    username: Option<String>,
    #[serde(default)]
    connected_addresses: Vec<ConnectedAddress>,
    social_capital: Option<SocialCapital>,
    profile_display_name: Option<String>,
    profile_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectedAddress {
    address: String,
    blockchain: String,
}

#[derive(Debug, Deserialize)]
struct SocialCapital {
    rank: Option<u64>,
}

/// Convert a GraphQL response body into a ranking page.
///
/// Keeps only `ethereum` addresses (lowercased) and drops identities left
/// with none, or without a rank.
fn parse_page(resp: GraphQlResponse) -> Result<RankingPage, EngineError> {
    if !resp.errors.is_empty() {
        let messages: Vec<_> = resp.errors.into_iter().map(|e| e.message).collect();
        return Err(EngineError::provider(PROVIDER, messages.join("; ")));
    }
    let socials = resp
        .data
        .and_then(|d| d.socials)
        .ok_or_else(|| EngineError::provider(PROVIDER, "response has no Socials"))?;

    let mut entries = Vec::new();
    for s in socials.social.unwrap_or_default() {
        let fid: u64 = s
            .fid
            .parse()
            .map_err(|_| EngineError::provider(PROVIDER, format!("invalid fid {:?}", s.fid)))?;
        let Some(rank) = s.social_capital.and_then(|c| c.rank) else {
            tracing::debug!(fid, "skipping unranked identity");
            continue;
        };
        let addresses: Vec<String> = s
            .connected_addresses
            .into_iter()
            .filter(|a| a.blockchain == "ethereum")
            .map(|a| a.address.to_lowercase())
            .collect();
        if addresses.is_empty() {
            continue;
        }
        entries.push(RankingEntry {
            fid,
            username: s.username,
            display_name: s.profile_display_name,
            pfp_url: s.profile_image,
            rank,
            addresses,
        });
    }

    Ok(RankingPage {
        entries,
        next_cursor: socials.page_info.next_cursor.filter(|c| !c.is_empty()),
        has_next_page: socials.page_info.has_next_page,
    })
}

/// Ranking source backed by the Airstack GraphQL API.
pub struct AirstackClient {
    http: JsonClient,
    url: String,
    api_key: String,
}

impl AirstackClient {
    pub fn new(api_key: impl Into<String>, config: HttpClientConfig) -> Result<Self, EngineError> {
        Ok(Self {
            http: JsonClient::new(PROVIDER, config)?,
            url: DEFAULT_URL.into(),
            api_key: api_key.into(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl RankingSource for AirstackClient {
    async fn rankings_page(
        &self,
        filter_addresses: &[String],
        cursor: Option<&str>,
    ) -> Result<RankingPage, EngineError> {
        let body = json!({
            "query": RANKINGS_QUERY,
            "variables": {
                "cursor": cursor.unwrap_or(""),
                "filterAddresses": filter_addresses,
            },
        });

        let resp: GraphQlResponse = self
            .http
            .send(|http| {
                http.post(&self.url)
                    .header("Authorization", &self.api_key)
                    .json(&body)
            })
            .await?;

        let page = parse_page(resp)?;
        tracing::debug!(entries = page.entries.len(), has_next = page.has_next_page, "ranking page fetched");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: serde_json::Value) -> GraphQlResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn keeps_ethereum_addresses_and_drops_empty_identities() {
        let resp = body(json!({
            "data": { "Socials": {
                "pageInfo": { "hasNextPage": true, "nextCursor": "c2" },
                "Social": [
                    {
                        "fid": "3",
                        "username": "dwr",
                        "connectedAddresses": [
                            { "address": "0xABC", "blockchain": "ethereum" },
                            { "address": "So1ana", "blockchain": "solana" }
                        ],
                        "socialCapital": { "rank": 1 },
                        "profileDisplayName": "Dan",
                        "profileImage": "https://img/3.png"
                    },
                    {
                        "fid": "9",
                        "username": "sol-only",
                        "connectedAddresses": [{ "address": "So1", "blockchain": "solana" }],
                        "socialCapital": { "rank": 2 },
                        "profileDisplayName": null,
                        "profileImage": null
                    }
                ]
            }}
        }));

        let page = parse_page(resp).unwrap();
        assert_eq!(page.entries.len(), 1);
        let e = &page.entries[0];
        assert_eq!((e.fid, e.rank), (3, 1));
        assert_eq!(e.addresses, vec!["0xabc"]);
        assert_eq!(e.display_name.as_deref(), Some("Dan"));
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));
        assert!(page.has_next_page);
    }

    #[test]
    fn null_social_list_and_empty_cursor() {
        let resp = body(json!({
            "data": { "Socials": {
                "pageInfo": { "hasNextPage": false, "nextCursor": "" },
                "Social": null
            }}
        }));
        let page = parse_page(resp).unwrap();
        assert!(page.entries.is_empty());
        assert!(page.next_cursor.is_none());
        assert!(!page.has_next_page);
    }

    #[test]
    fn graphql_errors_become_provider_errors() {
        let resp = body(json!({ "data": null, "errors": [{ "message": "rate limited" }] }));
        let err = parse_page(resp).unwrap_err();
        assert!(err.to_string().contains("airstack"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn unranked_identity_skipped() {
        let resp = body(json!({
            "data": { "Socials": {
                "pageInfo": { "hasNextPage": false, "nextCursor": null },
                "Social": [{
                    "fid": "5",
                    "connectedAddresses": [{ "address": "0x5", "blockchain": "ethereum" }],
                    "socialCapital": null
                }]
            }}
        }));
        assert!(parse_page(resp).unwrap().entries.is_empty());
    }
}
