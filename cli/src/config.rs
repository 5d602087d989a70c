//! Runtime configuration: every setting is a flag with an environment
//! variable fallback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use tipcast_core::sync::SyncConfig;
use tipcast_core::types::AllocationParams;
use tipcast_core::{Allocator, Season};
use tipcast_providers::{
    AirstackClient, AlchemyNftClient, HttpClientConfig, MoralisClient, NeynarClient, OnchainHolders,
    RetryConfig,
};
use tipcast_storage::SqliteStorage;

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// SQLite database path or URL
    #[arg(long, env = "TIPCAST_DB", default_value = "./tipcast.db", global = true)]
    pub db: String,

    /// Alchemy API key (token A holders)
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true, global = true)]
    pub alchemy_api_key: Option<String>,

    /// Moralis API key (token B holders)
    #[arg(long, env = "MORALIS_API_KEY", hide_env_values = true, global = true)]
    pub moralis_api_key: Option<String>,

    /// Airstack API key (social-capital ranking)
    #[arg(long, env = "AIRSTACK_API_KEY", hide_env_values = true, global = true)]
    pub airstack_api_key: Option<String>,

    /// Neynar API key (cast search, profiles)
    #[arg(long, env = "NEYNAR_API_KEY", hide_env_values = true, global = true)]
    pub neynar_api_key: Option<String>,

    /// Token A (NFT) contract address on Base
    #[arg(long, env = "TIPCAST_TOKEN_A_CONTRACT", global = true)]
    pub token_a_contract: Option<String>,

    /// Token B (ERC-20) contract address on Base
    #[arg(long, env = "TIPCAST_TOKEN_B_CONTRACT", global = true)]
    pub token_b_contract: Option<String>,

    /// Ticker searched for in casts, without the `$`
    #[arg(long, env = "TIPCAST_TOKEN_SYMBOL", default_value = "SPACE", global = true)]
    pub token_symbol: String,

    /// Total tokens allocated per day
    #[arg(long, env = "TIPCAST_DAILY_ALLOWANCE", default_value_t = AllocationParams::DEFAULT_DAILY_ALLOWANCE, global = true)]
    pub daily_allowance: u64,

    /// Token B balance required to be eligible
    #[arg(long, env = "TIPCAST_MIN_BALANCE", default_value_t = AllocationParams::DEFAULT_MIN_BALANCE, global = true)]
    pub min_balance: f64,

    /// Allocation season
    #[arg(long, env = "TIPCAST_SEASON", default_value_t = 1, global = true)]
    pub season: u32,

    /// Identities synced concurrently
    #[arg(long, env = "TIPCAST_SYNC_CONCURRENCY", default_value_t = 4, global = true)]
    pub sync_concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "TIPCAST_HTTP_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub http_timeout_secs: u64,

    /// Retries for transient provider failures
    #[arg(long, env = "TIPCAST_HTTP_MAX_RETRIES", default_value_t = 3, global = true)]
    pub http_max_retries: u32,
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{name} is not set"))
}

fn redact(value: &Option<String>) -> Value {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Value::String("<set>".into()),
        _ => Value::Null,
    }
}

impl Config {
    pub fn season(&self) -> Result<Season> {
        Ok(Season::try_from(self.season)?)
    }

    pub fn http(&self) -> HttpClientConfig {
        HttpClientConfig {
            retry: RetryConfig {
                max_retries: self.http_max_retries,
                ..Default::default()
            },
            request_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            token_symbol: self.token_symbol.clone(),
            concurrency: self.sync_concurrency,
            ..Default::default()
        }
    }

    pub async fn open_store(&self) -> Result<Arc<SqliteStorage>> {
        let store = SqliteStorage::open(&self.db)
            .await
            .with_context(|| format!("opening database {}", self.db))?;
        Ok(Arc::new(store))
    }

    /// Allocation service wired to Alchemy, Moralis and Airstack.
    pub fn allocator(&self) -> Result<Allocator> {
        let nft = AlchemyNftClient::new(
            require(&self.alchemy_api_key, "ALCHEMY_API_KEY")?,
            require(&self.token_a_contract, "TIPCAST_TOKEN_A_CONTRACT")?,
            self.http(),
        )?;
        let erc20 = MoralisClient::new(
            require(&self.moralis_api_key, "MORALIS_API_KEY")?,
            require(&self.token_b_contract, "TIPCAST_TOKEN_B_CONTRACT")?,
            self.http(),
        )?;
        let rankings = AirstackClient::new(require(&self.airstack_api_key, "AIRSTACK_API_KEY")?, self.http())?;

        Ok(Allocator::new(Arc::new(OnchainHolders { nft, erc20 }), Arc::new(rankings))
            .season(self.season()?)
            .daily_allowance(self.daily_allowance)
            .min_balance(self.min_balance))
    }

    pub fn neynar(&self) -> Result<Arc<NeynarClient>> {
        let client = NeynarClient::new(require(&self.neynar_api_key, "NEYNAR_API_KEY")?, self.http())?;
        Ok(Arc::new(client))
    }

    /// Effective configuration with secrets replaced by `"<set>"`.
    pub fn redacted(&self) -> Value {
        json!({
            "db": self.db,
            "alchemyApiKey": redact(&self.alchemy_api_key),
            "moralisApiKey": redact(&self.moralis_api_key),
            "airstackApiKey": redact(&self.airstack_api_key),
            "neynarApiKey": redact(&self.neynar_api_key),
            "tokenAContract": self.token_a_contract,
            "tokenBContract": self.token_b_contract,
            "tokenSymbol": self.token_symbol,
            "dailyAllowance": self.daily_allowance,
            "minBalance": self.min_balance,
            "season": self.season,
            "syncConcurrency": self.sync_concurrency,
            "httpTimeoutSecs": self.http_timeout_secs,
            "httpMaxRetries": self.http_max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["tipcast"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn defaults_match_library_defaults() {
        let c = parse(&[]);
        assert_eq!(c.daily_allowance, 50_000);
        assert_eq!(c.min_balance, 11_111.0);
        assert_eq!(c.token_symbol, "SPACE");
        assert_eq!(c.sync().concurrency, 4);
        assert_eq!(c.http().request_timeout, Duration::from_secs(30));
        assert!(c.season().is_ok());
    }

    #[test]
    fn unknown_season_rejected() {
        let c = parse(&["--season", "7"]);
        assert!(c.season().is_err());
    }

    #[test]
    fn secrets_are_redacted() {
        let c = parse(&["--alchemy-api-key", "super-secret", "--moralis-api-key", ""]);
        let v = c.redacted();
        assert_eq!(v["alchemyApiKey"], "<set>");
        assert!(v["moralisApiKey"].is_null());
        assert!(!v.to_string().contains("super-secret"));
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = require(&None, "NEYNAR_API_KEY").unwrap_err();
        assert_eq!(err.to_string(), "NEYNAR_API_KEY is not set");
    }
}
