//! Shared HTTP plumbing: retry policy and a JSON client backed by `reqwest`.
//!
//! Every provider request goes through [`JsonClient::send`], which retries
//! transient failures (transport errors, timeouts, 429, 5xx) with capped
//! exponential backoff. Other 4xx responses fail immediately.

use std::time::Duration;

use serde::de::DeserializeOwned;

use tipcast_core::error::EngineError;

use crate::error::HttpError;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Initial backoff delay.
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    pub multiplier: f64,
    /// Extra delay as a fraction of the backoff (0.0 = none).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

/// Stateless retry policy; computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once
    /// `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);
        let jitter_ms = capped * self.config.jitter_fraction * 0.5;

        Some(Duration::from_millis((capped + jitter_ms) as u64))
    }
}

/// Configuration shared by all provider clients.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-over-HTTP client for one provider.
pub struct JsonClient {
    provider: &'static str,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl JsonClient {
    /// Build a client tagged with `provider` (used in errors and logs).
    pub fn new(provider: &'static str, config: HttpClientConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("tipcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::provider(provider, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
        })
    }

    /// Name of the provider this client talks to.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Send the request produced by `build`, retrying transient failures, and
    /// decode the JSON body.
    ///
    /// `build` is called once per attempt since a sent request is consumed.
    pub async fn send<T, F>(&self, build: F) -> Result<T, EngineError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(build(&self.http)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            provider = self.provider,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(provider = self.provider, attempt, error = %e, "max retries exceeded");
                        return Err(e.into_engine(self.provider));
                    }
                },
                Err(e) => return Err(e.into_engine(self.provider)),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, HttpError> {
        let resp = req.send().await.map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn classify(&self, e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            HttpError::Decode(e.to_string())
        } else {
            // Strip the URL: some providers carry the API key in the path.
            HttpError::Transport(e.without_url().to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
