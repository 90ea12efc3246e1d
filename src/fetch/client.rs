//! Tronscan HTTP client with retry, throttle backoff and identity rotation
//!
//! ## API Reference
//!
//! Transactions: `GET {base}/transaction`
//! - `address`, `start_timestamp`, `end_timestamp` (ms), `start` (offset),
//!   `limit` (page size), `sort=-timestamp`, `count=true`
//! - Returns: `{ "data": [...], "total": N }`
//!
//! Prices: `GET {base}/token/price`
//! - Returns: `{ "data": [{ "symbol", "priceInUsd", "volume24h", "percentChange24h" }] }`
//!
//! ## Failure classification
//!
//! - request/connect errors, body or JSON decode errors, 5xx, 408 → transient
//! - 429 and 403 (Tronscan's abuse detection) → throttled
//! - any other non-2xx → permanent

use super::error::FetchError;
use super::retry::{execute_with_retry, AttemptOutcome, RetryError, RetryPolicy};
use crate::config::BackfillConfig;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Client identities rotated per attempt
const USER_AGENTS: &[&str] = &[
    concat!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        " AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
    ),
    concat!(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
        " AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15"
    ),
    concat!(
        "Mozilla/5.0 (X11; Linux x86_64)",
        " AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
    ),
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    concat!(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
        " AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
    ),
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
];

/// One page of upstream transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default, rename = "data")]
    pub records: Vec<Value>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Paginated source of raw ledger records for one account
///
/// `window_start`/`window_end` are inclusive millisecond bounds.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn fetch_page(
        &self,
        window_start: i64,
        window_end: i64,
        page_size: u32,
        offset: u64,
    ) -> Result<Page, FetchError>;
}

pub struct TronscanClient {
    client: Client,
    base_url: String,
    wallet: String,
    policy: RetryPolicy,
}

impl TronscanClient {
    /// Build a client from runtime configuration (proxy, timeout, retry policy)
    pub fn new(config: &BackfillConfig) -> Result<Self, FetchError> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));

        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
            log::info!("🌐 Routing upstream requests through proxy");
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            wallet: config.wallet_address.clone(),
            policy: config.retry.clone(),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Current token prices; an empty list when the payload has no `data`
    pub async fn fetch_token_prices(&self) -> Result<Vec<Value>, FetchError> {
        let response: PriceResponse = self.get_json("token/price", &[]).await?;
        Ok(response.data)
    }

    /// GET `{base}/{path}` with retries, decoding the body as `T`
    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, FetchError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);

        let result = execute_with_retry(&self.policy, path, |attempt| {
            let url = url.clone();
            async move { self.attempt(&url, query, attempt).await }
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => FetchError::PageUnavailable {
                endpoint: path.to_string(),
                attempts,
                last_error: last_error.to_string(),
            },
            RetryError::Permanent { error, .. } => FetchError::Rejected {
                endpoint: path.to_string(),
                status: error.status,
            },
        })
    }

    async fn attempt<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> AttemptOutcome<T, AttemptError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let identity = next_identity();
        log::debug!("🔎 GET {} (attempt {})", url, attempt);

        let response = match self
            .client
            .get(url)
            .query(query)
            .header(header::USER_AGENT, identity)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Transient(AttemptError::request(e)),
        };

        match response.status() {
            code if code.is_success() => match response.json::<T>().await {
                Ok(body) => AttemptOutcome::Success(body),
                // An incomplete or garbled body is assumed to be a transient upstream problem
                Err(e) => AttemptOutcome::Transient(AttemptError::body(code, e)),
            },
            code @ (StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN) => {
                AttemptOutcome::Throttled(AttemptError::status(code))
            }
            code @ StatusCode::REQUEST_TIMEOUT => {
                AttemptOutcome::Transient(AttemptError::status(code))
            }
            code if code.is_server_error() => {
                AttemptOutcome::Transient(AttemptError::status(code))
            }
            code => AttemptOutcome::Permanent(AttemptError::status(code)),
        }
    }
}

#[async_trait]
impl LedgerSource for TronscanClient {
    async fn fetch_page(
        &self,
        window_start: i64,
        window_end: i64,
        page_size: u32,
        offset: u64,
    ) -> Result<Page, FetchError> {
        let query = [
            ("address", self.wallet.clone()),
            ("start_timestamp", window_start.to_string()),
            ("end_timestamp", window_end.to_string()),
            ("start", offset.to_string()),
            ("limit", page_size.to_string()),
            ("sort", "-timestamp".to_string()),
            ("count", "true".to_string()),
        ];

        self.get_json("transaction", &query).await
    }
}

/// Pick a client identity for the next attempt
fn next_identity() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Why one attempt failed; `status` is 0 when no response arrived
#[derive(Debug)]
struct AttemptError {
    status: u16,
    message: String,
}

impl AttemptError {
    fn request(e: reqwest::Error) -> Self {
        Self {
            status: 0,
            message: format!("request error: {}", e),
        }
    }

    fn body(code: StatusCode, e: reqwest::Error) -> Self {
        Self {
            status: code.as_u16(),
            message: format!("undecodable body: {}", e),
        }
    }

    fn status(code: StatusCode) -> Self {
        Self {
            status: code.as_u16(),
            message: format!("HTTP {}", code),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Instant;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    const WALLET: &str = "TRaH4GZtNiTXfooiufvYyVhAY7fuhUrs2v";

    fn test_client(uri: &str) -> TronscanClient {
        let mut config = BackfillConfig::new(WALLET, ":memory:");
        config.api_base_url = format!("{}/api", uri);
        config.retry = RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20));
        config.request_timeout_secs = 5;
        TronscanClient::new(&config).unwrap()
    }

    async fn respond_with(server: &MockServer, response: impl Respond + 'static) {
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn page_body(count: usize, total: u64) -> Value {
        let data: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "hash": format!("hash_{}", i),
                    "timestamp": 1_700_000_000_000i64 + i as i64
                })
            })
            .collect();
        json!({ "data": data, "total": total })
    }

    #[tokio::test]
    async fn test_fetch_page_sends_window_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .and(query_param("address", WALLET))
            .and(query_param("start_timestamp", "1000"))
            .and(query_param("end_timestamp", "2000"))
            .and(query_param("start", "50"))
            .and(query_param("limit", "50"))
            .and(query_param("sort", "-timestamp"))
            .and(query_param("count", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(3, 53)))
            .expect(1)
            .mount(&server)
            .await;

        let page = test_client(&server.uri())
            .fetch_page(1000, 2000, 50, 50)
            .await
            .unwrap();

        assert_eq!(page.records.len(), 3);
        assert_eq!(page.total, 53);
    }

    #[tokio::test]
    async fn test_missing_data_is_empty_page() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(200).set_body_json(json!({}))).await;

        let page = test_client(&server.uri()).fetch_page(0, 1, 50, 0).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_retry_after_forbidden_uses_throttle_delay() {
        let server = MockServer::start().await;
        let times: Mutex<u64> = Mutex::new(0);
        respond_with(&server, move |_: &Request| {
            let mut times = times.lock().unwrap();
            *times += 1;
            match *times {
                1 => ResponseTemplate::new(403),
                _ => ResponseTemplate::new(200).set_body_json(page_body(2, 2)),
            }
        })
        .await;

        let client = test_client(&server.uri());
        let (throttle_min, _) = client.policy().throttle_delay_range();

        let start = Instant::now();
        let page = client.fetch_page(0, 1, 50, 0).await.unwrap();

        assert_eq!(page.records.len(), 2);
        assert!(start.elapsed() >= throttle_min);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_into_unavailable() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(503)).await;

        let error = test_client(&server.uri())
            .fetch_page(0, 1, 50, 0)
            .await
            .unwrap_err();

        assert!(error.is_unavailable(), "{}", error);
        assert!(matches!(error, FetchError::PageUnavailable { attempts: 3, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_garbled_body_is_retried() {
        let server = MockServer::start().await;
        let times: Mutex<u64> = Mutex::new(0);
        respond_with(&server, move |_: &Request| {
            let mut times = times.lock().unwrap();
            *times += 1;
            match *times {
                1 => ResponseTemplate::new(200).set_body_string("{\"data\": [tru"),
                _ => ResponseTemplate::new(200).set_body_json(page_body(1, 1)),
            }
        })
        .await;

        let page = test_client(&server.uri()).fetch_page(0, 1, 50, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(400)).await;

        let error = test_client(&server.uri())
            .fetch_page(0, 1, 50, 0)
            .await
            .unwrap_err();

        assert!(matches!(error, FetchError::Rejected { status: 400, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_each_attempt_sends_known_identity() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(500)).await;

        let _ = test_client(&server.uri()).fetch_page(0, 1, 50, 0).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        for request in requests {
            let agent = request
                .headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            assert!(USER_AGENTS.contains(&agent.as_str()), "unexpected agent {}", agent);
        }
    }

    #[tokio::test]
    async fn test_fetch_token_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/token/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "symbol": "TRX",
                        "priceInUsd": 0.1,
                        "volume24h": 1000.0,
                        "percentChange24h": -1.2
                    }
                ]
            })))
            .mount(&server)
            .await;

        let prices = test_client(&server.uri()).fetch_token_prices().await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0]["symbol"], "TRX");
    }
}
