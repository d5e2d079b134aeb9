//! HTTP transport that absorbs "too many requests" responses.
//!
//! Every outgoing call carries the bot credential. A 429 is retried after the
//! delay the response asks for (plus jitter) up to a bounded number of times;
//! every other status is handed back to the caller untouched.

use std::time::Duration;

use http::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    header::{AUTHORIZATION, RETRY_AFTER},
};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{DiscordConfig, RateLimitConfig};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rate limited on {route}: gave up after {attempts} attempts")]
    RateLimitExceeded { route: String, attempts: u32 },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),
}

/// One call against the API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: Vec<String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
    max_retries: Option<u32>,
}

impl ApiRequest {
    /// `path` is a list of raw segments; each is percent-encoded on its own.
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            max_retries: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the configured retry budget for this call.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Method plus path, used to label logs and errors.
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path.join("/"))
    }
}

/// Shared by all purge runs; holds no per-call state.
#[derive(Clone)]
pub struct RateLimitedTransport {
    client: reqwest::Client,
    base_url: Url,
    authorization: HeaderValue,
    rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for RateLimitedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedTransport")
            .field("base_url", &self.base_url.as_str())
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

impl RateLimitedTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        authorization: &str,
        rate_limit: RateLimitConfig,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }

        let mut authorization = HeaderValue::from_str(authorization)
            .map_err(|_| TransportError::InvalidHeader("authorization"))?;
        authorization.set_sensitive(true);

        Ok(Self {
            client,
            base_url,
            authorization,
            rate_limit,
        })
    }

    /// Build a transport with its own connection pool from configuration.
    pub fn from_config(config: &DiscordConfig) -> Result<Self, TransportError> {
        let client = config.http_client.build_client()?;
        Self::new(
            client,
            &config.api_base_url,
            &config.authorization(),
            config.rate_limit.clone(),
        )
    }

    /// Send `request`, retrying while the API answers 429.
    ///
    /// Any other response, success or not, is returned as is. Once the retry
    /// budget is spent the call fails with [`TransportError::RateLimitExceeded`];
    /// there is no wait after the final 429.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, TransportError> {
        let url = self.url_for(request)?;
        let max_retries = request.max_retries.unwrap_or(self.rate_limit.max_retries);
        let max_attempts = max_retries.saturating_add(1);

        for attempt in 0..max_attempts {
            let mut builder = self
                .client
                .request(request.method.clone(), url.clone())
                .header(AUTHORIZATION, self.authorization.clone())
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status != StatusCode::TOO_MANY_REQUESTS {
                if attempt > 0 {
                    debug!(
                        route = %request.route(),
                        status = %status,
                        attempt = attempt + 1,
                        "Request succeeded after rate limit backoff"
                    );
                }
                return Ok(response);
            }

            if attempt + 1 == max_attempts {
                break;
            }

            let hint = match retry_after_from_headers(response.headers()) {
                Some(hint) => Some(hint),
                None => {
                    let body = response.bytes().await.unwrap_or_default();
                    retry_after_from_body(&body)
                }
            };
            let delay = self.rate_limit.backoff_delay(hint);
            warn!(
                route = %request.route(),
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, will retry after delay"
            );
            tokio::time::sleep(delay).await;
        }

        warn!(
            route = %request.route(),
            attempts = max_attempts,
            "Rate limit retries exhausted"
        );
        Err(TransportError::RateLimitExceeded {
            route: request.route(),
            attempts: max_attempts,
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(&request.path);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

/// Wait requested by a `retry-after` header, in seconds.
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    seconds(raw.trim().parse().ok()?)
}

/// Wait requested by a `retry_after` field in a JSON body, in seconds.
///
/// The field may be a number or a numeric string.
pub fn retry_after_from_body(body: &[u8]) -> Option<Duration> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let secs = match value.get("retry_after")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    seconds(secs)
}

/// Waits too long to represent saturate; `backoff_delay` caps them anyway.
fn seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rstest::rstest;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;
    use crate::discord::test_utils::SequentialResponder;

    fn transport(server: &MockServer) -> RateLimitedTransport {
        RateLimitedTransport::new(
            reqwest::Client::new(),
            &server.uri(),
            "Bot test-token",
            RateLimitConfig::default(),
        )
        .unwrap()
    }

    /// `u64::MAX` stands for a wait too long to represent.
    fn expected(ms: u64) -> Duration {
        if ms == u64::MAX {
            Duration::MAX
        } else {
            Duration::from_millis(ms)
        }
    }

    #[rstest]
    #[case::integer("2", Some(2000))]
    #[case::fractional("0.5", Some(500))]
    #[case::padded(" 3 ", Some(3000))]
    #[case::negative("-1", None)]
    #[case::out_of_range("1e30", Some(u64::MAX))]
    #[case::http_date("Wed, 21 Oct 2015 07:28:00 GMT", None)]
    fn test_retry_after_from_headers(#[case] raw: &str, #[case] expected_ms: Option<u64>) {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(raw).unwrap());
        assert_eq!(retry_after_from_headers(&headers), expected_ms.map(expected));
    }

    #[test]
    fn test_retry_after_header_absent() {
        assert_eq!(retry_after_from_headers(&HeaderMap::new()), None);
    }

    #[rstest]
    #[case::number(r#"{"retry_after": 1.5}"#, Some(1500))]
    #[case::string(r#"{"retry_after": "2"}"#, Some(2000))]
    #[case::missing(r#"{"message": "You are being rate limited."}"#, None)]
    #[case::not_numeric(r#"{"retry_after": "soon"}"#, None)]
    #[case::negative(r#"{"retry_after": -3}"#, None)]
    #[case::out_of_range(r#"{"retry_after": 1e30}"#, Some(u64::MAX))]
    #[case::not_json("slow down", None)]
    fn test_retry_after_from_body(#[case] body: &str, #[case] expected_ms: Option<u64>) {
        assert_eq!(retry_after_from_body(body.as_bytes()), expected_ms.map(expected));
    }

    #[tokio::test]
    async fn test_retries_after_header_delay() {
        let server = MockServer::start().await;
        let responder = SequentialResponder::new(vec![
            ResponseTemplate::new(429).insert_header("retry-after", "2"),
            ResponseTemplate::new(200).set_body_json(json!([])),
        ]);
        Mock::given(method("GET"))
            .and(path("/channels/1/messages"))
            .respond_with(responder.clone())
            .mount(&server)
            .await;

        let started = Instant::now();
        let response = transport(&server)
            .send(&ApiRequest::new(Method::GET, ["channels", "1", "messages"]))
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(responder.call_count(), 2);
        assert!(elapsed >= Duration::from_millis(2000), "waited {elapsed:?}");
        // Jitter stays under 200 ms; the rest is slack for a loaded test host.
        assert!(elapsed < Duration::from_millis(3000), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_capped() {
        let server = MockServer::start().await;
        let responder = SequentialResponder::new(vec![
            ResponseTemplate::new(429).set_body_json(json!({"retry_after": 1e30})),
            ResponseTemplate::new(204),
        ]);
        Mock::given(method("DELETE"))
            .respond_with(responder.clone())
            .mount(&server)
            .await;

        let transport = RateLimitedTransport::new(
            reqwest::Client::new(),
            &server.uri(),
            "Bot test-token",
            RateLimitConfig {
                default_retry_after_ms: 100,
                max_retry_after_ms: 100,
                max_jitter_ms: 10,
                ..Default::default()
            },
        )
        .unwrap();

        let started = Instant::now();
        let response = transport
            .send(&ApiRequest::new(Method::DELETE, ["channels", "1", "messages", "2"]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(responder.call_count(), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_max_retry_budget_still_sends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server)
            .send(&ApiRequest::new(Method::GET, ["channels", "1", "messages"]).max_retries(u32::MAX))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_retries_after_body_delay() {
        let server = MockServer::start().await;
        let responder = SequentialResponder::new(vec![
            ResponseTemplate::new(429).set_body_json(json!({"retry_after": "0.3", "global": false})),
            ResponseTemplate::new(204),
        ]);
        Mock::given(method("DELETE"))
            .respond_with(responder.clone())
            .mount(&server)
            .await;

        let started = Instant::now();
        let response = transport(&server)
            .send(&ApiRequest::new(Method::DELETE, ["channels", "1", "messages", "2"]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(responder.call_count(), 2);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 0.01})))
            .expect(3)
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&ApiRequest::new(Method::GET, ["channels", "1", "messages"]).max_retries(2))
            .await
            .unwrap_err();

        match err {
            TransportError::RateLimitExceeded { route, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(route, "GET channels/1/messages");
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server)
            .send(&ApiRequest::new(Method::GET, ["channels", "1", "messages"]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text().await.unwrap(), "oops");
    }

    #[tokio::test]
    async fn test_sends_credentials_query_and_encoded_segments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/a%2Fb/messages"))
            .and(query_param("limit", "100"))
            .and(header("authorization", "Bot test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let transport = RateLimitedTransport::new(
            reqwest::Client::new(),
            &format!("{}/api/v10", server.uri()),
            "Bot test-token",
            RateLimitConfig::default(),
        )
        .unwrap();

        let response = transport
            .send(&ApiRequest::new(Method::GET, ["channels", "a/b", "messages"]).query("limit", "100"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_rejects_relative_base_url() {
        let err = RateLimitedTransport::new(
            reqwest::Client::new(),
            "not a url",
            "Bot x",
            RateLimitConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let transport = RateLimitedTransport::new(
            reqwest::Client::new(),
            "https://discord.com/api/v10",
            "Bot secret-token",
            RateLimitConfig::default(),
        )
        .unwrap();
        assert!(!format!("{transport:?}").contains("secret-token"));
    }
}
