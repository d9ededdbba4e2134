use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use sentiment_core::{FetchError, NewsItem, NewsSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod clock;
pub use clock::{RetryClock, TokioClock};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Connection and retry policy for the Finnhub client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub api_key: String,
    pub base_url: String,
    /// Attempts allowed per failure path (rate limits and network errors are counted separately).
    pub max_attempts: u32,
    /// First network-failure backoff; doubles after each failed attempt.
    pub base_backoff: Duration,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// Wait used on 429 when the provider sends no usable `Retry-After`.
    pub default_retry_after: Duration,
}

impl FetchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            default_retry_after: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// What a single round trip produced.
#[derive(Debug)]
enum Attempt {
    Done(Vec<NewsItem>),
    RateLimited { retry_after: Duration },
    Unreachable(reqwest::Error),
    Failed(FetchError),
}

#[derive(Clone)]
pub struct FinnhubClient {
    config: FetchConfig,
    client: Client,
    clock: Arc<dyn RetryClock>,
}

impl FinnhubClient {
    pub fn new(config: FetchConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: FetchConfig, clock: Arc<dyn RetryClock>) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client, clock }
    }

    /// Get company news for `symbol` published between `from` and `to` (inclusive).
    ///
    /// 429 responses are retried after the provider's `Retry-After` delay, and
    /// requests that never got a response are retried with exponential backoff.
    /// Any other non-2xx status fails immediately.
    pub async fn get_company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<NewsItem>, FetchError> {
        let url = format!("{}/company-news", self.config.base_url);
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let max_attempts = self.config.max_attempts.max(1);

        let mut rate_limited = 0u32;
        let mut unreachable = 0u32;
        let mut backoff = self.config.base_backoff;

        loop {
            let request = self.client.get(&url).query(&[
                ("symbol", symbol),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("token", self.config.api_key.as_str()),
            ]);

            tracing::debug!(
                "Finnhub company-news {} {}..{} (rate limited {}, unreachable {})",
                symbol, from, to, rate_limited, unreachable
            );

            match self.attempt(request).await {
                Attempt::Done(mut items) => {
                    if let Some(limit) = limit {
                        items.truncate(limit);
                    }
                    tracing::debug!("Finnhub returned {} items for {}", items.len(), symbol);
                    return Ok(items);
                }
                Attempt::RateLimited { retry_after } => {
                    rate_limited += 1;
                    if rate_limited >= max_attempts {
                        return Err(FetchError::RateLimited {
                            attempts: rate_limited,
                            retry_after_secs: retry_after.as_secs(),
                        });
                    }
                    tracing::warn!(
                        "Finnhub 429 rate limited, waiting {}s before retry {}/{}",
                        retry_after.as_secs_f64(), rate_limited, max_attempts - 1
                    );
                    self.clock.sleep(retry_after).await;
                }
                Attempt::Unreachable(err) => {
                    unreachable += 1;
                    let cause = error_chain(&err);
                    if unreachable >= max_attempts {
                        return Err(FetchError::ConnectionFailed {
                            attempts: unreachable,
                            message: cause,
                        });
                    }
                    tracing::warn!(
                        "Finnhub unreachable ({}), backing off {:.1}s before retry {}/{}",
                        cause, backoff.as_secs_f64(), unreachable, max_attempts - 1
                    );
                    self.clock.sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Attempt::Failed(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, request: RequestBuilder) -> Attempt {
        let response = match request.send().await {
            Ok(response) => response,
            // the URL carries the token
            Err(e) => return Attempt::Unreachable(e.without_url()),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(response.headers())
                .unwrap_or(self.config.default_retry_after);
            return Attempt::RateLimited { retry_after };
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Failed(FetchError::UpstreamError {
                status: status.as_u16(),
                details: error_details(&body),
            });
        }

        match response.text().await {
            Ok(body) => match parse_news(&body) {
                Ok(items) => Attempt::Done(items),
                Err(e) => Attempt::Failed(e),
            },
            Err(e) => Attempt::Unreachable(e.without_url()),
        }
    }
}

#[async_trait]
impl NewsSource for FinnhubClient {
    async fn company_news(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<NewsItem>, FetchError> {
        self.get_company_news(ticker, from, to, limit).await
    }
}

/// Seconds form of `Retry-After`; the HTTP-date form is not honoured.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// `err` followed by each of its sources, so a bare "error sending request"
/// keeps the timeout or refusal behind it.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Provider diagnostics: compact JSON when the body is JSON, raw text otherwise.
fn error_details(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn parse_news(body: &str) -> Result<Vec<NewsItem>, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("body is not JSON ({})", e)))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value::<NewsItem>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::MalformedResponse(format!("invalid news item ({})", e))),
        other => {
            let mut shown = other.to_string();
            if shown.len() > 200 {
                let cut = (0..=200).rev().find(|i| shown.is_char_boundary(*i)).unwrap_or(0);
                shown.truncate(cut);
                shown.push_str("...");
            }
            Err(FetchError::MalformedResponse(shown))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::{HeaderValue, StatusCode as HttpStatus},
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingClock {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingClock {
        fn waits(&self) -> Vec<Duration> {
            self.waits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RetryClock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    #[derive(Clone)]
    struct Reply {
        status: u16,
        retry_after: Option<&'static str>,
        body: String,
    }

    impl Reply {
        fn ok(body: &str) -> Self {
            Self { status: 200, retry_after: None, body: body.to_string() }
        }

        fn status(status: u16, body: &str) -> Self {
            Self { status, retry_after: None, body: body.to_string() }
        }

        fn throttled(retry_after: Option<&'static str>) -> Self {
            Self { status: 429, retry_after, body: String::new() }
        }
    }

    /// Provider stand-in that plays back replies in order, repeating the last one.
    struct Script {
        replies: Vec<Reply>,
        hits: AtomicUsize,
        last_query: Mutex<HashMap<String, String>>,
    }

    impl Script {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn company_news(
        State(script): State<Arc<Script>>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        let n = script.hits.fetch_add(1, Ordering::SeqCst);
        *script.last_query.lock().unwrap() = query;
        let reply = script
            .replies
            .get(n)
            .or(script.replies.last())
            .cloned()
            .unwrap();

        let mut response =
            (HttpStatus::from_u16(reply.status).unwrap(), reply.body).into_response();
        if let Some(secs) = reply.retry_after {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static(secs));
        }
        response
    }

    async fn serve(replies: Vec<Reply>) -> (String, Arc<Script>) {
        let script = Arc::new(Script {
            replies,
            hits: AtomicUsize::new(0),
            last_query: Mutex::new(HashMap::new()),
        });
        let app = Router::new()
            .route("/company-news", get(company_news))
            .with_state(script.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), script)
    }

    fn client(base_url: &str) -> (FinnhubClient, Arc<RecordingClock>) {
        let clock = Arc::new(RecordingClock::default());
        let mut config = FetchConfig::new("test-key").with_base_url(base_url);
        config.request_timeout = Duration::from_secs(2);
        (FinnhubClient::with_clock(config, clock.clone()), clock)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    const TWO_ITEMS: &str = r#"[
        {"datetime": 1709900000, "headline": "Apple beats estimates", "summary": "Strong quarter", "related": "AAPL", "id": 1},
        {"datetime": 1709800000, "headline": "Apple faces probe", "summary": "", "related": "AAPL", "id": 2}
    ]"#;

    #[tokio::test]
    async fn test_rate_limit_then_success_waits_once() {
        let (base, script) = serve(vec![Reply::throttled(Some("1")), Reply::ok(TWO_ITEMS)]).await;
        let (client, clock) = client(&base);

        let items = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].headline.as_deref(), Some("Apple beats estimates"));
        assert_eq!(clock.waits(), vec![Duration::from_secs(1)]);
        assert_eq!(script.hits(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_without_header_uses_default_wait() {
        let (base, _script) = serve(vec![Reply::throttled(None), Reply::ok("[]")]).await;
        let (client, clock) = client(&base);

        let items = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap();

        assert!(items.is_empty());
        assert_eq!(clock.waits(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_budget() {
        let (base, script) = serve(vec![Reply::throttled(Some("2"))]).await;
        let (client, clock) = client(&base);

        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();

        assert_eq!(err, FetchError::RateLimited { attempts: 3, retry_after_secs: 2 });
        assert_eq!(clock.waits(), vec![Duration::from_secs(2), Duration::from_secs(2)]);
        assert_eq!(script.hits(), 3);
    }

    #[tokio::test]
    async fn test_network_failures_back_off_exponentially() {
        // Grab a free port, then close it so every connect is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, clock) = client(&format!("http://{}", addr));
        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();

        match &err {
            FetchError::ConnectionFailed { attempts, message } => {
                assert_eq!(*attempts, 3);
                assert!(message.starts_with("error sending request: "), "{message}");
            }
            other => panic!("expected ConnectionFailed, got {other:?}"),
        }
        assert!(!err.to_string().contains("test-key"));
        assert_eq!(clock.waits(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_timeouts_back_off_like_network_failures() {
        async fn stalled() -> &'static str {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "[]"
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/company-news", get(stalled)))
                .await
                .unwrap();
        });

        let clock = Arc::new(RecordingClock::default());
        let mut config = FetchConfig::new("test-key").with_base_url(format!("http://{}", addr));
        config.request_timeout = Duration::from_millis(200);
        let client = FinnhubClient::with_clock(config, clock.clone());

        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();

        match err {
            FetchError::ConnectionFailed { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("expected ConnectionFailed, got {other:?}"),
        }
        assert_eq!(clock.waits(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_odd_field_types_do_not_drop_the_batch() {
        let body = r#"[
            {"datetime": 1709900000, "headline": "Apple beats estimates", "summary": "Strong quarter"},
            {"datetime": 1709800000.0, "headline": "Apple faces probe", "summary": null},
            {"datetime": "2024-03-07", "headline": 12345, "related": "AAPL"}
        ]"#;
        let (base, _script) = serve(vec![Reply::ok(body)]).await;
        let (client, _clock) = client(&base);

        let items = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].headline.as_deref(), Some("Apple beats estimates"));
        assert_eq!(items[1].datetime, Some(serde_json::json!(1709800000.0)));
        assert!(items[1].summary.is_none());
        assert_eq!(items[2].datetime, Some(serde_json::json!("2024-03-07")));
        assert_eq!(items[2].headline.as_deref(), Some("12345"));
    }

    #[test]
    fn test_error_chain_joins_sources() {
        #[derive(Debug)]
        struct Outer(std::io::Error);

        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("error sending request")
            }
        }

        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&err), "error sending request: connection refused");
    }

    #[tokio::test]
    async fn test_http_error_is_not_retried() {
        let (base, script) = serve(vec![Reply::status(500, r#"{"error": "boom"}"#)]).await;
        let (client, clock) = client(&base);

        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::UpstreamError { status: 500, details: r#"{"error":"boom"}"#.to_string() }
        );
        assert_eq!(script.hits(), 1);
        assert!(clock.waits().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_falls_back_to_raw_text() {
        let (base, _script) = serve(vec![Reply::status(403, "You don't have access to this resource.")]).await;
        let (client, _clock) = client(&base);

        let err = client.get_company_news("ZZZZ", day(1), day(8), None).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::UpstreamError {
                status: 403,
                details: "You don't have access to this resource.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_non_list_body_is_malformed() {
        let (base, script) = serve(vec![Reply::ok(r#"{"error": "unexpected"}"#)]).await;
        let (client, clock) = client(&base);

        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();

        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert_eq!(script.hits(), 1);
        assert!(clock.waits().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let (base, _script) = serve(vec![Reply::ok("<html>gateway</html>")]).await;
        let (client, _clock) = client(&base);

        let err = client.get_company_news("AAPL", day(1), day(8), None).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_limit_keeps_provider_order() {
        let body = serde_json::to_string(
            &(1..=5)
                .map(|id| serde_json::json!({"id": id, "headline": format!("item {}", id)}))
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let (base, _script) = serve(vec![Reply::ok(&body)]).await;
        let (client, _clock) = client(&base);

        let items = client.get_company_news("AAPL", day(1), day(8), Some(3)).await.unwrap();

        let headlines: Vec<_> = items.iter().filter_map(|i| i.headline.clone()).collect();
        assert_eq!(headlines, vec!["item 1", "item 2", "item 3"]);
    }

    #[tokio::test]
    async fn test_request_carries_symbol_dates_and_token() {
        let (base, script) = serve(vec![Reply::ok("[]")]).await;
        let (client, _clock) = client(&base);

        client.get_company_news("MSFT", day(1), day(8), None).await.unwrap();

        let query = script.last_query.lock().unwrap().clone();
        assert_eq!(query.get("symbol").map(String::as_str), Some("MSFT"));
        assert_eq!(query.get("from").map(String::as_str), Some("2024-03-01"));
        assert_eq!(query.get("to").map(String::as_str), Some("2024-03-08"));
        assert_eq!(query.get("token").map(String::as_str), Some("test-key"));
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "5".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(5)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }
}
