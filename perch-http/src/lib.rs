//! Minimal HTTP client with safe logging, bounded retries, and header auth.
//!
//! - Request options: `Auth`, query params, timeout
//! - Never logs secret values; API key headers and secret-like query params are redacted
//! - Retries network failures and 5xx with exponential backoff
//! - Treats 429 as a scheduled wait honouring `Retry-After`, on a separate budget
//! - Optional *raw* response logging via `PERCH_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), perch_http::HttpError> {
//! let client = perch_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", perch_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

pub use reqwest::StatusCode;

const RAW_ENV: &str = "PERCH_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "apikey",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_PARAMS.contains(&lower.as_str()) || lower == "x-api-key"
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if is_secret_name(&key) || *k == reqwest::header::AUTHORIZATION {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: usize },
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("rate limited, gave up after {waits} wait(s)")]
    RateLimited { waits: usize },
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// Status code for API errors, `None` otherwise.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the failure came from exhausting a retry budget on a
    /// condition that might succeed later (network, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network { .. } | HttpError::RateLimited { .. } => true,
            HttpError::Api { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

// ==============================
// Auth, retry policy & request options
// ==============================

/// Authentication strategies supported by the client.
///
/// ```
/// use perch_http::Auth;
///
/// let auth = Auth::Header { name: "X-API-Key", value: "secret" };
/// assert_eq!(auth.kind(), "header");
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Custom header carrying an API key (e.g. `X-API-Key`).
    Header { name: &'static str, value: &'a str },
    /// Auth via query param.
    Query { name: &'a str, value: Cow<'a, str> },
    None,
}

impl Auth<'_> {
    /// Label used in logs in place of the secret.
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Bounds on how long a single logical request may keep trying.
///
/// Transient failures (network, 5xx) consume `max_retries`; 429 responses
/// consume `max_rate_limit_waits` and wait for `Retry-After` when the
/// server sends one.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub max_rate_limit_waits: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Wait used for 429 when no `Retry-After` header is present.
    pub rate_limit_backoff: Duration,
    /// Upper bound on a single `Retry-After` wait.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_rate_limit_waits: 10,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_secs(6),
            max_rate_limit_wait: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given 1-based retry attempt, capped at `max_backoff`.
    ///
    /// ```
    /// use perch_http::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(200));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(800));
    /// assert_eq!(policy.backoff(40), policy.max_backoff);
    /// ```
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Per-request tuning knobs.
///
/// ```
/// use perch_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     query: Some(vec![("userName", Cow::Borrowed("alice"))]),
///     auth: Some(Auth::Header { name: "X-API-Key", value: "demo" }),
/// };
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use perch_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.retry.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GET JSON with per-request options.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;

        let mut query: Vec<(&str, Cow<'_, str>)> = opts.query.clone().unwrap_or_default();
        let mut headers = HeaderMap::new();
        match &opts.auth {
            Some(Auth::Header { name, value }) => {
                let key = sanitize_api_key(value)?;
                let value =
                    HeaderValue::from_str(&key).map_err(|e| HttpError::Build(e.to_string()))?;
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| HttpError::Build(e.to_string()))?;
                headers.insert(name, value);
            }
            Some(Auth::Query { name, value }) => query.push((*name, value.clone())),
            Some(Auth::None) | None => {}
        }
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let redacted_q: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| {
                let v = if is_secret_name(k) {
                    "<redacted>".to_string()
                } else {
                    v.to_string()
                };
                ((*k).to_string(), v)
            })
            .collect();

        let policy = &self.retry;
        let mut retries = 0usize;
        let mut rate_waits = 0usize;

        loop {
            let attempt = retries + rate_waits + 1;
            let req_id = format!(
                "r{:x}",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            );

            tracing::debug!(
                req_id=%req_id,
                attempt,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query=?redacted_q,
                timeout_ms=timeout.as_millis() as u64,
                auth_kind,
                "http.request.start"
            );

            let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
            let rb = self
                .inner
                .get(url.clone())
                .timeout(timeout)
                .headers(headers.clone())
                .query(&pairs);

            let t0 = std::time::Instant::now();
            let sent = match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let resp_headers = resp.headers().clone();
                    resp.bytes()
                        .await
                        .map(|bytes| (status, resp_headers, bytes))
                }
                Err(err) => Err(err),
            };

            let (status, resp_headers, bytes) = match sent {
                Ok(parts) => parts,
                Err(err) => {
                    let message = err.to_string();
                    if retries < policy.max_retries {
                        retries += 1;
                        let delay = policy.backoff(retries);
                        tracing::warn!(
                            req_id=%req_id,
                            retries,
                            max_retries=policy.max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            timeout=err.is_timeout(),
                            message=%message,
                            "http.retrying.network"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%message, "http.network_error");
                    return Err(HttpError::Network {
                        message,
                        attempts: attempt,
                    });
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            let request_id = resp_headers
                .get("x-request-id")
                .or_else(|| resp_headers.get("x-correlation-id"))
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=bytes.len(),
                x_request_id=%request_id,
                "http.response.headers"
            );

            if raw_enabled() {
                let mut body = bytes.to_vec();
                let truncated = body.len() > RAW_MAX_BODY;
                body.truncate(RAW_MAX_BODY);
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    %status,
                    headers=?redact_headers(&resp_headers),
                    body=%String::from_utf8_lossy(&body),
                    truncated
                );
            }

            let snippet = snip_body(&bytes);

            if status.is_success() {
                return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                    tracing::warn!(
                        req_id=%req_id,
                        serde_line=%e.line(),
                        serde_col=%e.column(),
                        serde_err=%e,
                        body_snippet=%snippet,
                        "http.response.decode_error"
                    );
                    HttpError::Decode(e.to_string(), snippet)
                });
            }

            let message = extract_error_message(&bytes);

            if status == StatusCode::TOO_MANY_REQUESTS {
                if rate_waits < policy.max_rate_limit_waits {
                    rate_waits += 1;
                    let retry_after = retry_after_delay_secs(&resp_headers);
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(policy.rate_limit_backoff)
                        .min(policy.max_rate_limit_wait);
                    tracing::info!(
                        req_id=%req_id,
                        rate_waits,
                        max_rate_limit_waits=policy.max_rate_limit_waits,
                        wait_ms=delay.as_millis() as u64,
                        retry_after_secs=?retry_after,
                        "http.rate_limited.waiting"
                    );
                    sleep(delay).await;
                    continue;
                }
                tracing::warn!(req_id=%req_id, rate_waits, message=%message, "http.rate_limited.exhausted");
                return Err(HttpError::RateLimited { waits: rate_waits });
            }

            if status.is_server_error() && retries < policy.max_retries {
                retries += 1;
                let delay = policy.backoff(retries);
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    retries,
                    max_retries=policy.max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    message=%message,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(
                req_id=%req_id,
                %status,
                message=%message,
                x_request_id=%request_id,
                body_snippet=%snippet,
                "http.error"
            );
            return Err(HttpError::Api {
                status,
                message,
                request_id,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn extract_error_message(body: &[u8]) -> String {
    // {"errors":[{"message":"...", "detail":"..."}]}
    #[derive(Deserialize)]
    struct Errors {
        errors: Vec<Detail>,
    }
    // {"message":"..."} / {"msg":"..."} / {"detail":"..."} / {"error":"..."}
    #[derive(Deserialize, Default)]
    struct Detail {
        #[serde(default)]
        message: String,
        #[serde(default)]
        msg: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    fn first_non_empty(d: Detail) -> Option<String> {
        [d.message, d.msg, d.detail, d.error]
            .into_iter()
            .find(|s| !s.is_empty())
    }

    if let Ok(list) = serde_json::from_slice::<Errors>(body) {
        if let Some(msg) = list.errors.into_iter().next().and_then(first_non_empty) {
            return msg;
        }
    }
    if let Ok(d) = serde_json::from_slice::<Detail>(body) {
        if let Some(msg) = first_non_empty(d) {
            return msg;
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_MAX {
        let mut cut = SNIPPET_MAX;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if s.is_empty() {
        return Err(HttpError::Build("API key is empty".into()));
    }
    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_quotes_and_whitespace() {
        assert_eq!(sanitize_api_key(" 'ab c\n' ").unwrap(), "abc");
        assert!(sanitize_api_key("  ").is_err());
        assert!(sanitize_api_key("kéy").is_err());
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(
            extract_error_message(br#"{"status":"error","msg":"user not found"}"#),
            "user not found"
        );
        assert_eq!(
            extract_error_message(br#"{"errors":[{"detail":"nope"}]}"#),
            "nope"
        );
        assert_eq!(extract_error_message(b"plain text"), "plain text");
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "推".repeat(400);
        let snip = snip_body(body.as_bytes());
        assert!(snip.ends_with("..."));
        assert!(snip.len() <= SNIPPET_MAX + 3);
    }

    #[test]
    fn api_key_header_is_redacted() {
        let mut h = HeaderMap::new();
        h.insert("x-api-key", HeaderValue::from_static("secret"));
        h.insert("content-type", HeaderValue::from_static("json"));
        let redacted = redact_headers(&h);
        assert!(redacted.contains(&("x-api-key".into(), "<redacted>".into())));
        assert!(redacted.contains(&("content-type".into(), "json".into())));
    }

    #[test]
    fn transient_classification() {
        let e = HttpError::Api {
            status: StatusCode::BAD_GATEWAY,
            message: String::new(),
            request_id: "-".into(),
        };
        assert!(e.is_transient());
        let e = HttpError::Api {
            status: StatusCode::NOT_FOUND,
            message: String::new(),
            request_id: "-".into(),
        };
        assert!(!e.is_transient());
        assert_eq!(e.status(), Some(StatusCode::NOT_FOUND));
    }
}
