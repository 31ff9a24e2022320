//! HTTP transport for the crawl: user agent, retries, pacing and caching.
//!
//! - Request options: headers, timeout, retries
//! - Retries network errors, 408, 429 and 5xx with exponential backoff and
//!   `Retry-After` support
//! - Optional AutoThrottle pacing per host (see [`throttle`])
//! - Optional on-disk response cache (see [`cache`])
//! - Optional *raw* request/response logging via `STAYMAP_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), staymap_http::HttpError> {
//! let client = staymap_http::HttpClient::new("staymap/0.1")?;
//! let url = url::Url::parse("https://www.booking.com/searchresults.html?ss=Rouen").unwrap();
//! let html = client
//!     .get_text(&url, staymap_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Non-success statuses are never fatal here: [`HttpClient::get_page`] hands
//! them back as a [`Page`], and [`HttpClient::get_text`] reports them as
//! [`HttpError::Status`] so callers can tell them apart from transport
//! failures.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), cache hits, retries and final
//! errors, plus raw request/response lines (target `http.raw`) when enabled.

pub mod cache;
pub mod throttle;

use crate::cache::HttpCache;
use crate::throttle::AutoThrottle;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use staymap_config::StaymapConfig;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use url::Url;
use uuid::Uuid;

pub use reqwest::StatusCode as HttpStatus;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "STAYMAP_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug, with cookies redacted.
fn make_curl(method: &Method, url: &Url, user_agent: &str, headers: &HeaderMap) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    parts.push(format!("-A '{}'", user_agent.replace('\'', r"'\''")));
    for (name, value) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, value.replace('\'', r"'\''")));
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact session headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("cookie")
                || key.eq_ignore_ascii_case("set-cookie")
                || key.eq_ignore_ascii_case("authorization")
            {
                val = "<redacted>".into();
            }
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
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status} for {url}: {message}")]
    Status {
        status: StatusCode,
        url: String,
        message: String,
    },
    #[error("cache error: {0}")]
    Cache(String),
}

impl HttpError {
    /// The HTTP status, when the failure was a non-success response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ==============================
// Request Options & Page
// ==============================

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use staymap_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.headers.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
}

/// A fetched document, whatever its status.
#[derive(Clone, Debug)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
    pub from_cache: bool,
}

impl Page {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    pub default_timeout: Duration,
    pub max_retries: usize,
    throttle: Option<Arc<AutoThrottle>>,
    cache: Option<Arc<HttpCache>>,
}

impl HttpClient {
    /// Construct a client that identifies itself with `user_agent`.
    ///
    /// ```no_run
    /// use staymap_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("Mozilla/5.0")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            user_agent: user_agent.to_string(),
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
            throttle: None,
            cache: None,
        })
    }

    /// Build the engine transport described by a crawl configuration.
    pub fn from_config(cfg: &StaymapConfig) -> Result<Self, HttpError> {
        let mut client = Self::new(&cfg.user_agent)?
            .with_timeout(cfg.http.timeout())
            .with_retries(cfg.http.retries);
        if let Some(throttle) = AutoThrottle::from_config(&cfg.autothrottle) {
            client = client.with_throttle(throttle);
        }
        if let Some(cache) = HttpCache::from_config(&cfg.http_cache) {
            client = client.with_cache(cache);
        }
        Ok(client)
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_throttle(mut self, throttle: AutoThrottle) -> Self {
        self.throttle = Some(Arc::new(throttle));
        self
    }

    pub fn with_cache(mut self, cache: HttpCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn throttle(&self) -> Option<&AutoThrottle> {
        self.throttle.as_deref()
    }

    /// GET a page and return its body text; non-2xx becomes [`HttpError::Status`].
    pub async fn get_text(&self, url: &Url, opts: RequestOpts) -> Result<String, HttpError> {
        let page = self.get_page(url, opts).await?;
        if page.is_success() {
            return Ok(page.body);
        }
        Err(HttpError::Status {
            status: page.status,
            url: page.url.to_string(),
            message: snip_body(page.body.as_bytes()),
        })
    }

    /// GET a page, consulting the cache first. Any HTTP status is returned as a [`Page`].
    ///
    /// A cached page carries the URL the original response was served from,
    /// so redirects look the same on a cached run as on a fresh one.
    pub async fn get_page(&self, url: &Url, opts: RequestOpts) -> Result<Page, HttpError> {
        if let Some(cache) = &self.cache {
            match cached_page(cache, url).await {
                Ok(Some(page)) => {
                    tracing::debug!(
                        url = %url,
                        final_url = %page.url,
                        status = %page.status,
                        "http.cache.hit"
                    );
                    return Ok(page);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "http.cache.read_failed");
                }
            }
        }

        let page = self.fetch(Method::GET, url, &opts).await?;

        if let Some(cache) = &self.cache {
            match cache
                .store(url, &page.url, page.status.as_u16(), &page.body)
                .await
            {
                Ok(true) => tracing::trace!(url = %url, "http.cache.stored"),
                Ok(false) => {
                    tracing::trace!(url = %url, status = %page.status, "http.cache.skipped")
                }
                Err(err) => tracing::warn!(url = %url, error = %err, "http.cache.write_failed"),
            }
        }
        Ok(page)
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn fetch(&self, method: Method, url: &Url, opts: &RequestOpts) -> Result<Page, HttpError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HttpError::Url(format!("unsupported scheme: {url}")));
        }
        let host = url.host_str().unwrap_or("-").to_string();
        let req_id = Uuid::new_v4().simple().to_string();
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let mut attempt = 0usize;

        loop {
            if let Some(throttle) = &self.throttle {
                throttle.acquire(&host).await;
            }

            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }

            tracing::debug!(
                req_id = %req_id,
                attempt = attempt + 1,
                max_retries,
                method = %method,
                host_path = %format!("{}{}", host, url.path()),
                query = url.query().unwrap_or(""),
                timeout_ms = timeout.as_millis() as u64,
                "http.request.start"
            );

            if raw_enabled() {
                let empty = HeaderMap::new();
                let curl = make_curl(
                    &method,
                    url,
                    &self.user_agent,
                    opts.headers.as_ref().unwrap_or(&empty),
                );
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            // ----- Send -----
            let t0 = Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id = %req_id,
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            message = %message,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id = %req_id,
                        attempt,
                        max_retries,
                        message = %message,
                        "http.network_error.send"
                    );
                    return Err(HttpError::Network(message));
                }
            };
            let status = resp.status();
            let final_url = resp.url().clone();
            let headers = resp.headers().clone();
            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id = %req_id,
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            message = %message,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id = %req_id,
                        attempt,
                        max_retries,
                        message = %message,
                        "http.network_error.body"
                    );
                    return Err(HttpError::Network(message));
                }
            };
            let latency = t0.elapsed();

            if let Some(throttle) = &self.throttle {
                throttle.observe(&host, latency, status);
            }

            tracing::debug!(
                req_id = %req_id,
                %status,
                duration_ms = latency.as_millis() as u64,
                body_len = bytes.len(),
                final_url = %final_url,
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&headers);
                let mut body_snip = bytes.to_vec();
                let truncated = body_snip.len() > RAW_MAX_BODY;
                if truncated {
                    body_snip.truncate(RAW_MAX_BODY);
                }
                let text = String::from_utf8_lossy(&body_snip);
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    status = %status,
                    duration_ms = latency.as_millis() as u64,
                    headers = ?hdrs,
                    body = %text,
                    truncated
                );
            }

            let snippet = snip_body(&bytes);
            tracing::trace!(
                req_id = %req_id,
                body_snippet = %snippet,
                "http.response.body_snippet"
            );

            // ----- Non-success: maybe retry -----
            if is_retryable(status) && attempt < max_retries {
                attempt += 1;
                let retry_after = retry_after_delay_secs(&headers);
                let delay = match retry_after {
                    Some(secs) => Duration::from_secs(secs),
                    None if status == StatusCode::TOO_MANY_REQUESTS => {
                        // default floor for 429 when no Retry-After is present
                        backoff(attempt).max(Duration::from_millis(1100))
                    }
                    None => backoff(attempt),
                };
                tracing::warn!(
                    req_id = %req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    retry_after_secs = ?retry_after,
                    body_snippet = %snippet,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                tracing::warn!(
                    req_id = %req_id,
                    %status,
                    url = %final_url,
                    body_snippet = %snippet,
                    "http.error"
                );
            }

            return Ok(Page {
                url: final_url,
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                from_cache: false,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

/// Turn a cache entry into a [`Page`]; an entry that cannot be replayed is an error.
async fn cached_page(cache: &HttpCache, url: &Url) -> Result<Option<Page>, HttpError> {
    let Some(hit) = cache.load(url).await? else {
        return Ok(None);
    };
    let status = StatusCode::from_u16(hit.status)
        .map_err(|e| HttpError::Cache(format!("status {}: {e}", hit.status)))?;
    Ok(Some(Page {
        url: hit.served_from()?,
        status,
        body: hit.body,
        from_cache: true,
    }))
}

fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(200u64.saturating_mul(1u64 << shift))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
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
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}
