use crate::config::Config;
use crate::limiter::RateLimiter;
use crate::types::{QuotaMeta, QuotaSnapshot};
use chrono::Utc;
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

/// Outcome of one guarded request: payload (when the call succeeded), the
/// limiter's quota accounting after absorbing the response headers, and the
/// error classification otherwise.
#[derive(Debug, Clone)]
pub struct GuardedResponse<T> {
    pub value: Option<T>,
    pub quota: QuotaSnapshot,
    pub error: Option<ErrorInfo>,
    pub status: StatusCode,
}

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_str(&cfg.user_agent).unwrap());
    // Authorization header is injected per request to allow token rotation later.
    let builder = Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls();
    builder.build()
}

fn auth_header(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).expect("valid header")
}

pub fn map_status_to_error(status: StatusCode, message: String) -> ErrorInfo {
    let (code, retriable) = match status {
        StatusCode::BAD_REQUEST => ("bad_request", false),
        StatusCode::UNAUTHORIZED => ("unauthorized", false),
        StatusCode::FORBIDDEN => ("forbidden", false),
        StatusCode::NOT_FOUND => ("not_found", false),
        StatusCode::CONFLICT => ("conflict", false),
        StatusCode::TOO_MANY_REQUESTS => ("rate_limited", true),
        s if s.is_server_error() => ("upstream_error", true),
        _ => ("server_error", false),
    };
    ErrorInfo {
        code: code.to_string(),
        message,
        retriable,
    }
}

/// Pull the raw quota header values out of a response. Header names come from
/// the config so non-standard services can be accommodated.
pub fn quota_meta_from_headers(headers: &HeaderMap, cfg: &Config) -> QuotaMeta {
    let raw = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    QuotaMeta {
        reset: raw(&cfg.reset_header),
        remaining: raw(&cfg.remaining_header),
        limit: raw(&cfg.limit_header),
    }
}

fn compute_backoff(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(d) = retry_after {
        return d;
    }
    // Exponential backoff with jitter: base 200ms * 2^attempt, max 5s.
    let base = 200u64.saturating_mul(1u64 << attempt.min(5));
    let max = 5_000u64.min(base);
    let jitter = fastrand::u64(0..=max / 2);
    Duration::from_millis(max / 2 + jitter)
}

/// HTTP client that runs every request through a [`RateLimiter`].
///
/// Each call follows the canonical loop: wait for admission, perform the
/// request, feed the response's quota headers back into the limiter, return
/// the payload together with the refreshed quota snapshot. Responses without
/// parsable quota headers leave the limiter on its prior (stale) state and
/// are logged at warn.
pub struct GuardedClient {
    client: Client,
    cfg: Config,
    limiter: RateLimiter,
}

impl GuardedClient {
    /// Build a client from the config. The limiter starts with the
    /// configured quota seed and an already-elapsed reset time, so requests
    /// flow freely until the first authoritative update arrives.
    pub fn new(cfg: Config) -> reqwest::Result<Self> {
        let client = build_client(&cfg)?;
        let limiter = RateLimiter::new(cfg.initial_limit, Utc::now());
        Ok(Self {
            client,
            cfg,
            limiter,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn absorb_quota(&self, headers: &HeaderMap) {
        let meta = quota_meta_from_headers(headers, &self.cfg);
        if let Err(e) = self.limiter.update(&meta) {
            warn!("quota update skipped: {}", e);
        }
    }

    pub async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> GuardedResponse<T> {
        let url = format!("{}{}", self.cfg.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            self.limiter.wait().await;
            let mut req = self
                .client
                .get(&url)
                .header(ACCEPT, HeaderValue::from_static("application/json"));
            if let Some(token) = &self.cfg.token {
                req = req.header(AUTHORIZATION, auth_header(token));
            }
            let res = req.send().await;

            let res = match res {
                Ok(r) => r,
                Err(e) => {
                    warn!("GET error sending request: {}", e);
                    if attempt < 5 {
                        tokio::time::sleep(compute_backoff(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return GuardedResponse {
                        value: None,
                        quota: self.limiter.snapshot(),
                        error: Some(ErrorInfo {
                            code: "upstream_error".into(),
                            message: e.to_string(),
                            retriable: true,
                        }),
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                    };
                }
            };

            let status = res.status();
            let headers = res.headers().clone();
            self.absorb_quota(&headers);
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            if status.is_success() {
                match res.json::<T>().await {
                    Ok(val) => {
                        return GuardedResponse {
                            value: Some(val),
                            quota: self.limiter.snapshot(),
                            error: None,
                            status,
                        };
                    }
                    Err(e) => {
                        return GuardedResponse {
                            value: None,
                            quota: self.limiter.snapshot(),
                            error: Some(ErrorInfo {
                                code: "server_error".into(),
                                message: e.to_string(),
                                retriable: false,
                            }),
                            status,
                        };
                    }
                }
            }

            // Retry on 429/5xx
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt < 5 {
                    let backoff = compute_backoff(attempt, retry_after);
                    warn!(
                        "GET {} retrying (status {}), backoff {:?}",
                        url, status, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
            }
            let text = res.text().await.unwrap_or_default();
            let err = map_status_to_error(status, text);
            return GuardedResponse {
                value: None,
                quota: self.limiter.snapshot(),
                error: Some(err),
                status,
            };
        }
    }

    pub async fn get_text_with_accept(&self, path: &str, accept: &str) -> GuardedResponse<String> {
        let url = format!("{}{}", self.cfg.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            self.limiter.wait().await;
            let mut req = self
                .client
                .get(&url)
                .header(ACCEPT, HeaderValue::from_str(accept).unwrap());
            if let Some(token) = &self.cfg.token {
                req = req.header(AUTHORIZATION, auth_header(token));
            }
            let res = req.send().await;

            let res = match res {
                Ok(r) => r,
                Err(e) => {
                    if attempt < 5 {
                        tokio::time::sleep(compute_backoff(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return GuardedResponse {
                        value: None,
                        quota: self.limiter.snapshot(),
                        error: Some(ErrorInfo {
                            code: "upstream_error".into(),
                            message: e.to_string(),
                            retriable: true,
                        }),
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                    };
                }
            };

            let status = res.status();
            let headers = res.headers().clone();
            self.absorb_quota(&headers);
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = res.text().await.unwrap_or_default();
            if status.is_success() {
                return GuardedResponse {
                    value: Some(text),
                    quota: self.limiter.snapshot(),
                    error: None,
                    status,
                };
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt < 5 {
                    let backoff = compute_backoff(attempt, retry_after);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
            }
            let err = map_status_to_error(status, text);
            return GuardedResponse {
                value: None,
                quota: self.limiter.snapshot(),
                error: Some(err),
                status,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_headers_extracted_raw() {
        let cfg = Config::from_env();
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-remaining", "4999".parse().unwrap());
        h.insert("x-ratelimit-limit", "5000".parse().unwrap());
        h.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
        let meta = quota_meta_from_headers(&h, &cfg);
        assert_eq!(meta.remaining.as_deref(), Some("4999"));
        assert_eq!(meta.limit.as_deref(), Some("5000"));
        assert_eq!(meta.reset.as_deref(), Some("1700000000"));
    }

    #[test]
    fn missing_quota_headers_yield_empty_meta() {
        let cfg = Config::from_env();
        let meta = quota_meta_from_headers(&HeaderMap::new(), &cfg);
        assert_eq!(meta, QuotaMeta::default());
    }

    #[test]
    fn custom_header_names_honored() {
        let mut cfg = Config::from_env();
        cfg.reset_header = "ratelimit-reset".into();
        cfg.remaining_header = "ratelimit-remaining".into();
        cfg.limit_header = "ratelimit-limit".into();
        let mut h = HeaderMap::new();
        h.insert("ratelimit-reset", "7".parse().unwrap());
        h.insert("ratelimit-remaining", "3".parse().unwrap());
        let meta = quota_meta_from_headers(&h, &cfg);
        assert_eq!(meta.reset.as_deref(), Some("7"));
        assert_eq!(meta.remaining.as_deref(), Some("3"));
        assert_eq!(meta.limit, None);
    }

    #[test]
    fn error_mapping_matrix() {
        assert_eq!(
            map_status_to_error(StatusCode::BAD_REQUEST, "".into()).code,
            "bad_request"
        );
        assert_eq!(
            map_status_to_error(StatusCode::UNAUTHORIZED, "".into()).code,
            "unauthorized"
        );
        assert_eq!(
            map_status_to_error(StatusCode::NOT_FOUND, "".into()).code,
            "not_found"
        );
        let rl = map_status_to_error(StatusCode::TOO_MANY_REQUESTS, "".into());
        assert_eq!(rl.code, "rate_limited");
        assert!(rl.retriable);
        let s5 = map_status_to_error(StatusCode::INTERNAL_SERVER_ERROR, "".into());
        assert_eq!(s5.code, "upstream_error");
        assert!(s5.retriable);
    }

    #[test]
    fn backoff_prefers_retry_after() {
        let d = compute_backoff(0, Some(Duration::from_secs(7)));
        assert_eq!(d, Duration::from_secs(7));
    }

    #[test]
    fn backoff_stays_bounded() {
        for attempt in 0..10 {
            let d = compute_backoff(attempt, None);
            assert!(d <= Duration::from_millis(5_000));
        }
    }
}
