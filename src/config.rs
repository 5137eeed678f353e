use std::env;

/// Runtime configuration for the guarded HTTP client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Quota seed used before the first server response arrives.
    pub initial_limit: usize,
    pub reset_header: String,
    pub remaining_header: String,
    pub limit_header: String,
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - QUOTA_GUARD_BASE_URL (default: https://api.github.com)
    /// - QUOTA_GUARD_TOKEN [optional bearer token]
    /// - QUOTA_GUARD_USER_AGENT (default: quota-guard/<version>)
    /// - QUOTA_GUARD_TIMEOUT_SECS (default: 30)
    /// - QUOTA_GUARD_INITIAL_LIMIT (default: 60)
    /// - QUOTA_GUARD_RESET_HEADER (default: x-ratelimit-reset)
    /// - QUOTA_GUARD_REMAINING_HEADER (default: x-ratelimit-remaining)
    /// - QUOTA_GUARD_LIMIT_HEADER (default: x-ratelimit-limit)
    pub fn from_env() -> Self {
        let base_url = env::var("QUOTA_GUARD_BASE_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let token = env::var("QUOTA_GUARD_TOKEN").ok().filter(|t| !t.is_empty());
        let timeout_secs = env::var("QUOTA_GUARD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        let initial_limit = env::var("QUOTA_GUARD_INITIAL_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(60);
        let default_ua = format!(
            "quota-guard/{}",
            env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into())
        );
        let user_agent = env::var("QUOTA_GUARD_USER_AGENT").unwrap_or(default_ua);
        let reset_header = env::var("QUOTA_GUARD_RESET_HEADER")
            .unwrap_or_else(|_| "x-ratelimit-reset".to_string());
        let remaining_header = env::var("QUOTA_GUARD_REMAINING_HEADER")
            .unwrap_or_else(|_| "x-ratelimit-remaining".to_string());
        let limit_header = env::var("QUOTA_GUARD_LIMIT_HEADER")
            .unwrap_or_else(|_| "x-ratelimit-limit".to_string());

        Self {
            base_url,
            token,
            user_agent,
            timeout_secs,
            initial_limit,
            reset_header,
            remaining_header,
            limit_header,
        }
    }
}
