use serde::{Deserialize, Serialize};
use std::fmt;

// Canonical quota metadata handed to the limiter. Carries raw header values;
// parsing happens in `RateLimiter::update` so errors can name the offending
// field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaMeta {
    pub reset: Option<String>,
    pub remaining: Option<String>,
    pub limit: Option<String>,
}

/// Point-in-time view of the limiter's quota accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub limit: usize,
    pub remaining: usize,
    /// RFC 3339 timestamp after which the window is assumed replenished.
    pub reset_at: String,
}

/// Which quota metadata field an update failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaField {
    Reset,
    Remaining,
    Limit,
}

impl fmt::Display for QuotaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuotaField::Reset => "reset",
            QuotaField::Remaining => "remaining",
            QuotaField::Limit => "limit",
        };
        f.write_str(name)
    }
}
