use crate::types::QuotaField;

/// Error returned by [`RateLimiter::update`](crate::RateLimiter::update) when
/// a quota field is absent from the metadata or fails to parse as an integer.
///
/// The update is atomic: when this error is returned, no limiter state was
/// changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("quota field `{field}` is missing or malformed")]
pub struct MissingOrMalformedField {
    pub field: QuotaField,
}

impl MissingOrMalformedField {
    pub(crate) fn new(field: QuotaField) -> Self {
        Self { field }
    }
}
