use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::MissingOrMalformedField;
use crate::types::{QuotaField, QuotaMeta, QuotaSnapshot};

/// Outcome of a non-blocking admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The action may proceed now; one unit of quota was consumed.
    Admitted,
    /// Quota is exhausted. `retry_after` is a non-negative estimate of how
    /// long to pause before retrying.
    Declined { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Limits the rate at which an action can be performed, driven by quota
/// state the remote service reports after each action.
///
/// The limiter keeps a log of the timestamps of the last `limit` admitted
/// actions. [`try_acquire`](Self::try_acquire) admits while the log is under
/// capacity; once full it declines until `reset_at` passes, after which the
/// oldest slot is recycled. [`update`](Self::update) resynchronizes the
/// state from server-reported metadata and is the only way quota can grow.
///
/// It applies no smoothing (as a token bucket would) and no warmup; quota is
/// either available now or after `reset_at`. A single internal mutex makes
/// the limiter safe to share across tasks via `&self`. No fairness is
/// guaranteed among callers blocked in [`wait`](Self::wait): whichever
/// caller re-checks first takes the freed slot.
pub struct RateLimiter {
    inner: Mutex<State>,
}

struct State {
    limit: usize,
    reset_at: DateTime<Utc>,
    times: VecDeque<DateTime<Utc>>,
}

/// Pad added to server-reported reset times to absorb clock skew.
const RESET_SAFETY_MARGIN_SECS: i64 = 1;

/// Sleep floor for `wait` when a decline carries a zero hint (only possible
/// with `limit == 0`, where quota can reappear solely through `update`).
const ZERO_HINT_BACKOFF: Duration = Duration::from_millis(10);

impl RateLimiter {
    /// Create a limiter with an initial quota and reset time, e.g. seeded
    /// from defaults or a prior probe request.
    pub fn new(limit: usize, reset_at: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(State {
                limit,
                reset_at,
                times: VecDeque::with_capacity(limit),
            }),
        }
    }

    /// Non-blocking admission check.
    ///
    /// Admits and records the action if fewer than `limit` actions are in
    /// the current window. With a full window, declines while `reset_at` is
    /// in the future; once it has passed, the window has rolled over and the
    /// oldest recorded action is replaced by this one.
    pub fn try_acquire(&self) -> Admission {
        let mut state = self.inner.lock().expect("limiter mutex poisoned");
        let now = Utc::now();
        if state.times.len() < state.limit {
            state.times.push_back(now);
            return Admission::Admitted;
        }
        if state.reset_at > now {
            let retry_after = (state.reset_at - now).to_std().unwrap_or(Duration::ZERO);
            debug!("quota exhausted, retry in {:?}", retry_after);
            return Admission::Declined { retry_after };
        }
        // reset_at has passed: recycle the oldest slot.
        if state.times.pop_front().is_some() {
            state.times.push_back(now);
            return Admission::Admitted;
        }
        // limit == 0: nothing to recycle until an update restores quota.
        Admission::Declined {
            retry_after: Duration::ZERO,
        }
    }

    /// Suspend the calling task until an action is admitted.
    ///
    /// Loops: after every declined check it sleeps for the reported duration
    /// and re-checks, so admission is eventually reached even when the wait
    /// estimate is imprecise. Cancellation is dropping the future; state
    /// only changes inside [`try_acquire`](Self::try_acquire), so a dropped
    /// `wait` has consumed quota only if it already returned.
    pub async fn wait(&self) {
        loop {
            match self.try_acquire() {
                Admission::Admitted => return,
                Admission::Declined { retry_after } => {
                    let pause = if retry_after.is_zero() {
                        ZERO_HINT_BACKOFF
                    } else {
                        retry_after
                    };
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Bounded [`wait`](Self::wait): returns `true` if admitted within
    /// `timeout`, `false` if the deadline expired first (no quota consumed).
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Resynchronize from server-reported quota metadata.
    ///
    /// `reset` and `remaining` are required; `limit` is used when present
    /// (absent keeps the current limit, raised to `remaining` if smaller).
    /// The parsed reset time gets a one-second safety pad. On success the
    /// admission log is resized so that exactly `remaining` further
    /// admissions are possible before the window is exhausted. On error no
    /// state is changed.
    pub fn update(&self, meta: &QuotaMeta) -> Result<(), MissingOrMalformedField> {
        let reset_secs: i64 = parse_required(meta.reset.as_deref(), QuotaField::Reset)?;
        let reset_at = DateTime::<Utc>::from_timestamp(
            reset_secs.saturating_add(RESET_SAFETY_MARGIN_SECS),
            0,
        )
        .ok_or_else(|| MissingOrMalformedField::new(QuotaField::Reset))?;
        let remaining: usize = parse_required(meta.remaining.as_deref(), QuotaField::Remaining)?;
        let limit: Option<usize> = match meta.limit.as_deref() {
            None => None,
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| MissingOrMalformedField::new(QuotaField::Limit))?,
            ),
        };

        let mut state = self.inner.lock().expect("limiter mutex poisoned");
        let limit = limit.unwrap_or_else(|| state.limit.max(remaining));
        if remaining > limit {
            warn!(
                "remaining {} exceeds limit {}, clamping to the limit",
                remaining, limit
            );
        }
        let consumed = limit.saturating_sub(remaining.min(limit));
        let now = Utc::now();
        state.limit = limit;
        state.reset_at = reset_at;
        while state.times.len() > consumed {
            state.times.pop_front();
        }
        while state.times.len() < consumed {
            state.times.push_back(now);
        }
        Ok(())
    }

    /// Current quota accounting, for logging or surfacing to callers.
    pub fn snapshot(&self) -> QuotaSnapshot {
        let state = self.inner.lock().expect("limiter mutex poisoned");
        QuotaSnapshot {
            limit: state.limit,
            remaining: state.limit.saturating_sub(state.times.len()),
            reset_at: state.reset_at.to_rfc3339(),
        }
    }
}

fn parse_required<T: std::str::FromStr>(
    raw: Option<&str>,
    field: QuotaField,
) -> Result<T, MissingOrMalformedField> {
    raw.and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| MissingOrMalformedField::new(field))
}
