//! Advisory, process-local request limiting for the subscribe endpoint.
//!
//! Each client identifier owns a fixed-window request counter plus a short
//! history of the emails it submitted. Nothing here survives a restart or is
//! shared between instances.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Window size and cooldown settings for a [`RateLimiter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests allowed per client within one window
    pub max_requests: u32,
    /// Length of the fixed window
    pub window: Duration,
    /// How long the same email is refused for the same client
    pub duplicate_cooldown: Duration,
}

impl RateLimitPolicy {
    /// 3 requests per 15 minutes
    pub fn strict() -> Self {
        Self {
            max_requests: 3,
            window: Duration::minutes(15),
            duplicate_cooldown: Duration::seconds(60),
        }
    }

    /// 10 requests per 15 minutes
    pub fn relaxed() -> Self {
        Self {
            max_requests: 10,
            ..Self::strict()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RateLimit,
    DuplicateEmail,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::DuplicateEmail => "duplicate_email",
        }
    }
}

/// An accepted request and the quota left in its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitAllowance {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// A refused request and when the caller may try again
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Request refused by rate limiter: {}", .reason.as_str())]
pub struct RateLimitDenial {
    pub reason: DenialReason,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDenial {
    /// Whole seconds until `reset_at`, never less than one
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds();
        ((millis + 999) / 1000).max(1)
    }
}

#[derive(Debug)]
struct RateLimitEntry {
    count: u32,
    reset_at: DateTime<Utc>,
    recent_emails: Vec<(String, DateTime<Utc>)>,
}

impl RateLimitEntry {
    fn new(reset_at: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            reset_at,
            recent_emails: Vec::new(),
        }
    }

    fn prune_emails(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        self.recent_emails.retain(|(_, at)| now - *at < cooldown);
    }
}

/// Fixed-window limiter keyed by client identifier
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request from `client_id`
    pub fn check(
        &self,
        client_id: &str,
        email: Option<&str>,
    ) -> Result<RateLimitAllowance, RateLimitDenial> {
        self.check_at(client_id, email, Utc::now())
    }

    /// Check and record a request as if it arrived at `now`.
    ///
    /// A repeated email is refused before the quota is looked at, so a client
    /// that is both over quota and repeating itself sees `DuplicateEmail`.
    pub fn check_at(
        &self,
        client_id: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitAllowance, RateLimitDenial> {
        let policy = self.policy;
        let mut entries = self.lock();
        let entry = entries
            .entry(client_id.to_string())
            .or_insert_with(|| RateLimitEntry::new(now + policy.window));

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + policy.window;
        }
        entry.prune_emails(now, policy.duplicate_cooldown);

        let remaining = policy.max_requests.saturating_sub(entry.count);

        if let Some(email) = email {
            let previous = entry
                .recent_emails
                .iter()
                .find(|(recent, _)| recent == email);
            if let Some((_, at)) = previous {
                tracing::debug!(client_id, "Duplicate email within cooldown");
                return Err(RateLimitDenial {
                    reason: DenialReason::DuplicateEmail,
                    limit: policy.max_requests,
                    remaining,
                    reset_at: *at + policy.duplicate_cooldown,
                });
            }
        }

        if remaining == 0 {
            tracing::debug!(client_id, "Request quota exhausted");
            return Err(RateLimitDenial {
                reason: DenialReason::RateLimit,
                limit: policy.max_requests,
                remaining: 0,
                reset_at: entry.reset_at,
            });
        }

        entry.count += 1;
        if let Some(email) = email {
            entry.recent_emails.push((email.to_string(), now));
        }

        Ok(RateLimitAllowance {
            limit: policy.max_requests,
            remaining: policy.max_requests - entry.count,
            reset_at: entry.reset_at,
        })
    }

    /// Drop expired entries and trim stale email history, returning how many entries were dropped
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cooldown = self.policy.duplicate_cooldown;
        let mut entries = self.lock();
        let before = entries.len();

        entries.retain(|_, entry| {
            if now > entry.reset_at {
                return false;
            }
            entry.prune_emails(now, cooldown);
            true
        });

        before - entries.len()
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    // A panic while holding the lock leaves counters in a usable state
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
