//! Failure classification and backoff policy
//!
//! Every failed part attempt is classified into an [`ErrorCategory`], which
//! decides both whether another attempt is allowed and how long to wait
//! before it. Delays grow exponentially per category, get scaled by the
//! current network tier, get jittered, and are capped at
//! [`MAX_BACKOFF_MS`].

use std::fmt;

use gantry_quality::QualityTier;
use rand::Rng;

use crate::api::StoreError;

/// Hard ceiling on any computed backoff delay, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Retry budget for network, server and rate-limit failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry budget for unclassified failures.
pub const DEFAULT_UNKNOWN_ATTEMPTS: u32 = 3;

const JITTER_MIN: f64 = 0.85;
const JITTER_MAX: f64 = 1.15;

/// Coarse failure class assigned to a failed part attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport-level failure: timeout, reset, unreachable host.
    Network,

    /// 5xx from the store; expected to clear on its own.
    ServerTemporary,

    /// 429 or an explicit throttle message.
    RateLimit,

    /// 401 or 403; retrying cannot help.
    Auth,

    /// Any other 4xx; the request itself is wrong.
    Client,

    /// Nothing matched; retried cautiously.
    Unknown,
}

impl ErrorCategory {
    /// Stable lowercase name, used in logs and error text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::ServerTemporary => "server_temporary",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Client => "client",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a store failure into a retry category.
///
/// Message keywords outrank status codes: a 500 whose body says
/// "connection reset by peer" is a network problem, not a server one.
#[must_use]
pub fn classify(error: &StoreError) -> ErrorCategory {
    let (status, message) = match error {
        StoreError::Timeout(_) => return ErrorCategory::Network,
        StoreError::Transport(_) => return ErrorCategory::Network,
        StoreError::Http { status, message } => (*status, message.to_lowercase()),
    };

    if message.contains("network") || message.contains("timeout") || message.contains("connection")
    {
        return ErrorCategory::Network;
    }
    if (500..600).contains(&status) {
        return ErrorCategory::ServerTemporary;
    }
    if status == 429 || message.contains("rate limit") || message.contains("too many") {
        return ErrorCategory::RateLimit;
    }
    if status == 401 || status == 403 {
        return ErrorCategory::Auth;
    }
    if (400..500).contains(&status) {
        return ErrorCategory::Client;
    }
    ErrorCategory::Unknown
}

/// Per-category retry budgets and backoff shaping.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed for network, server and rate-limit failures.
    pub max_attempts: u32,

    /// Attempts allowed for unclassified failures.
    pub unknown_attempts: u32,

    /// Randomize delays by +/-15%. Disabled in tests that assert exact
    /// delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unknown_attempts: DEFAULT_UNKNOWN_ATTEMPTS,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` failures.
    ///
    /// `attempt` is the 1-based ordinal of the attempt that just failed.
    #[must_use]
    pub fn is_retryable(&self, category: ErrorCategory, attempt: u32) -> bool {
        match category {
            ErrorCategory::Network | ErrorCategory::ServerTemporary | ErrorCategory::RateLimit => {
                attempt <= self.max_attempts
            }
            ErrorCategory::Auth | ErrorCategory::Client => false,
            ErrorCategory::Unknown => attempt <= self.unknown_attempts,
        }
    }

    /// Delay in milliseconds before the attempt after `attempt`.
    ///
    /// Exponential per category, scaled 1.5x on poor networks and 0.7x on
    /// good ones, jittered if enabled, floored, then capped at
    /// [`MAX_BACKOFF_MS`].
    #[must_use]
    pub fn backoff_delay(&self, category: ErrorCategory, attempt: u32, tier: QualityTier) -> u64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = match category {
            ErrorCategory::Network => 2000.0 * 1.5_f64.powi(exponent),
            ErrorCategory::ServerTemporary => 1000.0 * 2.0_f64.powi(exponent),
            ErrorCategory::RateLimit => 5000.0 * 2.0_f64.powi(exponent),
            ErrorCategory::Auth | ErrorCategory::Client | ErrorCategory::Unknown => {
                1000.0 * 2.0_f64.powi(exponent)
            }
        };

        let tier_scale = match tier {
            QualityTier::Poor => 1.5,
            QualityTier::Medium => 1.0,
            QualityTier::Good => 0.7,
        };

        let jitter = if self.jitter {
            rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX)
        } else {
            1.0
        };

        ((base * tier_scale * jitter).floor() as u64).min(MAX_BACKOFF_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_classify_transport_errors() {
        assert_eq!(
            classify(&StoreError::Timeout(Duration::from_secs(120))),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&StoreError::transport("connection refused")),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_classify_message_keywords_win_over_status() {
        assert_eq!(
            classify(&StoreError::http(500, "Connection reset by peer")),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&StoreError::http(400, "request TIMEOUT exceeded")),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(
            classify(&StoreError::http(503, "service unavailable")),
            ErrorCategory::ServerTemporary
        );
        assert_eq!(
            classify(&StoreError::http(429, "slow down")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify(&StoreError::http(200, "rate limit reached")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify(&StoreError::http(401, "bad token")),
            ErrorCategory::Auth
        );
        assert_eq!(
            classify(&StoreError::http(403, "forbidden")),
            ErrorCategory::Auth
        );
        assert_eq!(
            classify(&StoreError::http(404, "no such upload")),
            ErrorCategory::Client
        );
        assert_eq!(
            classify(&StoreError::http(302, "moved")),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_retryable_budgets() {
        let policy = RetryPolicy::default();

        assert!(policy.is_retryable(ErrorCategory::Network, 1));
        assert!(policy.is_retryable(ErrorCategory::Network, 5));
        assert!(!policy.is_retryable(ErrorCategory::Network, 6));

        assert!(policy.is_retryable(ErrorCategory::Unknown, 3));
        assert!(!policy.is_retryable(ErrorCategory::Unknown, 4));

        assert!(!policy.is_retryable(ErrorCategory::Auth, 1));
        assert!(!policy.is_retryable(ErrorCategory::Client, 1));
    }

    #[test]
    fn test_backoff_growth_per_category() {
        let policy = no_jitter();
        let tier = QualityTier::Medium;

        assert_eq!(policy.backoff_delay(ErrorCategory::Network, 1, tier), 2000);
        assert_eq!(policy.backoff_delay(ErrorCategory::Network, 2, tier), 3000);
        assert_eq!(policy.backoff_delay(ErrorCategory::Network, 3, tier), 4500);

        assert_eq!(
            policy.backoff_delay(ErrorCategory::ServerTemporary, 1, tier),
            1000
        );
        assert_eq!(
            policy.backoff_delay(ErrorCategory::ServerTemporary, 3, tier),
            4000
        );

        assert_eq!(
            policy.backoff_delay(ErrorCategory::RateLimit, 1, tier),
            5000
        );
        assert_eq!(
            policy.backoff_delay(ErrorCategory::RateLimit, 2, tier),
            10000
        );

        assert_eq!(policy.backoff_delay(ErrorCategory::Unknown, 2, tier), 2000);
    }

    #[test]
    fn test_backoff_tier_scaling() {
        let policy = no_jitter();

        assert_eq!(
            policy.backoff_delay(ErrorCategory::Network, 1, QualityTier::Poor),
            3000
        );
        assert_eq!(
            policy.backoff_delay(ErrorCategory::Network, 1, QualityTier::Good),
            1400
        );
    }

    #[test]
    fn test_backoff_cap() {
        let policy = no_jitter();
        // 5000 * 2^4 = 80000, far past the cap
        assert_eq!(
            policy.backoff_delay(ErrorCategory::RateLimit, 5, QualityTier::Poor),
            MAX_BACKOFF_MS
        );
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.backoff_delay(ErrorCategory::Network, 1, QualityTier::Medium);
            assert!((1700..=2300).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_category_names() {
        assert_eq!(ErrorCategory::Network.as_str(), "network");
        assert_eq!(ErrorCategory::ServerTemporary.to_string(), "server_temporary");
        assert_eq!(ErrorCategory::RateLimit.as_str(), "rate_limit");
    }
}
