//! # Flow Configuration & Constants
//!
//! Every magic number in the purchase flow lives here. If you're hardcoding
//! a timing constant somewhere else, you're doing it wrong and you owe the
//! team coffee.
//!
//! The `Duration` constants are the production defaults; tests override them
//! through [`FlowConfig`] so nothing here forces a test to sleep.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Identity
// ---------------------------------------------------------------------------

/// Version string for the flow protocol spoken between client and gateway.
/// Reported in the gateway's `/status` payload and the CLI's `version` output.
pub const FLOW_PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// How often the status poller asks the backend for progress while a
/// session is processing. Tokenization settles in tens of seconds, so
/// anything faster than this is just load on the backend.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Maximum number of *consecutive* transient poll failures tolerated before
/// the flow gives up and reports the backend unreachable.
///
/// A successful poll resets the counter. This bound exists because an
/// unbounded retry loop against a dead backend helps nobody — it just burns
/// battery until the user force-quits.
pub const MAX_TRANSIENT_POLL_FAILURES: u32 = 6;

/// Ceiling for the exponential backoff between failed polls. The backoff
/// starts at [`POLL_INTERVAL`] and doubles per consecutive failure up to
/// this cap.
pub const POLL_BACKOFF_CAP: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Caching & Sessions
// ---------------------------------------------------------------------------

/// How long a fetched asset catalog stays fresh. Listings change slowly;
/// prices are re-checked server-side at validation anyway.
pub const CATALOG_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default TTL the client assumes for a flow session when the backend does
/// not supply an explicit expiry. Matches the gateway's default.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunable timing parameters for a flow, injected at construction.
///
/// Production code uses [`FlowConfig::default`], which mirrors the module
/// constants. Tests shrink the intervals to run under `tokio`'s virtual
/// clock without wall-time sleeps.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Interval between status polls while a session is processing.
    pub poll_interval: Duration,
    /// Consecutive transient poll failures tolerated before giving up.
    pub max_transient_poll_failures: u32,
    /// Ceiling for poll backoff.
    pub poll_backoff_cap: Duration,
    /// Asset catalog cache freshness window.
    pub catalog_cache_ttl: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_transient_poll_failures: MAX_TRANSIENT_POLL_FAILURES,
            poll_backoff_cap: POLL_BACKOFF_CAP,
            catalog_cache_ttl: CATALOG_CACHE_TTL,
        }
    }
}

impl FlowConfig {
    /// Returns a config with the given poll interval, keeping the other
    /// defaults.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns a config with the given transient-failure bound.
    pub fn with_max_transient_poll_failures(mut self, max: u32) -> Self {
        self.max_transient_poll_failures = max;
        self
    }

    /// Backoff delay before retry number `consecutive_failures` (1-based).
    ///
    /// Doubles the poll interval per failure, saturating at the cap:
    /// interval, 2×, 4×, ... `poll_backoff_cap`.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.saturating_sub(1).min(16);
        let backoff = self
            .poll_interval
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        backoff.min(self.poll_backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = FlowConfig {
            poll_interval: Duration::from_secs(3),
            poll_backoff_cap: Duration::from_secs(30),
            ..FlowConfig::default()
        };
        assert_eq!(cfg.backoff_for(1), Duration::from_secs(3));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(6));
        assert_eq!(cfg.backoff_for(3), Duration::from_secs(12));
        assert_eq!(cfg.backoff_for(4), Duration::from_secs(24));
        // Would be 48s; capped.
        assert_eq!(cfg.backoff_for(5), Duration::from_secs(30));
        assert_eq!(cfg.backoff_for(30), Duration::from_secs(30));
    }

    #[test]
    fn default_matches_constants() {
        let cfg = FlowConfig::default();
        assert_eq!(cfg.poll_interval, POLL_INTERVAL);
        assert_eq!(cfg.max_transient_poll_failures, MAX_TRANSIENT_POLL_FAILURES);
    }
}
