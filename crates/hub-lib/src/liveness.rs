//! Online/offline derivation
//!
//! Liveness is never stored. Every read path calls [`is_online`] with the
//! current time so a stale flag cannot outlive the timeout.

use std::time::{Duration, Instant};

/// Default staleness timeout after which an agent is reported offline
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(60);

/// An agent is online while its last update is younger than `timeout`
pub fn is_online(last_update: Instant, now: Instant, timeout: Duration) -> bool {
    age(last_update, now) < timeout
}

/// Time since `last_update`, zero if `now` is earlier
pub fn age(last_update: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(last_update)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_before_timeout() {
        let t = Instant::now();
        assert!(is_online(t, t, DEFAULT_DATA_TIMEOUT));
        assert!(is_online(
            t,
            t + Duration::from_millis(59_999),
            DEFAULT_DATA_TIMEOUT
        ));
    }

    #[test]
    fn test_offline_at_and_after_timeout() {
        let t = Instant::now();
        assert!(!is_online(t, t + DEFAULT_DATA_TIMEOUT, DEFAULT_DATA_TIMEOUT));
        assert!(!is_online(
            t,
            t + Duration::from_secs(3600),
            DEFAULT_DATA_TIMEOUT
        ));
    }

    #[test]
    fn test_age_saturates() {
        let t = Instant::now();
        let later = t + Duration::from_secs(5);
        assert_eq!(age(later, t), Duration::ZERO);
        assert_eq!(age(t, later), Duration::from_secs(5));
    }
}
