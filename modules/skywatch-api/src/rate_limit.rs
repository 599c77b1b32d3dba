//! In-memory sliding-window rate limiting keyed by client IP. A Redis
//! backing would replace the HashMap; the window logic stays the same.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Check the rate limit for one IP's entry list. Returns true if the
/// request is allowed. Prunes expired entries and records the new request.
pub fn check_rate_limit(
    entries: &mut Vec<Instant>,
    now: Instant,
    max_requests: usize,
    window: Duration,
) -> bool {
    let cutoff = now - window;
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_requests {
        return false;
    }
    entries.push(now);
    true
}

/// Prune empty entries to keep the map from growing without bound.
pub fn prune_empty_entries(limiter: &mut HashMap<IpAddr, Vec<Instant>>, window: Duration) {
    let cutoff = Instant::now() - window;
    limiter.retain(|_, entries| {
        entries.retain(|t| *t > cutoff);
        !entries.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_under_limit() {
        let mut entries = Vec::new();
        let now = Instant::now();
        for _ in 0..9 {
            assert!(check_rate_limit(&mut entries, now, 10, WINDOW));
        }
        assert_eq!(entries.len(), 9);
    }

    #[test]
    fn rejects_over_limit() {
        let mut entries = Vec::new();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(check_rate_limit(&mut entries, now, 10, WINDOW));
        }
        assert!(!check_rate_limit(&mut entries, now, 10, WINDOW));
        assert_eq!(entries.len(), 10);
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let mut entries = vec![Instant::now() - Duration::from_secs(61); 10];
        assert!(check_rate_limit(&mut entries, Instant::now(), 10, WINDOW));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn prune_drops_stale_ips() {
        let mut limiter = HashMap::new();
        limiter.insert(
            "10.0.0.1".parse::<IpAddr>().unwrap(),
            vec![Instant::now() - Duration::from_secs(120)],
        );
        limiter.insert("10.0.0.2".parse::<IpAddr>().unwrap(), vec![Instant::now()]);
        prune_empty_entries(&mut limiter, WINDOW);
        assert_eq!(limiter.len(), 1);
    }
}
