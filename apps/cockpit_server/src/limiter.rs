use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fixed-window request limiter keyed by client IP, shared across the
/// router.
pub struct RateLimiter {
    limit_per_minute: u32,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// True when the request is inside the budget for its window.
    pub fn check(&self, key: &str) -> bool {
        if self.limit_per_minute == 0 {
            return true;
        }
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("limiter lock");
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= Duration::from_secs(60) {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.limit_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_per_key() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        // Another client has its own window.
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn zero_limit_disables_the_limiter() {
        let limiter = RateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.check("10.0.0.1"));
        }
    }
}
