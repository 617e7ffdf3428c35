use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Instant;

/// Configurable rate limit for the client send endpoint. Read from environment
/// variables with sensible defaults, same pattern the rest of the service uses
/// for env-driven config.
///
/// - `RATE_LIMIT_SEND_MAX` — max sends per window per IP (default: 60)
/// - `RATE_LIMIT_SEND_WINDOW_SECS` — window size in seconds (default: 60)
pub struct RateLimitConfig {
    pub send_max: usize,
    pub send_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            send_max: 60,
            send_window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("RATE_LIMIT_SEND_MAX")
            && let Ok(n) = val.parse::<usize>()
        {
            config.send_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_SEND_WINDOW_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.send_window_secs = n;
        }

        config
    }
}

/// Information about rate limit status for a given key.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    limits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            limits: Mutex::new(HashMap::new()),
        }
    }

    /// Check rate limit and return detailed info for response headers.
    /// `key` is typically "send:<ip>".
    pub fn check_with_info(&self, key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = std::time::Duration::from_secs(window_secs);

        let entries = limits.entry(key.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = match entries.iter().min() {
                Some(t) => t,
                None => {
                    return RateLimitInfo {
                        allowed: false,
                        remaining: 0,
                        limit: max,
                        retry_after_secs: 1,
                    };
                }
            };
            let elapsed = now.duration_since(*oldest);
            let retry_after = if elapsed < window {
                (window - elapsed).as_secs() + 1
            } else {
                1
            };

            return RateLimitInfo {
                allowed: false,
                limit: max,
                remaining: 0,
                retry_after_secs: retry_after,
            };
        }

        entries.push(now);
        let remaining = max - entries.len();

        RateLimitInfo {
            allowed: true,
            limit: max,
            remaining,
            retry_after_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_blocks() {
        let rl = RateLimiter::new();
        for _ in 0..3 {
            assert!(rl.check_with_info("k", 3, 60).allowed);
        }
        let blocked = rl.check_with_info("k", 3, 60);
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
    }

    #[test]
    fn independent_keys_have_independent_windows() {
        let rl = RateLimiter::new();
        for _ in 0..3 {
            assert!(rl.check_with_info("a", 3, 60).allowed);
        }
        assert!(rl.check_with_info("b", 3, 60).allowed);
    }
}
