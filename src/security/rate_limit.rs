//! Sliding-window request throttling.
//!
//! Each endpoint class gets its own [`RateLimiter`], so a burst against the
//! contact form never starves submissions. State lives in process memory.
//!
//! Failure policy is fail-closed: when the table of tracked identifiers is
//! full of live entries, unseen identifiers are refused. A poisoned lock is
//! recovered rather than skipped, since every update is a single step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use actix_web::HttpRequest;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Contact,
    Api,
    Upload,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Run cleanup every N calls.
    pub cleanup_interval: u64,
    /// Hard cap on identifiers held in memory.
    pub max_tracked: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            cleanup_interval: 100,
            max_tracked: 10_000,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// When the oldest request in the window falls out of it.
    pub reset_at: Instant,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self) -> u64 {
        let remaining = self.reset_at.saturating_duration_since(Instant::now());
        remaining.as_secs_f64().ceil().max(1.0) as u64
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    state: RwLock<HashMap<String, Vec<Instant>>>,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Records a request for `identifier` if it fits in the window.
    pub fn limit(&self, identifier: &str) -> RateLimitDecision {
        let now = Instant::now();
        let window = self.window();
        let cutoff = now.checked_sub(window).unwrap_or(now);

        let calls = self.calls.fetch_add(1, Ordering::Relaxed);
        if calls > 0 && calls % self.config.cleanup_interval == 0 {
            tracing::debug!(calls, "running periodic rate limiter cleanup");
            self.cleanup();
        }

        let is_new = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            !state.contains_key(identifier) && state.len() >= self.config.max_tracked
        };
        if is_new {
            self.cleanup();
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if !state.contains_key(identifier) && state.len() >= self.config.max_tracked {
            tracing::warn!(
                identifier,
                tracked = state.len(),
                "rejecting new identifier: rate limiter table is full"
            );
            return RateLimitDecision {
                allowed: false,
                reset_at: now + window,
            };
        }

        let stamps = state.entry(identifier.to_string()).or_default();
        stamps.retain(|&t| t > cutoff);

        if stamps.len() >= self.config.max_requests as usize {
            let oldest = stamps.first().copied().unwrap_or(now);
            tracing::warn!(
                identifier,
                requests = stamps.len(),
                max = self.config.max_requests,
                "rate limit exceeded"
            );
            return RateLimitDecision {
                allowed: false,
                reset_at: oldest + window,
            };
        }

        stamps.push(now);
        let oldest = stamps.first().copied().unwrap_or(now);

        RateLimitDecision {
            allowed: true,
            reset_at: oldest + window,
        }
    }

    /// Like [`limit`](Self::limit) but as an error for `?` use in handlers.
    pub fn check(&self, identifier: &str) -> Result<(), ApiError> {
        let decision = self.limit(identifier);
        if decision.allowed {
            Ok(())
        } else {
            Err(ApiError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            })
        }
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window()).unwrap_or(now);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.retain(|_, stamps| {
            stamps.retain(|&t| t > cutoff);
            !stamps.is_empty()
        });
    }

    pub fn tracked(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One limiter per endpoint class.
pub struct RateLimits {
    pub contact: RateLimiter,
    pub api: RateLimiter,
    pub upload: RateLimiter,
}

impl RateLimits {
    pub fn new(contact: RateLimitConfig, api: RateLimitConfig, upload: RateLimitConfig) -> Self {
        Self {
            contact: RateLimiter::new(contact),
            api: RateLimiter::new(api),
            upload: RateLimiter::new(upload),
        }
    }

    pub fn get(&self, class: LimitClass) -> &RateLimiter {
        match class {
            LimitClass::Contact => &self.contact,
            LimitClass::Api => &self.api,
            LimitClass::Upload => &self.upload,
        }
    }

    /// Throttles `req` under `class`, keyed by its network origin.
    pub fn check_request(&self, class: LimitClass, req: &HttpRequest) -> Result<(), ApiError> {
        self.get(class).check(&client_identifier(req))
    }
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_identifier(req: &HttpRequest) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => ip.to_string(),
        None => req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "anonymous".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn allows_up_to_limit_then_refuses() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 60));

        for _ in 0..10 {
            assert!(limiter.limit("10.0.0.1").allowed);
        }

        let decision = limiter.limit("10.0.0.1");
        assert!(!decision.allowed);
        let retry = decision.retry_after_secs();
        assert!((1..=60).contains(&retry), "retry after {retry}");
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        assert!(limiter.limit("a").allowed);
        assert!(!limiter.limit("a").allowed);
        assert!(limiter.limit("b").allowed);
    }

    #[test]
    fn classes_do_not_share_windows() {
        let limits = RateLimits::new(
            RateLimitConfig::new(1, 60),
            RateLimitConfig::new(1, 60),
            RateLimitConfig::new(1, 60),
        );
        assert!(limits.get(LimitClass::Contact).limit("ip").allowed);
        assert!(!limits.get(LimitClass::Contact).limit("ip").allowed);
        assert!(limits.get(LimitClass::Api).limit("ip").allowed);
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 1));
        assert!(limiter.limit("ip").allowed);
        assert!(!limiter.limit("ip").allowed);

        thread::sleep(Duration::from_millis(1100));
        assert!(limiter.limit("ip").allowed);
    }

    #[test]
    fn full_table_fails_closed_for_new_identifiers() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 100,
            window_secs: 60,
            cleanup_interval: 1000,
            max_tracked: 3,
        });
        for i in 0..3 {
            assert!(limiter.limit(&format!("ip-{i}")).allowed);
        }

        assert!(!limiter.limit("ip-new").allowed);
        assert!(limiter.limit("ip-0").allowed);
        assert_eq!(limiter.tracked(), 3);
    }

    #[test]
    fn check_maps_to_rate_limited_error() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 30));
        limiter.check("ip").unwrap();
        match limiter.check("ip") {
            Err(ApiError::RateLimited { retry_after_secs }) => {
                assert!((1..=30).contains(&retry_after_secs))
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[test]
    fn identifier_prefers_forwarded_header() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.1"))
            .to_http_request();
        assert_eq!(client_identifier(&req), "203.0.113.7");

        let req = TestRequest::default()
            .peer_addr("192.0.2.1:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_identifier(&req), "192.0.2.1");
    }
}
