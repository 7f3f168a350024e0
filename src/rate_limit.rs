//! Fixed-window rate limiting for the public endpoints
//!
//! Counters live in an injected `CounterStore`. The limiter is approximate
//! and fails open: if the store errors, the request is let through.

use crate::cache::keys::rate_limit::WindowKey;
use crate::cache::CounterStore;
use crate::error::{AppError, AppResult, ExternalError};
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in the window
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn per_minute(max_requests: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

/// Limits per endpoint family
pub mod limits {
    use super::RateLimitConfig;

    /// Payment link creation: strict
    pub const PAYMENT: RateLimitConfig = RateLimitConfig::per_minute(10);
    /// Gateway webhooks: relaxed, the gateway retries
    pub const CALLBACK: RateLimitConfig = RateLimitConfig::per_minute(50);
    /// Redirect verification, polled by browser tabs
    pub const VERIFICATION: RateLimitConfig = RateLimitConfig::per_minute(20);
    pub const DEFAULT: RateLimitConfig = RateLimitConfig::per_minute(100);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Seconds until the window resets, rounded up
    pub reset_in_secs: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, scope: &str, client: &str, config: RateLimitConfig) -> RateLimitDecision {
        let key = WindowKey::new(scope, client).to_string();
        match self.store.hit(&key, config.window).await {
            Ok(hit) => {
                let reset_in_secs = ceil_secs(hit.reset_in);
                if hit.count > config.max_requests {
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_in_secs,
                    }
                } else {
                    RateLimitDecision {
                        allowed: true,
                        remaining: config.max_requests - hit.count,
                        reset_in_secs,
                    }
                }
            }
            Err(e) => {
                warn!("Rate limit store unavailable, allowing request: {}", e);
                RateLimitDecision {
                    allowed: true,
                    remaining: config.max_requests,
                    reset_in_secs: config.window.as_secs(),
                }
            }
        }
    }

    /// Check the caller identified by `headers`, turning a denial into a 429 error
    pub async fn enforce(
        &self,
        scope: &str,
        headers: &HeaderMap,
        config: RateLimitConfig,
    ) -> AppResult<RateLimitDecision> {
        let client = client_identifier(headers);
        let decision = self.check(scope, &client, config).await;
        if !decision.allowed {
            warn!(scope, client = %client, "rate limited");
            return Err(AppError::from(ExternalError::RateLimit {
                service: scope.to_string(),
                retry_after: Some(decision.reset_in_secs),
            }));
        }
        Ok(decision)
    }

    /// Periodically drop closed windows so idle clients don't accumulate
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                match store.purge_expired().await {
                    Ok(purged) if purged > 0 => debug!("Purged {} rate limit windows", purged),
                    Ok(_) => {}
                    Err(e) => warn!("Rate limit sweep failed: {}", e),
                }
            }
        })
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Best guess at the caller's address from proxy headers
pub fn client_identifier(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded_for) = header("x-forwarded-for") {
        if let Some(first) = forwarded_for.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use axum::http::HeaderValue;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryCache::new()))
    }

    #[test]
    fn test_client_identifier_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), "unknown");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_identifier(&headers), "3.3.3.3");

        headers.insert("x-real-ip", HeaderValue::from_static("2.2.2.2"));
        assert_eq!(client_identifier(&headers), "2.2.2.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 1.1.1.1 , 10.0.0.1"),
        );
        assert_eq!(client_identifier(&headers), "1.1.1.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_after_limit() {
        let limiter = limiter();
        let config = RateLimitConfig::per_minute(3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("payment", "1.1.1.1", config).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("payment", "1.1.1.1", config).await;
        assert!(!denied.allowed);
        assert_eq!(denied.reset_in_secs, 60);

        // Other clients and scopes have their own windows
        assert!(limiter.check("payment", "2.2.2.2", config).await.allowed);
        assert!(limiter.check("callback", "1.1.1.1", config).await.allowed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.check("payment", "1.1.1.1", config).await.allowed);
    }

    #[tokio::test]
    async fn test_enforce_returns_rate_limit_error() {
        let limiter = limiter();
        let headers = HeaderMap::new();
        let config = RateLimitConfig::per_minute(1);

        assert!(limiter.enforce("verify", &headers, config).await.is_ok());
        let err = limiter.enforce("verify", &headers, config).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
    }
}
