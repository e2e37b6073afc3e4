//! Rate limiting middleware using a token bucket.
//!
//! One bucket is shared by every request that passes through the layer; it
//! is not keyed by client. An empty bucket fails fast with 429, nothing is
//! queued.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    config: RateLimitConfig,
}

/// Information about rate limit status
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// Whole tokens left after this request
    pub remaining: u32,
    pub limit: u32,
}

impl RateLimiter {
    /// Create a limiter whose bucket starts full
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    pub fn check(&self) -> Result<RateLimitInfo, u64> {
        self.check_at(Instant::now())
    }

    /// Take one token as of `now`.
    /// Returns Err(retry_after_seconds) when the bucket is empty.
    pub fn check_at(&self, now: Instant) -> Result<RateLimitInfo, u64> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
            });
        }

        let capacity = self.config.burst as f64;
        let rate = self.config.refill_per_second;

        let mut bucket = self.bucket.lock();

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(capacity);
        bucket.last_refill = now.max(bucket.last_refill);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(RateLimitInfo {
                remaining: bucket.tokens.floor() as u32,
                limit: self.config.burst,
            })
        } else if rate <= 0.0 {
            Err(60)
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(((missing / rate).ceil() as u64).max(1))
        }
    }
}

/// Middleware guarding the wrapped routes with the shared bucket
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match state.rate_limiter.check() {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", info.limit.into());
            headers.insert("x-ratelimit-remaining", info.remaining.into());
            response
        }
        Err(retry_after) => {
            tracing::warn!(
                path = %request.uri().path(),
                retry_after,
                "Rate limit exceeded"
            );
            metrics::counter!(super::metrics::RATE_LIMITED_TOTAL).increment(1);
            ApiError::rate_limited(retry_after).into_response()
        }
    }
}
