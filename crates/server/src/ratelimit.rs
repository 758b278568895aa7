//! Per-credential request rate limiting for the authorize endpoint.
//!
//! Each key (the caller's bearer credential) gets its own token bucket. Idle
//! buckets are evicted by a periodic sweep so the map does not grow without
//! bound.

use std::{
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota};

use crate::ServerError;

/// Admission gate. `check` consumes one unit for `key` and says whether the
/// request may proceed.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_second: 5,
            burst: 5,
        }
    }
}

struct Bucket {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Single-instance limiter backed by a concurrent map.
pub struct InMemoryRateLimiter {
    buckets: DashMap<String, Bucket>,
    quota: Quota,
}

impl InMemoryRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        let per_second = NonZeroU32::new(settings.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst).unwrap_or(per_second);
        Self {
            buckets: DashMap::new(),
            quota: Quota::per_second(per_second).allow_burst(burst),
        }
    }

    /// Drop buckets not used for at least `idle`.
    pub fn cleanup(&self, idle: Duration) {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) < idle);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate limit buckets");
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Run [`InMemoryRateLimiter::cleanup`] every `interval` until the task
    /// is aborted.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.cleanup(idle);
            }
        })
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, key: &str) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                limiter: DefaultDirectRateLimiter::direct(self.quota),
                last_seen: Instant::now(),
            });
        bucket.last_seen = Instant::now();
        bucket.limiter.check().is_ok()
    }
}

pub(crate) async fn limit_by_credential(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(ServerError::Unauthorized);
    };
    if !limiter.check(bearer.token()) {
        tracing::warn!("rate limit exceeded on authorize");
        return Err(ServerError::TooManyRequests);
    }
    Ok(next.run(request).await)
}
