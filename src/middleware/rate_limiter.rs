//! Per-client token bucket rate limiting

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_take(&mut self, refill_per_second: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_second).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Buckets keyed by client address. Bursts of twice the per-second rate
/// are allowed.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    refill_per_second: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = f64::from(requests_per_second.max(1));
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            refill_per_second: rps,
            capacity: rps * 2.0,
        }
    }

    pub async fn check(&self, client: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity))
            .try_take(self.refill_per_second, self.capacity)
    }

    /// Forget clients idle for longer than `max_idle`
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_idle);
        before - buckets.len()
    }
}

/// Middleware rejecting callers over their budget with 429
pub async fn rate_limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let client = client_key(request.headers());

    if !limiter.check(&client).await {
        tracing::warn!(client = %client, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "1")],
            Json(json!({
                "error": { "code": "RATE_LIMITED", "message": "Too many requests" }
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(5);

        for _ in 0..10 {
            assert!(limiter.check("client").await);
        }
        assert!(!limiter.check("client").await);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.check("a").await);
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        assert!(limiter.check("b").await);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let limiter = RateLimiter::new(1);
        limiter.check("a").await;

        assert_eq!(limiter.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(limiter.evict_idle(Duration::ZERO).await, 1);
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.9"));
        assert_eq!(client_key(&headers), "10.0.0.1");
    }
}
