//! Per-identity request rate limiting. The token-bucket math is
//! `kimberlite-server::connection::RateLimiter`'s, adapted from per-TCP-
//! connection state to a registry keyed by caller identity: axum hands
//! each request to a fresh handler rather than a long-lived connection
//! actor, so there's no single `Connection` to hang a limiter off of here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::CallerAccess;
use crate::state::AppState;

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate_per_ns: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            tokens: capacity,
            refill_rate_per_ns: capacity / window.as_nanos() as f64,
            last_refill: Instant::now(),
        }
    }

    fn check(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ns = now.duration_since(self.last_refill).as_nanos() as f64;
        self.tokens = (self.tokens + elapsed_ns * self.refill_rate_per_ns).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Default bucket: 100 requests per second per caller, generous enough for
/// a CLI hammering `/v1/services` in a loop but bounded against a runaway
/// client.
const DEFAULT_CAPACITY: u32 = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

pub struct RateLimiters {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter registry poisoned");
        buckets.entry(key.to_string()).or_insert_with(|| TokenBucket::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)).check()
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware layered after [`crate::auth::authenticate`], so a
/// `CallerAccess` extension is already present to key the bucket by.
pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let key = req
        .extensions()
        .get::<CallerAccess>()
        .map_or_else(|| "anonymous".to_string(), |access| format!("{:?}", access.0));

    if state.rate_limiters.check(&key) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, Json(json!({"type": "error", "status-code": 429, "result": {"kind": "generic", "message": "rate limit exceeded"}}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_bucket_rejects_until_refill() {
        let mut bucket = TokenBucket::new(1, Duration::from_millis(50));
        assert!(bucket.check());
        assert!(!bucket.check());
        std::thread::sleep(Duration::from_millis(60));
        assert!(bucket.check());
    }

    #[test]
    fn distinct_keys_get_independent_buckets() {
        let limiters = RateLimiters::new();
        for _ in 0..DEFAULT_CAPACITY {
            assert!(limiters.check("alice"));
        }
        assert!(!limiters.check("alice"));
        assert!(limiters.check("bob"));
    }
}
