//! Per-user, per-feature admission control
//!
//! Each `(user, feature)` pair gets a sliding one-minute window holding the
//! timestamps of admitted requests. A request is admitted only while the
//! window holds fewer entries than the feature's per-minute capacity.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::FeatureType;

pub const WINDOW: Duration = Duration::from_secs(60);

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Records the request if the window has room, otherwise fails with
    /// [`AppError::RateLimitExceeded`]
    async fn admit(&self, user_id: &str, feature: FeatureType) -> AppResult<()>;
}

fn rejection(feature: FeatureType, limit: u32, retry_after: Duration) -> AppError {
    let retry_after_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    AppError::RateLimitExceeded {
        feature,
        limit,
        retry_after_secs: retry_after_secs.max(1),
    }
}

type WindowKey = (String, FeatureType);

#[derive(Default)]
struct Windows {
    by_key: HashMap<WindowKey, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Windows {
    /// Drops keys whose newest request has left the window, at most once
    /// per window length
    fn sweep_idle(&mut self, now: Instant) {
        let due = self
            .last_sweep
            .map_or(true, |last| now.saturating_duration_since(last) >= WINDOW);
        if !due {
            return;
        }

        let before = self.by_key.len();
        self.by_key.retain(|_, window| {
            window
                .back()
                .is_some_and(|newest| now.saturating_duration_since(*newest) < WINDOW)
        });
        self.last_sweep = Some(now);

        let dropped = before - self.by_key.len();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.by_key.len(), "Dropped idle rate limit windows");
        }
    }
}

/// Process-local sliding window limiter
#[derive(Default)]
pub struct SlidingWindowLimiter {
    windows: Mutex<Windows>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission check against an explicit clock
    pub async fn admit_at(&self, user_id: &str, feature: FeatureType, now: Instant) -> AppResult<()> {
        let Some(limit) = feature.requests_per_minute() else {
            return Ok(());
        };

        // Held across prune, check and record so concurrent callers for the
        // same key cannot both take the last slot
        let mut windows = self.windows.lock().await;
        windows.sweep_idle(now);
        let window = windows
            .by_key
            .entry((user_id.to_string(), feature))
            .or_default();

        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit as usize {
            let retry_after = window
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(WINDOW);

            tracing::warn!(
                user_id = %user_id,
                feature = %feature,
                limit,
                "Rate limit exceeded"
            );
            return Err(rejection(feature, limit, retry_after));
        }

        window.push_back(now);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn admit(&self, user_id: &str, feature: FeatureType) -> AppResult<()> {
        self.admit_at(user_id, feature, Instant::now()).await
    }
}

/// Prune, count and record in one round trip so the check is atomic
/// across instances sharing the same Redis
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    return {0, tonumber(oldest[2])}
end

redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, 0}
"#;

/// Sliding window limiter shared through a Redis sorted set per key
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(client: redis::Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    fn key(user_id: &str, feature: FeatureType) -> String {
        format!("ratelimit:{}:{}", feature, user_id)
    }
}

#[async_trait::async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn admit(&self, user_id: &str, feature: FeatureType) -> AppResult<()> {
        let Some(limit) = feature.requests_per_minute() else {
            return Ok(());
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = WINDOW.as_millis() as i64;
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let mut conn = self.conn.clone();
        let (admitted, oldest_ms): (i64, i64) = self
            .script
            .key(Self::key(user_id, feature))
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        if admitted == 1 {
            return Ok(());
        }

        let remaining_ms = (oldest_ms + window_ms - now_ms).max(0) as u64;
        tracing::warn!(
            user_id = %user_id,
            feature = %feature,
            limit,
            "Rate limit exceeded"
        );
        Err(rejection(feature, limit, Duration::from_millis(remaining_ms)))
    }
}
