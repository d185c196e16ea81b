use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{FeatureType, TimeRange};

/// Shared key/value store with per-key TTL
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;

    /// Keys matching a glob pattern: `*`, `?` and backslash escapes
    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Whether the key existed
    async fn del(&self, key: &str) -> AppResult<bool>;
}

/// Ranges whose fairness analyses are cached; custom ranges never are
const CACHED_RANGES: [TimeRange; 4] = [
    TimeRange::Week,
    TimeRange::Month,
    TimeRange::Quarter,
    TimeRange::Year,
];

/// Escapes glob metacharacters so `literal` only matches itself
pub fn escape_pattern(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendation {
        feature: FeatureType,
        group_id: String,
    },
    Fairness {
        group_id: String,
        range: TimeRange,
    },
}

impl CacheKey {
    pub fn recommendation(feature: FeatureType, group_id: &str) -> Self {
        CacheKey::Recommendation {
            feature,
            group_id: group_id.to_string(),
        }
    }

    pub fn fairness(group_id: &str, range: TimeRange) -> Self {
        CacheKey::Fairness {
            group_id: group_id.to_string(),
            range,
        }
    }

    /// Every key a group's results can be cached under
    pub fn for_group(group_id: &str) -> Vec<CacheKey> {
        let recommendations = FeatureType::ALL
            .into_iter()
            .filter(|feature| *feature != FeatureType::Fairness)
            .map(|feature| CacheKey::recommendation(feature, group_id));
        let analyses = CACHED_RANGES
            .into_iter()
            .map(|range| CacheKey::fairness(group_id, range));
        recommendations.chain(analyses).collect()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendation { feature, group_id } => {
                write!(f, "ai:{}:{}", feature, group_id)
            }
            CacheKey::Fairness { group_id, range } => {
                write!(f, "ai:fairness:{}:{}", group_id, range)
            }
        }
    }
}

/// Stored form of a cached value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub payload: T,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// JSON cache over a [`CacheStore`].
///
/// Entries expire at the store after their TTL and are additionally rejected
/// here once older than the staleness window, so a store that keeps entries
/// longer than asked never serves stale results.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    staleness: chrono::Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, staleness_secs: u64) -> Self {
        Self {
            store,
            staleness: chrono::Duration::seconds(staleness_secs as i64),
        }
    }

    /// Sub-second staleness, mostly useful in tests
    pub fn with_staleness(store: Arc<dyn CacheStore>, staleness: Duration) -> Self {
        Self {
            store,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(0)),
        }
    }

    /// Retrieves a value that is present and still fresh
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let Some(json) = self.store.get(&key.to_string()).await? else {
            return Ok(None);
        };

        let envelope: CacheEnvelope<T> = serde_json::from_str(&json)
            .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))?;

        let age = Utc::now() - envelope.created_at;
        if age > self.staleness {
            tracing::debug!(key = %key, age_secs = age.num_seconds(), "Cached entry is stale");
            return Ok(None);
        }

        Ok(Some(envelope.payload))
    }

    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) -> AppResult<()> {
        let envelope = CacheEnvelope {
            payload: value,
            created_at: Utc::now(),
            ttl_seconds: ttl_secs,
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        self.store.set(&key.to_string(), &json, ttl_secs).await
    }

    pub async fn remove(&self, key: &CacheKey) -> AppResult<bool> {
        self.store.del(&key.to_string()).await
    }

    /// Deletes every key matching the glob `pattern`, returning how many were
    /// removed. Untrusted parts of the pattern must go through
    /// [`escape_pattern`].
    pub async fn invalidate(&self, pattern: &str) -> AppResult<usize> {
        let keys = self.store.keys(pattern).await?;
        let mut removed = 0;
        for key in &keys {
            if self.store.del(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Clears all feature-keyed entries for a group.
    ///
    /// Deletes the exact keys rather than matching a pattern, so one group's
    /// id can never reach another group's entries.
    pub async fn invalidate_group(&self, group_id: &str) -> AppResult<usize> {
        let mut removed = 0;
        for key in CacheKey::for_group(group_id) {
            if self.remove(&key).await? {
                removed += 1;
            }
        }
        tracing::info!(group_id = %group_id, removed, "Invalidated group cache");
        Ok(removed)
    }
}

/// Process-local store, for single-instance runs and tests
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|(_, expires_at)| expires_at > now))
    }
}

/// Redis-style glob match supporting `*`, `?` and backslash escapes
fn glob_match(pattern: &str, text: &str) -> bool {
    // (token, is_literal); escaped characters never act as wildcards
    let mut tokens: Vec<(char, bool)> = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => tokens.push((chars.next().unwrap_or('\\'), true)),
            other => tokens.push((other, false)),
        }
    }

    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match tokens.get(pi) {
            Some(&('*', false)) => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&(c, literal)) if (c == '?' && !literal) || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    tokens[pi..].iter().all(|&token| token == ('*', false))
}
