//! Domain events over Redis pub/sub
//!
//! Publishing is best-effort: a bounded number of attempts, then the failure
//! is logged and dropped. Upstream services' events are consumed only to
//! invalidate cached recommendations for the affected group.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::db::Cache;
use crate::error::{AppError, AppResult};

pub const RECOMMENDATION_GENERATED: &str = "recommendation.generated";
pub const FAIRNESS_ANALYZED: &str = "fairness.analyzed";
pub const RECOMMENDATION_FEEDBACK: &str = "recommendation.feedback";

/// Upstream events that make a group's cached results obsolete
pub const INVALIDATING_EVENTS: [&str; 3] = ["booking.created", "cost.created", "dispute.created"];

const LISTENER_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_type: String,
    pub group_id: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: &str, group_id: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            group_id: group_id.to_string(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()>;
}

/// Publishes each event on the Redis channel named after its type
#[derive(Clone)]
pub struct RedisEventBus {
    conn: ConnectionManager,
    attempts: u32,
    retry_delay: Duration,
}

impl RedisEventBus {
    pub async fn new(client: redis::Client, attempts: u32, retry_delay: Duration) -> AppResult<Self> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            attempts: attempts.max(1),
            retry_delay,
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Internal(format!("Event serialization error: {}", e)))?;
        let mut conn = self.conn.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result: redis::RedisResult<i64> =
                conn.publish(&event.event_type, &payload).await;

            match result {
                Ok(receivers) => {
                    tracing::debug!(
                        event = %event.event_type,
                        group_id = %event.group_id,
                        receivers,
                        "Event published"
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        event = %event.event_type,
                        attempt,
                        error = %e,
                        "Event publish failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        event = %event.event_type,
                        group_id = %event.group_id,
                        attempts = attempt,
                        error = %e,
                        "Event publish failed, dropping event"
                    );
                    return Err(e.into());
                }
            }
        }
    }
}

/// Publisher for deployments without a message bus
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait::async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        tracing::debug!(event = %event.event_type, "No event bus configured, event skipped");
        Ok(())
    }
}

/// Group id carried by an upstream event payload
fn group_id_from_payload(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    ["groupId", "group_id"]
        .iter()
        .find_map(|field| value.get(*field)?.as_str().map(str::to_string))
        .or_else(|| {
            value
                .get("payload")
                .and_then(|inner| inner.get("groupId"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

async fn run_invalidation_listener(client: &redis::Client, cache: &Cache) -> AppResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    for channel in INVALIDATING_EVENTS {
        pubsub.subscribe(channel).await?;
    }
    tracing::info!(channels = ?INVALIDATING_EVENTS, "Cache invalidation listener subscribed");

    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Unreadable event payload");
                continue;
            }
        };

        let Some(group_id) = group_id_from_payload(&payload) else {
            tracing::warn!(channel = %channel, "Event without group id ignored");
            continue;
        };

        if let Err(e) = cache.invalidate_group(&group_id).await {
            tracing::error!(channel = %channel, group_id = %group_id, error = %e, "Cache invalidation failed");
        }
    }

    Ok(())
}

/// Keeps a subscription to upstream domain events alive in the background,
/// reconnecting after failures
pub fn spawn_invalidation_listener(client: redis::Client, cache: Cache) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_invalidation_listener(&client, &cache).await {
                Ok(()) => tracing::warn!("Event subscription closed"),
                Err(e) => tracing::error!(error = %e, "Event subscription failed"),
            }
            tokio::time::sleep(LISTENER_RECONNECT_DELAY).await;
        }
    })
}
