use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FeatureType;

/// One telemetry row per orchestration call, whatever the outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub user_id: String,
    pub group_id: String,
    pub feature_type: FeatureType,
    pub endpoint: String,
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
