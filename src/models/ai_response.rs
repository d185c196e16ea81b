use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::FeatureType;

/// Structured AI output, one variant per feature.
///
/// Field names follow the JSON the model is asked to produce (snake_case).
/// Keys the model adds beyond the schema are kept in `extra` so nothing it
/// said is lost between validation and persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "featureType", content = "data", rename_all = "lowercase")]
pub enum AiResponse {
    Schedule(ScheduleResponse),
    Cost(CostResponse),
    Dispute(DisputeResponse),
    Analytics(AnalyticsResponse),
    Fairness(FairnessInsights),
}

impl AiResponse {
    pub fn feature_type(&self) -> FeatureType {
        match self {
            AiResponse::Schedule(_) => FeatureType::Schedule,
            AiResponse::Cost(_) => FeatureType::Cost,
            AiResponse::Dispute(_) => FeatureType::Dispute,
            AiResponse::Analytics(_) => FeatureType::Analytics,
            AiResponse::Fairness(_) => FeatureType::Fairness,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleResponse {
    #[serde(default)]
    pub recommended_schedule: Vec<ScheduleSlot>,
    pub fairness_metrics: FairnessMetrics,
    #[serde(default)]
    pub conflicts: Vec<Value>,
    #[serde(default)]
    pub suggestions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSlot {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FairnessMetrics {
    /// 0..=1
    pub overall_score: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<CostPrediction>,
    pub anomaly_detection: AnomalyDetection,
    #[serde(default)]
    pub optimization_suggestions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostPrediction {
    pub next_period_total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyDetection {
    pub is_anomaly: bool,
    #[serde(default)]
    pub anomalies: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisputeResponse {
    pub severity_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub resolution_suggestions: Vec<Value>,
    #[serde(default)]
    pub mediation_steps: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsResponse {
    pub usage_patterns: Map<String, Value>,
    pub optimization_opportunities: Vec<Value>,
    #[serde(default)]
    pub peak_usage_times: Vec<Value>,
    #[serde(default)]
    pub insights: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FairnessInsights {
    pub insights: Vec<Value>,
    pub recommendations: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FairnessInsights {
    /// Flattens free-form insight entries into display strings
    pub fn insight_lines(&self) -> Vec<String> {
        self.insights.iter().map(value_to_line).collect()
    }

    pub fn recommendation_lines(&self) -> Vec<String> {
        self.recommendations.iter().map(value_to_line).collect()
    }
}

fn value_to_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
