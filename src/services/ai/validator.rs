//! Structural validation of AI output
//!
//! Model output is free-form text that usually contains a JSON object. This
//! module extracts that object, fills in required-but-missing fields with
//! safe defaults, converts it into the typed [`AiResponse`] for the feature,
//! and scores how much of the expected structure the model actually supplied.
//!
//! Repairing partially-bad output is the only job here. When there is no AI
//! output at all, the rule-based `fallback` module takes over instead.

use serde_json::{json, Map, Value};

use crate::models::{AiResponse, FeatureType};

pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.95;

const DEFAULT_SCHEDULE_SCORE: f64 = 0.7;
const DEFAULT_SEVERITY: &str = "medium";
const KNOWN_SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

/// Extracts the outermost JSON object from raw model text.
///
/// Falls back to the minimal canonical shape for the feature when no object
/// is present or it does not parse.
pub fn parse(raw: &str, feature: FeatureType) -> Value {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        tracing::warn!(feature = %feature, "No JSON object in AI response");
        return canonical_default(feature);
    };

    if end < start {
        tracing::warn!(feature = %feature, "Unbalanced JSON in AI response");
        return canonical_default(feature);
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => canonical_default(feature),
        Err(e) => {
            tracing::warn!(feature = %feature, error = %e, "Failed to parse AI response JSON");
            canonical_default(feature)
        }
    }
}

/// Minimal well-formed shape per feature, used when the model's output is unusable
pub fn canonical_default(feature: FeatureType) -> Value {
    match feature {
        FeatureType::Schedule => json!({
            "recommended_schedule": [],
            "fairness_metrics": { "overall_score": DEFAULT_SCHEDULE_SCORE },
            "conflicts": [],
            "suggestions": []
        }),
        FeatureType::Cost => json!({
            "anomaly_detection": { "is_anomaly": false, "anomalies": [] },
            "optimization_suggestions": []
        }),
        FeatureType::Dispute => json!({
            "severity_level": DEFAULT_SEVERITY,
            "resolution_suggestions": [],
            "mediation_steps": []
        }),
        FeatureType::Analytics => json!({
            "usage_patterns": {},
            "optimization_opportunities": []
        }),
        FeatureType::Fairness => json!({
            "insights": [],
            "recommendations": []
        }),
    }
}

/// Fills required fields and converts into the typed response.
///
/// Values the model supplied are never overwritten; only absent or null
/// required fields are defaulted. Scalars delivered as strings ("0.8",
/// "true") are coerced. If the result still does not fit the schema, the
/// canonical default is used.
pub fn normalize(parsed: Value, feature: FeatureType) -> AiResponse {
    let mut object = match parsed {
        Value::Object(map) => map,
        _ => as_object(canonical_default(feature)),
    };

    fill_defaults(&mut object, feature);

    match into_typed(Value::Object(object), feature) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(feature = %feature, error = %e, "AI response does not match schema, using defaults");
            let fallback = canonical_default(feature);
            // Canonical shapes always satisfy the schema
            into_typed(fallback, feature).unwrap_or_else(|_| empty_response(feature))
        }
    }
}

/// Parse and normalize in one step
pub fn validate(raw: &str, feature: FeatureType) -> AiResponse {
    normalize(parse(raw, feature), feature)
}

fn fill_defaults(object: &mut Map<String, Value>, feature: FeatureType) {
    match feature {
        FeatureType::Schedule => {
            ensure_object(object, "fairness_metrics");
            if let Some(Value::Object(metrics)) = object.get_mut("fairness_metrics") {
                coerce_f64(metrics, "overall_score");
                default_field(metrics, "overall_score", json!(DEFAULT_SCHEDULE_SCORE));
            }
        }
        FeatureType::Cost => {
            ensure_object(object, "anomaly_detection");
            if let Some(Value::Object(anomaly)) = object.get_mut("anomaly_detection") {
                coerce_bool(anomaly, "is_anomaly");
                default_field(anomaly, "is_anomaly", json!(false));
            }
            if let Some(Value::Object(predictions)) = object.get_mut("predictions") {
                coerce_f64(predictions, "next_period_total");
            }
        }
        FeatureType::Dispute => {
            default_field(object, "severity_level", json!(DEFAULT_SEVERITY));
        }
        FeatureType::Analytics => {
            default_field(object, "usage_patterns", json!({}));
            default_field(object, "optimization_opportunities", json!([]));
        }
        FeatureType::Fairness => {
            default_field(object, "insights", json!([]));
            default_field(object, "recommendations", json!([]));
        }
    }
}

/// Makes sure `key` holds an object, replacing a missing or non-object value
fn ensure_object(object: &mut Map<String, Value>, key: &str) {
    if !matches!(object.get(key), Some(Value::Object(_))) {
        object.insert(key.to_string(), Value::Object(Map::new()));
    }
}

fn default_field(object: &mut Map<String, Value>, key: &str, default: Value) {
    match object.get(key) {
        None | Some(Value::Null) => {
            object.insert(key.to_string(), default);
        }
        Some(_) => {}
    }
}

fn coerce_f64(object: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = object.get(key) {
        if let Some(n) = s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            object.insert(key.to_string(), Value::Number(n));
        }
    }
}

fn coerce_bool(object: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = object.get(key) {
        if let Ok(b) = s.trim().to_lowercase().parse::<bool>() {
            object.insert(key.to_string(), Value::Bool(b));
        }
    }
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn into_typed(value: Value, feature: FeatureType) -> Result<AiResponse, serde_json::Error> {
    Ok(match feature {
        FeatureType::Schedule => AiResponse::Schedule(serde_json::from_value(value)?),
        FeatureType::Cost => AiResponse::Cost(serde_json::from_value(value)?),
        FeatureType::Dispute => AiResponse::Dispute(serde_json::from_value(value)?),
        FeatureType::Analytics => AiResponse::Analytics(serde_json::from_value(value)?),
        FeatureType::Fairness => AiResponse::Fairness(serde_json::from_value(value)?),
    })
}

fn empty_response(feature: FeatureType) -> AiResponse {
    use crate::models::{
        AnalyticsResponse, AnomalyDetection, CostResponse, DisputeResponse, FairnessInsights,
        FairnessMetrics, ScheduleResponse,
    };

    match feature {
        FeatureType::Schedule => AiResponse::Schedule(ScheduleResponse {
            recommended_schedule: vec![],
            fairness_metrics: FairnessMetrics {
                overall_score: DEFAULT_SCHEDULE_SCORE,
                extra: Map::new(),
            },
            conflicts: vec![],
            suggestions: vec![],
            extra: Map::new(),
        }),
        FeatureType::Cost => AiResponse::Cost(CostResponse {
            predictions: None,
            anomaly_detection: AnomalyDetection {
                is_anomaly: false,
                anomalies: vec![],
                extra: Map::new(),
            },
            optimization_suggestions: vec![],
            extra: Map::new(),
        }),
        FeatureType::Dispute => AiResponse::Dispute(DisputeResponse {
            severity_level: DEFAULT_SEVERITY.to_string(),
            summary: None,
            resolution_suggestions: vec![],
            mediation_steps: vec![],
            extra: Map::new(),
        }),
        FeatureType::Analytics => AiResponse::Analytics(AnalyticsResponse {
            usage_patterns: Map::new(),
            optimization_opportunities: vec![],
            peak_usage_times: vec![],
            insights: vec![],
            extra: Map::new(),
        }),
        FeatureType::Fairness => AiResponse::Fairness(FairnessInsights {
            insights: vec![],
            recommendations: vec![],
            extra: Map::new(),
        }),
    }
}

/// Heuristic trust in a validated response, in `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
///
/// Each feature weighs the sub-results the model supplied; a response that
/// only carries defaults scores at the floor.
pub fn score_confidence(response: &AiResponse) -> f64 {
    let raw = match response {
        AiResponse::Schedule(r) => {
            0.5 * r.fairness_metrics.overall_score.clamp(0.0, 1.0)
                + 0.3 * present(!r.recommended_schedule.is_empty())
                + 0.2 * present(!r.suggestions.is_empty())
        }
        AiResponse::Cost(r) => {
            // An anomaly flag without details is only half an answer
            let anomaly_evidence = if r.anomaly_detection.is_anomaly {
                present(!r.anomaly_detection.anomalies.is_empty())
            } else {
                0.5
            };
            0.4 * present(r.predictions.is_some())
                + 0.3 * present(!r.optimization_suggestions.is_empty())
                + 0.3 * anomaly_evidence
        }
        AiResponse::Dispute(r) => {
            0.4 * present(KNOWN_SEVERITIES.contains(&r.severity_level.to_lowercase().as_str()))
                + 0.3 * present(!r.resolution_suggestions.is_empty())
                + 0.3 * present(!r.mediation_steps.is_empty())
        }
        AiResponse::Analytics(r) => {
            0.4 * present(!r.usage_patterns.is_empty())
                + 0.3 * present(!r.optimization_opportunities.is_empty())
                + 0.3 * present(!r.peak_usage_times.is_empty() || !r.insights.is_empty())
        }
        AiResponse::Fairness(r) => {
            0.5 * present(!r.insights.is_empty()) + 0.5 * present(!r.recommendations.is_empty())
        }
    };

    raw.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

fn present(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
