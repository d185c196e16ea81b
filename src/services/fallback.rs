//! Rule-based responses used when the AI provider is unavailable
//!
//! Everything here is derived from the original request alone. Output is
//! deterministic and always returned with `is_fallback = true` and a fixed
//! confidence of [`FALLBACK_CONFIDENCE`].

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::models::{
    AiResponse, AnalyticsResponse, AnomalyDetection, CostPrediction, CostRequest, CostResponse,
    DisputeRequest, DisputeResponse, FairnessInsights, FairnessLevel, FairnessMetrics,
    FallbackInput, FallbackResult, GroupFairnessResult, ScheduleRequest, ScheduleResponse,
    ScheduleSlot, UsageAnalyticsRequest, UsageStatus,
};

pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Weekly hours split between members in proportion to ownership
const WEEKLY_HOURS_POOL: f64 = 40.0;
const MAX_WEEKLY_HOURS_PER_MEMBER: f64 = 20.0;

/// Builds the full fallback result for a request
pub fn generate(input: FallbackInput<'_>, reason: &str, now: DateTime<Utc>) -> FallbackResult {
    let (group_id, response) = match input {
        FallbackInput::Schedule(req) => (&req.group_id, schedule(req)),
        FallbackInput::Cost(req) => (&req.group_id, cost(req)),
        FallbackInput::Dispute(req) => (&req.group_id, dispute(req)),
        FallbackInput::Analytics(req) => (&req.group_id, analytics(req)),
    };

    FallbackResult {
        group_id: group_id.clone(),
        feature_type: response.feature_type(),
        response,
        confidence_score: FALLBACK_CONFIDENCE,
        is_fallback: true,
        reason: reason.to_string(),
        generated_at: now,
    }
}

/// Weekly allocation proportional to ownership, capped per member
pub fn schedule(request: &ScheduleRequest) -> AiResponse {
    let recommended_schedule = request
        .members
        .iter()
        .map(|member| {
            let hours = (member.ownership_percentage / 100.0 * WEEKLY_HOURS_POOL)
                .clamp(0.0, MAX_WEEKLY_HOURS_PER_MEMBER);
            ScheduleSlot {
                user_id: member.user_id.clone(),
                day: None,
                start_time: None,
                end_time: None,
                hours,
                reason: Some(format!(
                    "{:.0}% ownership share of the weekly allocation",
                    member.ownership_percentage
                )),
                extra: Map::new(),
            }
        })
        .collect();

    AiResponse::Schedule(ScheduleResponse {
        recommended_schedule,
        fairness_metrics: FairnessMetrics {
            overall_score: FALLBACK_CONFIDENCE,
            extra: Map::new(),
        },
        conflicts: vec![],
        suggestions: vec![json!(
            "Schedule generated from ownership shares; AI recommendations are temporarily unavailable"
        )],
        extra: Map::new(),
    })
}

/// Next-period prediction as the mean of historical amounts
pub fn cost(request: &CostRequest) -> AiResponse {
    let next_period_total = if request.expenses.is_empty() {
        0.0
    } else {
        request.expenses.iter().map(|e| e.amount).sum::<f64>() / request.expenses.len() as f64
    };

    AiResponse::Cost(CostResponse {
        predictions: Some(CostPrediction {
            next_period_total,
            basis: Some("historical_average".to_string()),
            extra: Map::new(),
        }),
        anomaly_detection: AnomalyDetection {
            is_anomaly: false,
            anomalies: vec![],
            extra: Map::new(),
        },
        optimization_suggestions: vec![json!(
            "Review recurring expenses with the group; detailed analysis is temporarily unavailable"
        )],
        extra: Map::new(),
    })
}

/// Fixed medium-severity assessment with a generic mediation path
pub fn dispute(request: &DisputeRequest) -> AiResponse {
    AiResponse::Dispute(DisputeResponse {
        severity_level: "medium".to_string(),
        summary: Some(format!(
            "{} dispute between {} parties awaiting review",
            request.category,
            request.parties.len()
        )),
        resolution_suggestions: vec![
            json!("Arrange a group discussion to hear every party"),
            json!("Refer to the co-ownership agreement for the disputed terms"),
        ],
        mediation_steps: vec![
            json!("Each party states their position in writing"),
            json!("Identify the clauses of the agreement that apply"),
            json!("Agree on a resolution or escalate to a neutral mediator"),
        ],
        extra: Map::new(),
    })
}

/// Static heuristic peak-usage windows
pub fn analytics(request: &UsageAnalyticsRequest) -> AiResponse {
    let mut usage_patterns = Map::new();
    usage_patterns.insert("bookingCount".to_string(), json!(request.bookings.len()));
    usage_patterns.insert("memberCount".to_string(), json!(request.members.len()));

    AiResponse::Analytics(AnalyticsResponse {
        usage_patterns,
        optimization_opportunities: vec![json!(
            "Spread bookings across weekdays to reduce weekend contention"
        )],
        peak_usage_times: vec![
            json!({"day": "Friday", "window": "17:00-21:00"}),
            json!({"day": "Saturday", "window": "09:00-13:00"}),
            json!({"day": "Sunday", "window": "10:00-16:00"}),
        ],
        insights: vec![],
        extra: Map::new(),
    })
}

/// Rule-based insights for a computed fairness result
pub fn fairness_insights(result: &GroupFairnessResult) -> FairnessInsights {
    let mut insights: Vec<Value> = vec![json!(format!(
        "Overall fairness is {:.0}/100 ({})",
        result.overall_fairness_score,
        level_label(result.fairness_level)
    ))];
    let mut recommendations: Vec<Value> = Vec::new();

    for member in &result.members {
        match member.status {
            UsageStatus::Overuse => {
                insights.push(json!(format!(
                    "Member {} uses {:.1} points more than their ownership share",
                    member.stats.user_id, member.stats.usage_deviation
                )));
                recommendations.push(json!(format!(
                    "Member {} should reduce bookings towards {:.1} hours",
                    member.stats.user_id, member.recommended_hours
                )));
            }
            UsageStatus::Underuse => {
                insights.push(json!(format!(
                    "Member {} uses {:.1} points less than their ownership share",
                    member.stats.user_id,
                    member.stats.usage_deviation.abs()
                )));
                recommendations.push(json!(format!(
                    "Member {} can book up to {:.1} hours",
                    member.stats.user_id, member.recommended_hours
                )));
            }
            UsageStatus::Fair => {}
        }
    }

    if recommendations.is_empty() {
        recommendations.push(json!("Usage matches ownership; keep the current schedule"));
    }

    FairnessInsights {
        insights,
        recommendations,
        extra: Map::new(),
    }
}

fn level_label(level: FairnessLevel) -> &'static str {
    match level {
        FairnessLevel::Excellent => "excellent",
        FairnessLevel::Good => "good",
        FairnessLevel::Fair => "fair",
        FairnessLevel::NeedsImprovement => "needs improvement",
        FairnessLevel::Poor => "poor",
    }
}
