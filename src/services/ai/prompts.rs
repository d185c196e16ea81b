//! Per-feature prompt templates
//!
//! Each feature has a system prompt and a user template. The user template
//! carries a single `{{context}}` placeholder that receives the JSON input.

use serde_json::Value;

use crate::models::FeatureType;

const CONTEXT_PLACEHOLDER: &str = "{{context}}";

const SYSTEM_PROMPT: &str = "You are an assistant for a vehicle co-ownership platform. \
Members share a vehicle in proportion to their ownership percentages. \
Answer with a single JSON object and nothing else.";

const SCHEDULE_TEMPLATE: &str = r#"Propose a fair weekly booking schedule for this group.
Weight each member's hours by their ownership percentage and avoid the conflicts visible in the booking history.

Group data:
{{context}}

Respond with JSON of the form:
{"recommended_schedule": [{"user_id": "...", "day": "...", "start_time": "HH:MM", "end_time": "HH:MM", "hours": 0, "reason": "..."}],
 "fairness_metrics": {"overall_score": 0.0},
 "conflicts": [],
 "suggestions": []}"#;

const COST_TEMPLATE: &str = r#"Analyse the shared vehicle expenses below.
Predict next period's total, flag unusual expenses and suggest savings.

Expense data:
{{context}}

Respond with JSON of the form:
{"predictions": {"next_period_total": 0.0, "basis": "..."},
 "anomaly_detection": {"is_anomaly": false, "anomalies": []},
 "optimization_suggestions": []}"#;

const DISPUTE_TEMPLATE: &str = r#"Assess the dispute between co-owners described below.
Rate its severity as low, medium, high or critical and propose neutral resolution and mediation steps.

Dispute data:
{{context}}

Respond with JSON of the form:
{"severity_level": "medium", "summary": "...",
 "resolution_suggestions": [],
 "mediation_steps": []}"#;

const ANALYTICS_TEMPLATE: &str = r#"Describe how this group uses its vehicle.
Identify usage patterns, peak usage times and opportunities to share the vehicle better.

Usage data:
{{context}}

Respond with JSON of the form:
{"usage_patterns": {}, "peak_usage_times": [],
 "optimization_opportunities": [], "insights": []}"#;

const FAIRNESS_TEMPLATE: &str = r#"The fairness metrics below were computed from real bookings and are authoritative.
Do not recompute them. Explain them to the group and suggest concrete changes for members whose usage deviates from their share.

Fairness data:
{{context}}

Respond with JSON of the form:
{"insights": ["..."], "recommendations": ["..."]}"#;

/// User template for a feature, before substitution
pub fn template(feature: FeatureType) -> &'static str {
    match feature {
        FeatureType::Schedule => SCHEDULE_TEMPLATE,
        FeatureType::Cost => COST_TEMPLATE,
        FeatureType::Dispute => DISPUTE_TEMPLATE,
        FeatureType::Analytics => ANALYTICS_TEMPLATE,
        FeatureType::Fairness => FAIRNESS_TEMPLATE,
    }
}

/// Final prompt sent to the provider: system prompt plus the user template
/// with the context substituted
pub fn render(template: &str, context: &Value) -> String {
    let context = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    let user = template.replace(CONTEXT_PLACEHOLDER, &context);
    format!("{}\n\n{}", SYSTEM_PROMPT, user)
}
