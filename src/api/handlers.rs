use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{
        CostRequest, DisputeRequest, FairnessAnalysis, FeedbackRequest, GenerationOutcome,
        Recommendation, ScheduleRequest, TimeRange, TriggerSource, UsageAnalyticsRequest,
    },
};

use super::AppState;

/// Header carrying the calling member's id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Calling member, taken from the `x-user-id` header
#[derive(Debug, Clone)]
pub struct CallerId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| CallerId(s.to_string()))
            .ok_or_else(|| AppError::InvalidInput(format!("Missing {} header", USER_ID_HEADER)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairnessAnalysisRequest {
    pub group_id: String,
    #[serde(default = "default_time_range")]
    pub time_range: TimeRange,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn default_time_range() -> TimeRange {
    TimeRange::Month
}

fn require_group(group_id: &str) -> AppResult<()> {
    if group_id.trim().is_empty() {
        return Err(AppError::InvalidInput("groupId cannot be empty".to_string()));
    }
    Ok(())
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn generate_schedule(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Json(request): Json<ScheduleRequest>,
) -> AppResult<Json<GenerationOutcome>> {
    require_group(&request.group_id)?;
    tracing::info!(
        request_id = %request_id,
        group_id = %request.group_id,
        members = request.members.len(),
        "Processing schedule request"
    );

    let outcome = state
        .orchestrator
        .generate_schedule(&request, &user_id, TriggerSource::UserRequest)
        .await?;
    Ok(Json(outcome))
}

pub async fn generate_cost_analysis(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Json(request): Json<CostRequest>,
) -> AppResult<Json<GenerationOutcome>> {
    require_group(&request.group_id)?;
    tracing::info!(
        request_id = %request_id,
        group_id = %request.group_id,
        expenses = request.expenses.len(),
        "Processing cost analysis request"
    );

    let outcome = state
        .orchestrator
        .generate_cost_analysis(&request, &user_id, TriggerSource::UserRequest)
        .await?;
    Ok(Json(outcome))
}

pub async fn generate_dispute_analysis(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Json(request): Json<DisputeRequest>,
) -> AppResult<Json<GenerationOutcome>> {
    require_group(&request.group_id)?;
    tracing::info!(
        request_id = %request_id,
        group_id = %request.group_id,
        "Processing dispute analysis request"
    );

    let outcome = state
        .orchestrator
        .generate_dispute_analysis(&request, &user_id, TriggerSource::UserRequest)
        .await?;
    Ok(Json(outcome))
}

pub async fn generate_usage_analytics(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Json(request): Json<UsageAnalyticsRequest>,
) -> AppResult<Json<GenerationOutcome>> {
    require_group(&request.group_id)?;
    tracing::info!(
        request_id = %request_id,
        group_id = %request.group_id,
        bookings = request.bookings.len(),
        "Processing usage analytics request"
    );

    let outcome = state
        .orchestrator
        .generate_usage_analytics(&request, &user_id, TriggerSource::UserRequest)
        .await?;
    Ok(Json(outcome))
}

pub async fn analyze_fairness(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<FairnessAnalysisRequest>,
) -> AppResult<Json<FairnessAnalysis>> {
    require_group(&request.group_id)?;
    tracing::info!(
        request_id = %request_id,
        group_id = %request.group_id,
        time_range = %request.time_range,
        "Processing fairness analysis request"
    );

    let analysis = state
        .orchestrator
        .analyze_fairness(
            &request.group_id,
            request.time_range,
            request.start_date,
            request.end_date,
        )
        .await?;
    Ok(Json(analysis))
}

pub async fn record_feedback(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Path(recommendation_id): Path<Uuid>,
    Json(feedback): Json<FeedbackRequest>,
) -> AppResult<Json<Recommendation>> {
    tracing::info!(
        request_id = %request_id,
        recommendation_id = %recommendation_id,
        accepted = feedback.accepted,
        "Recording feedback"
    );

    let recommendation = state
        .orchestrator
        .record_feedback(recommendation_id, &user_id, feedback)
        .await?;
    Ok(Json(recommendation))
}
