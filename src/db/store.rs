use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    FairnessRecord, Recommendation, RecommendationStatus, UsageLogEntry, UserFeedback,
};

/// Durable storage for recommendations, fairness analyses and usage telemetry
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn create_recommendation(&self, recommendation: &Recommendation) -> AppResult<()>;

    async fn find_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>>;

    /// Moves an `active` recommendation to `status` and attaches the feedback.
    ///
    /// Returns `false` when the recommendation is no longer active, so two
    /// concurrent feedback submissions cannot both succeed.
    async fn update_feedback(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        feedback: &UserFeedback,
        updated_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn create_fairness_record(&self, record: &FairnessRecord) -> AppResult<()>;

    async fn create_usage_log(&self, entry: &UsageLogEntry) -> AppResult<()>;
}
