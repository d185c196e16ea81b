use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, types::Json, PgPool, Row};
use uuid::Uuid;

use super::store::RecommendationStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    AiResponse, FairnessRecord, Recommendation, RecommendationStatus, UsageLogEntry, UserFeedback,
};

/// Creates a PostgreSQL connection pool and applies pending migrations
pub async fn create_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Recommendation store backed by PostgreSQL JSONB columns
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn recommendation_from_row(row: &PgRow) -> AppResult<Recommendation> {
        let feature_type: String = row.try_get("feature_type")?;
        let status: String = row.try_get("status")?;
        let trigger_source: String = row.try_get("trigger_source")?;
        let ai_response: Json<AiResponse> = row.try_get("ai_response")?;
        let user_feedback: Option<Json<UserFeedback>> = row.try_get("user_feedback")?;
        let processing_time_ms: i64 = row.try_get("processing_time_ms")?;

        Ok(Recommendation {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            user_id: row.try_get("user_id")?,
            feature_type: feature_type.parse().map_err(AppError::Persistence)?,
            input_summary: row.try_get("input_summary")?,
            ai_response: ai_response.0,
            confidence_score: row.try_get("confidence_score")?,
            status: status.parse().map_err(AppError::Persistence)?,
            trigger_source: trigger_source.parse().map_err(AppError::Persistence)?,
            user_feedback: user_feedback.map(|f| f.0),
            model: row.try_get("model")?,
            processing_time_ms: processing_time_ms.max(0) as u64,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PostgresStore {
    async fn create_recommendation(&self, rec: &Recommendation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendations (
                id, group_id, user_id, feature_type, input_summary, ai_response,
                confidence_score, status, trigger_source, user_feedback, model,
                processing_time_ms, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(rec.id)
        .bind(&rec.group_id)
        .bind(&rec.user_id)
        .bind(rec.feature_type.as_str())
        .bind(&rec.input_summary)
        .bind(Json(&rec.ai_response))
        .bind(rec.confidence_score)
        .bind(rec.status.as_str())
        .bind(rec.trigger_source.as_str())
        .bind(rec.user_feedback.as_ref().map(Json))
        .bind(&rec.model)
        .bind(rec.processing_time_ms as i64)
        .bind(rec.created_at)
        .bind(rec.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>> {
        let row = sqlx::query("SELECT * FROM recommendations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::recommendation_from_row).transpose()
    }

    async fn update_feedback(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        feedback: &UserFeedback,
        updated_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recommendations
            SET status = $2, user_feedback = $3, updated_at = $4
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Json(feedback))
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_fairness_record(&self, record: &FairnessRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fairness_analyses (
                id, group_id, vehicle_id, time_range, period_start, period_end,
                overall_fairness_score, analysis, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.group_id)
        .bind(&record.vehicle_id)
        .bind(record.period.range.to_string())
        .bind(record.period.start)
        .bind(record.period.end)
        .bind(record.result.overall_fairness_score)
        .bind(Json(record))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_usage_log(&self, entry: &UsageLogEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_usage_logs (
                user_id, group_id, feature_type, endpoint, response_time_ms,
                cache_hit, success, error_message, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.group_id)
        .bind(entry.feature_type.as_str())
        .bind(&entry.endpoint)
        .bind(entry.response_time_ms as i64)
        .bind(entry.cache_hit)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
