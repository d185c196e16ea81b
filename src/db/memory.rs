use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::RecommendationStore;
use crate::error::AppResult;
use crate::models::{
    FairnessRecord, Recommendation, RecommendationStatus, UsageLogEntry, UserFeedback,
};

/// Process-local store backing the pipeline and API tests
#[derive(Default)]
pub struct InMemoryStore {
    recommendations: RwLock<HashMap<Uuid, Recommendation>>,
    fairness_records: RwLock<Vec<FairnessRecord>>,
    usage_logs: RwLock<Vec<UsageLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recommendations(&self) -> Vec<Recommendation> {
        self.recommendations.read().await.values().cloned().collect()
    }

    pub async fn fairness_records(&self) -> Vec<FairnessRecord> {
        self.fairness_records.read().await.clone()
    }

    pub async fn usage_logs(&self) -> Vec<UsageLogEntry> {
        self.usage_logs.read().await.clone()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for InMemoryStore {
    async fn create_recommendation(&self, recommendation: &Recommendation) -> AppResult<()> {
        self.recommendations
            .write()
            .await
            .insert(recommendation.id, recommendation.clone());
        Ok(())
    }

    async fn find_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>> {
        Ok(self.recommendations.read().await.get(&id).cloned())
    }

    async fn update_feedback(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        feedback: &UserFeedback,
        updated_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut recommendations = self.recommendations.write().await;
        match recommendations.get_mut(&id) {
            Some(rec) if rec.status == RecommendationStatus::Active => {
                rec.status = status;
                rec.user_feedback = Some(feedback.clone());
                rec.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_fairness_record(&self, record: &FairnessRecord) -> AppResult<()> {
        self.fairness_records.write().await.push(record.clone());
        Ok(())
    }

    async fn create_usage_log(&self, entry: &UsageLogEntry) -> AppResult<()> {
        self.usage_logs.write().await.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiResponse, FairnessInsights, FeatureType, TriggerSource};
    use serde_json::{json, Map};

    fn recommendation() -> Recommendation {
        let now = Utc::now();
        Recommendation {
            id: Uuid::new_v4(),
            group_id: "g1".to_string(),
            user_id: "u1".to_string(),
            feature_type: FeatureType::Fairness,
            input_summary: json!({}),
            ai_response: AiResponse::Fairness(FairnessInsights {
                insights: vec![],
                recommendations: vec![],
                extra: Map::new(),
            }),
            confidence_score: 0.8,
            status: RecommendationStatus::Active,
            trigger_source: TriggerSource::UserRequest,
            user_feedback: None,
            model: "test-model".to_string(),
            processing_time_ms: 10,
            created_at: now,
            updated_at: now,
        }
    }

    fn feedback(accepted: bool) -> UserFeedback {
        UserFeedback {
            user_id: "u1".to_string(),
            rating: Some(4),
            comment: None,
            accepted,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_feedback_only_from_active() {
        let store = InMemoryStore::new();
        let rec = recommendation();
        store.create_recommendation(&rec).await.unwrap();

        let first = store
            .update_feedback(rec.id, RecommendationStatus::Accepted, &feedback(true), Utc::now())
            .await
            .unwrap();
        let second = store
            .update_feedback(rec.id, RecommendationStatus::Rejected, &feedback(false), Utc::now())
            .await
            .unwrap();

        assert!(first);
        assert!(!second);

        let stored = store.find_recommendation(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Accepted);
        assert_eq!(stored.user_feedback.map(|f| f.accepted), Some(true));
    }

    #[tokio::test]
    async fn test_update_feedback_unknown_id() {
        let store = InMemoryStore::new();
        let updated = store
            .update_feedback(Uuid::new_v4(), RecommendationStatus::Accepted, &feedback(true), Utc::now())
            .await
            .unwrap();
        assert!(!updated);
    }
}
