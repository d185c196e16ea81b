//! Recommendation pipeline
//!
//! Every use case runs the same sequence: admission, cache lookup, AI call
//! through the gateway, then persistence, caching and event publication. When
//! the AI provider is exhausted the rule-based fallback answers instead, and
//! that answer is never persisted or cached.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{Cache, CacheKey, RecommendationStore},
    error::{AppError, AppResult},
    models::{
        AiMetadata, AiResponse, AnalysisPeriod, CostRequest, DisputeRequest, FairnessAnalysis,
        FairnessRecord, FeatureRequest, FeatureType, FeedbackRequest, GenerationOutcome,
        Recommendation, RecommendationStatus, ScheduleRequest, TimeRange, TriggerSource,
        UsageAnalyticsRequest, UsageLogEntry, UserFeedback,
    },
    services::{
        ai::{prompts, AiGateway},
        events::{self, DomainEvent, EventPublisher},
        fairness, fallback,
        rate_limit::RateLimiter,
        upstream::UpstreamData,
    },
};

/// Caller recorded for system-triggered analyses
pub const SYSTEM_USER: &str = "system";

/// Model name recorded when the rule-based path produced the result
pub const RULE_BASED_MODEL: &str = "rule-based";

/// Tunables of the pipeline that are not owned by a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of most recent history entries sent to the model
    pub history_window: usize,
    pub default_ttl_secs: u64,
    /// TTL for schedule, cost and analytics results
    pub feature_ttl_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_window: 20,
            default_ttl_secs: 3600,
            feature_ttl_secs: 1800,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_window: config.history_window,
            default_ttl_secs: config.cache_default_ttl_secs,
            feature_ttl_secs: config.cache_feature_ttl_secs,
        }
    }

    pub fn cache_ttl(&self, feature: FeatureType) -> u64 {
        match feature {
            FeatureType::Schedule | FeatureType::Cost | FeatureType::Analytics => {
                self.feature_ttl_secs
            }
            FeatureType::Dispute | FeatureType::Fairness => self.default_ttl_secs,
        }
    }
}

fn endpoint(feature: FeatureType) -> &'static str {
    match feature {
        FeatureType::Schedule => "generate_schedule",
        FeatureType::Cost => "generate_cost_analysis",
        FeatureType::Dispute => "generate_dispute_analysis",
        FeatureType::Analytics => "generate_usage_analytics",
        FeatureType::Fairness => "analyze_fairness",
    }
}

/// Result of one pipeline run, as recorded in telemetry
struct Usage<'a> {
    user_id: &'a str,
    group_id: &'a str,
    feature: FeatureType,
    cache_hit: bool,
    error: Option<String>,
}

/// Coordinates the AI recommendation use cases
pub struct Orchestrator {
    gateway: AiGateway,
    cache: Cache,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn RecommendationStore>,
    publisher: Arc<dyn EventPublisher>,
    upstream: Arc<dyn UpstreamData>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        gateway: AiGateway,
        cache: Cache,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn RecommendationStore>,
        publisher: Arc<dyn EventPublisher>,
        upstream: Arc<dyn UpstreamData>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            gateway,
            cache,
            limiter,
            store,
            publisher,
            upstream,
            settings,
        }
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id))]
    pub async fn generate_schedule(
        &self,
        request: &ScheduleRequest,
        user_id: &str,
        trigger: TriggerSource,
    ) -> AppResult<GenerationOutcome> {
        self.generate(request, user_id, trigger).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id))]
    pub async fn generate_cost_analysis(
        &self,
        request: &CostRequest,
        user_id: &str,
        trigger: TriggerSource,
    ) -> AppResult<GenerationOutcome> {
        self.generate(request, user_id, trigger).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id))]
    pub async fn generate_dispute_analysis(
        &self,
        request: &DisputeRequest,
        user_id: &str,
        trigger: TriggerSource,
    ) -> AppResult<GenerationOutcome> {
        self.generate(request, user_id, trigger).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id))]
    pub async fn generate_usage_analytics(
        &self,
        request: &UsageAnalyticsRequest,
        user_id: &str,
        trigger: TriggerSource,
    ) -> AppResult<GenerationOutcome> {
        self.generate(request, user_id, trigger).await
    }

    /// Runs one feature request through the pipeline
    pub async fn generate<R: FeatureRequest>(
        &self,
        request: &R,
        user_id: &str,
        trigger: TriggerSource,
    ) -> AppResult<GenerationOutcome> {
        let start = Instant::now();
        let feature = request.feature_type();
        let group_id = request.group_id();

        if let Err(e) = self.limiter.admit(user_id, feature).await {
            tracing::warn!(feature = %feature, user_id = %user_id, error = %e, "Request rejected");
            self.record_usage(
                Usage {
                    user_id,
                    group_id,
                    feature,
                    cache_hit: false,
                    error: Some(e.to_string()),
                },
                start,
            )
            .await;
            return Err(e);
        }

        let key = CacheKey::recommendation(feature, group_id);
        match self.cache.get::<Recommendation>(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %key, "Cache hit");
                self.record_usage(
                    Usage {
                        user_id,
                        group_id,
                        feature,
                        cache_hit: true,
                        error: None,
                    },
                    start,
                )
                .await;
                return Ok(GenerationOutcome::Cached(cached));
            }
            Ok(None) => tracing::debug!(key = %key, "Cache miss"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss"),
        }

        let context = request.prompt_context(self.settings.history_window);
        let reply = match self
            .gateway
            .call(prompts::template(feature), &context, feature)
            .await
        {
            Ok(reply) => reply,
            Err(exhausted) => {
                let result = fallback::generate(
                    request.fallback_input(),
                    &exhausted.to_string(),
                    Utc::now(),
                );
                tracing::warn!(
                    feature = %feature,
                    group_id = %group_id,
                    model = %self.gateway.model(),
                    attempts = exhausted.attempts,
                    "Serving rule-based fallback"
                );
                self.record_usage(
                    Usage {
                        user_id,
                        group_id,
                        feature,
                        cache_hit: false,
                        error: Some(exhausted.last_error),
                    },
                    start,
                )
                .await;
                return Ok(GenerationOutcome::Fallback(result));
            }
        };

        let (reply_attempts, reply_latency_ms) = (reply.attempts, reply.latency_ms);
        let now = Utc::now();
        let recommendation = Recommendation {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            feature_type: feature,
            input_summary: request.input_summary(),
            ai_response: reply.response,
            confidence_score: reply.confidence,
            status: RecommendationStatus::Active,
            trigger_source: trigger,
            user_feedback: None,
            model: reply.model,
            processing_time_ms: start.elapsed().as_millis() as u64,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.create_recommendation(&recommendation).await {
            tracing::error!(feature = %feature, group_id = %group_id, error = %e, "Failed to persist recommendation");
            self.record_usage(
                Usage {
                    user_id,
                    group_id,
                    feature,
                    cache_hit: false,
                    error: Some(e.to_string()),
                },
                start,
            )
            .await;
            return Err(e);
        }

        if let Err(e) = self
            .cache
            .set(&key, &recommendation, self.settings.cache_ttl(feature))
            .await
        {
            tracing::warn!(key = %key, error = %e, "Failed to cache recommendation");
        }

        let event = DomainEvent::new(
            events::RECOMMENDATION_GENERATED,
            group_id,
            json!({
                "recommendationId": recommendation.id,
                "featureType": feature,
                "userId": user_id,
                "confidenceScore": recommendation.confidence_score,
            }),
        );
        let _ = self.publisher.publish(&event).await;

        self.record_usage(
            Usage {
                user_id,
                group_id,
                feature,
                cache_hit: false,
                error: None,
            },
            start,
        )
        .await;

        tracing::info!(
            feature = %feature,
            group_id = %group_id,
            recommendation_id = %recommendation.id,
            confidence = recommendation.confidence_score,
            attempts = reply_attempts,
            ai_latency_ms = reply_latency_ms,
            elapsed_ms = recommendation.processing_time_ms,
            "Recommendation generated"
        );

        Ok(GenerationOutcome::Generated(recommendation))
    }

    /// Computes fairness metrics from freshly fetched data and asks the model
    /// to explain them.
    ///
    /// The metrics are always deterministic; only the insights and
    /// recommendations come from the model (or the rule-based fallback).
    /// Custom ranges bypass the cache since the key does not carry the bounds.
    #[instrument(skip(self))]
    pub async fn analyze_fairness(
        &self,
        group_id: &str,
        time_range: TimeRange,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<FairnessAnalysis> {
        let started = Instant::now();
        let feature = FeatureType::Fairness;
        let period = AnalysisPeriod::resolve(time_range, start, end, Utc::now());
        let key = (period.range != TimeRange::Custom).then(|| CacheKey::fairness(group_id, period.range));

        if let Some(key) = &key {
            match self.cache.get::<FairnessRecord>(key).await {
                Ok(Some(record)) => {
                    tracing::debug!(key = %key, "Cache hit");
                    self.record_usage(
                        Usage {
                            user_id: SYSTEM_USER,
                            group_id,
                            feature,
                            cache_hit: true,
                            error: None,
                        },
                        started,
                    )
                    .await;
                    return Ok(FairnessAnalysis {
                        record,
                        is_fallback: false,
                        cached: true,
                    });
                }
                Ok(None) => tracing::debug!(key = %key, "Cache miss"),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss")
                }
            }
        }

        let (members, bookings) = tokio::join!(
            self.upstream.fetch_group(group_id),
            self.upstream.fetch_bookings(group_id, period.start, period.end),
        );
        let members = members.unwrap_or_else(|e| {
            tracing::warn!(group_id = %group_id, error = %e, "Group fetch failed, using no members");
            Vec::new()
        });
        let bookings = bookings.unwrap_or_else(|e| {
            tracing::warn!(group_id = %group_id, error = %e, "Booking fetch failed, using no bookings");
            Vec::new()
        });

        let result = fairness::analyze(&bookings, &members);
        let conflicts = fairness::detect_conflicts(&bookings);

        let context = json!({
            "groupId": group_id,
            "period": period,
            "metrics": result,
            "conflictCount": conflicts.len(),
        });

        let (insights, ai_metadata, failure) = match self
            .gateway
            .call(prompts::template(feature), &context, feature)
            .await
        {
            Ok(reply) => {
                let insights = match reply.response {
                    AiResponse::Fairness(insights) => insights,
                    other => {
                        tracing::warn!(
                            returned = %other.feature_type(),
                            "Unexpected response type for fairness, using rule-based insights"
                        );
                        fallback::fairness_insights(&result)
                    }
                };
                let metadata = AiMetadata {
                    model: reply.model,
                    confidence_score: reply.confidence,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                };
                (insights, metadata, None)
            }
            Err(exhausted) => {
                tracing::warn!(
                    group_id = %group_id,
                    attempts = exhausted.attempts,
                    "Serving rule-based fairness insights"
                );
                let metadata = AiMetadata {
                    model: RULE_BASED_MODEL.to_string(),
                    confidence_score: fallback::FALLBACK_CONFIDENCE,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                };
                (fallback::fairness_insights(&result), metadata, Some(exhausted.last_error))
            }
        };

        let record = FairnessRecord {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            vehicle_id: None,
            period,
            recommendations: insights.recommendation_lines(),
            insights: insights.insight_lines(),
            result,
            conflicts,
            ai_metadata,
            created_at: Utc::now(),
        };

        if let Some(error) = failure {
            self.record_usage(
                Usage {
                    user_id: SYSTEM_USER,
                    group_id,
                    feature,
                    cache_hit: false,
                    error: Some(error),
                },
                started,
            )
            .await;
            return Ok(FairnessAnalysis {
                record,
                is_fallback: true,
                cached: false,
            });
        }

        self.store.create_fairness_record(&record).await?;

        if let Some(key) = &key {
            if let Err(e) = self
                .cache
                .set(key, &record, self.settings.cache_ttl(feature))
                .await
            {
                tracing::warn!(key = %key, error = %e, "Failed to cache fairness analysis");
            }
        }

        let event = DomainEvent::new(
            events::FAIRNESS_ANALYZED,
            group_id,
            json!({
                "analysisId": record.id,
                "overallFairnessScore": record.result.overall_fairness_score,
                "fairnessLevel": record.result.fairness_level,
                "timeRange": record.period.range,
            }),
        );
        let _ = self.publisher.publish(&event).await;

        self.record_usage(
            Usage {
                user_id: SYSTEM_USER,
                group_id,
                feature,
                cache_hit: false,
                error: None,
            },
            started,
        )
        .await;

        tracing::info!(
            group_id = %group_id,
            overall_score = record.result.overall_fairness_score,
            members = record.result.members.len(),
            conflicts = record.conflicts.len(),
            "Fairness analysis completed"
        );

        Ok(FairnessAnalysis {
            record,
            is_fallback: false,
            cached: false,
        })
    }

    /// Applies a member's feedback, closing an active recommendation
    #[instrument(skip(self, feedback))]
    pub async fn record_feedback(
        &self,
        recommendation_id: Uuid,
        user_id: &str,
        feedback: FeedbackRequest,
    ) -> AppResult<Recommendation> {
        if let Some(rating) = feedback.rating {
            if !(1..=5).contains(&rating) {
                return Err(AppError::InvalidInput(format!(
                    "Rating must be between 1 and 5, got {}",
                    rating
                )));
            }
        }

        let mut recommendation = self
            .store
            .find_recommendation(recommendation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Recommendation {} not found", recommendation_id))
            })?;

        let invalid = |status: RecommendationStatus| {
            AppError::InvalidTransition(format!(
                "Recommendation {} is already {}",
                recommendation_id,
                status.as_str()
            ))
        };

        let next = recommendation
            .status
            .apply_feedback(feedback.accepted)
            .ok_or_else(|| invalid(recommendation.status))?;

        let now = Utc::now();
        let user_feedback = UserFeedback {
            user_id: user_id.to_string(),
            rating: feedback.rating,
            comment: feedback.comment,
            accepted: feedback.accepted,
            submitted_at: now,
        };

        let updated = self
            .store
            .update_feedback(recommendation_id, next, &user_feedback, now)
            .await?;
        if !updated {
            return Err(invalid(recommendation.status));
        }

        recommendation.status = next;
        recommendation.user_feedback = Some(user_feedback);
        recommendation.updated_at = now;

        let key = CacheKey::recommendation(recommendation.feature_type, &recommendation.group_id);
        if let Err(e) = self.cache.remove(&key).await {
            tracing::warn!(key = %key, error = %e, "Failed to invalidate cached recommendation");
        }

        let event = DomainEvent::new(
            events::RECOMMENDATION_FEEDBACK,
            &recommendation.group_id,
            json!({
                "recommendationId": recommendation.id,
                "featureType": recommendation.feature_type,
                "userId": user_id,
                "status": next.as_str(),
                "rating": recommendation.user_feedback.as_ref().and_then(|f| f.rating),
            }),
        );
        let _ = self.publisher.publish(&event).await;

        tracing::info!(
            recommendation_id = %recommendation_id,
            status = next.as_str(),
            "Feedback recorded"
        );

        Ok(recommendation)
    }

    async fn record_usage(&self, usage: Usage<'_>, started: Instant) {
        let entry = UsageLogEntry {
            user_id: usage.user_id.to_string(),
            group_id: usage.group_id.to_string(),
            feature_type: usage.feature,
            endpoint: endpoint(usage.feature).to_string(),
            response_time_ms: started.elapsed().as_millis() as u64,
            cache_hit: usage.cache_hit,
            success: usage.error.is_none(),
            error_message: usage.error,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_usage_log(&entry).await {
            tracing::warn!(feature = %usage.feature, error = %e, "Failed to record usage");
        }
    }
}
