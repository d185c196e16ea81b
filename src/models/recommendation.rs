use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use super::AiResponse;

/// Recommendation domain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Schedule,
    Cost,
    Dispute,
    Analytics,
    Fairness,
}

impl FeatureType {
    pub const ALL: [FeatureType; 5] = [
        FeatureType::Schedule,
        FeatureType::Cost,
        FeatureType::Dispute,
        FeatureType::Analytics,
        FeatureType::Fairness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Schedule => "schedule",
            FeatureType::Cost => "cost",
            FeatureType::Dispute => "dispute",
            FeatureType::Analytics => "analytics",
            FeatureType::Fairness => "fairness",
        }
    }

    /// Requests admitted per user per minute; `None` for features without a
    /// calling user (fairness analysis is system-triggered)
    pub fn requests_per_minute(&self) -> Option<u32> {
        match self {
            FeatureType::Schedule => Some(10),
            FeatureType::Cost => Some(15),
            FeatureType::Dispute => Some(20),
            FeatureType::Analytics => Some(10),
            FeatureType::Fairness => None,
        }
    }
}

impl Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureType::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown feature type: {}", s))
    }
}

/// Lifecycle of a persisted recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Active,
    Accepted,
    Rejected,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Active => "active",
            RecommendationStatus::Accepted => "accepted",
            RecommendationStatus::Rejected => "rejected",
        }
    }

    /// Applies a feedback decision. Only `active` can move; both outcomes are terminal.
    pub fn apply_feedback(self, accepted: bool) -> Option<Self> {
        match self {
            RecommendationStatus::Active if accepted => Some(RecommendationStatus::Accepted),
            RecommendationStatus::Active => Some(RecommendationStatus::Rejected),
            RecommendationStatus::Accepted | RecommendationStatus::Rejected => None,
        }
    }
}

impl FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecommendationStatus::Active),
            "accepted" => Ok(RecommendationStatus::Accepted),
            "rejected" => Ok(RecommendationStatus::Rejected),
            other => Err(format!("Unknown recommendation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    UserRequest,
    SystemAuto,
    EventDriven,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::UserRequest => "user_request",
            TriggerSource::SystemAuto => "system_auto",
            TriggerSource::EventDriven => "event_driven",
        }
    }
}

impl FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_request" => Ok(TriggerSource::UserRequest),
            "system_auto" => Ok(TriggerSource::SystemAuto),
            "event_driven" => Ok(TriggerSource::EventDriven),
            other => Err(format!("Unknown trigger source: {}", other)),
        }
    }
}

/// Feedback as submitted by a member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
    pub accepted: bool,
}

/// Feedback as stored on the recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedback {
    pub user_id: String,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub accepted: bool,
    pub submitted_at: DateTime<Utc>,
}

/// A persisted AI-backed recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub group_id: String,
    pub user_id: String,
    pub feature_type: FeatureType,
    pub input_summary: Value,
    pub ai_response: AiResponse,
    pub confidence_score: f64,
    pub status: RecommendationStatus,
    pub trigger_source: TriggerSource,
    pub user_feedback: Option<UserFeedback>,
    pub model: String,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rule-based result returned when the AI provider could not be reached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResult {
    pub group_id: String,
    pub feature_type: FeatureType,
    pub response: AiResponse,
    pub confidence_score: f64,
    pub is_fallback: bool,
    /// Why the AI path was abandoned
    pub reason: String,
    pub generated_at: DateTime<Utc>,
}

/// Outcome of a single `generate` call
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated(Recommendation),
    Cached(Recommendation),
    Fallback(FallbackResult),
}

impl GenerationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, GenerationOutcome::Fallback(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, GenerationOutcome::Cached(_))
    }

    pub fn confidence_score(&self) -> f64 {
        match self {
            GenerationOutcome::Generated(r) | GenerationOutcome::Cached(r) => r.confidence_score,
            GenerationOutcome::Fallback(f) => f.confidence_score,
        }
    }

    pub fn recommendation(&self) -> Option<&Recommendation> {
        match self {
            GenerationOutcome::Generated(r) | GenerationOutcome::Cached(r) => Some(r),
            GenerationOutcome::Fallback(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_type_round_trip_through_str() {
        for feature in FeatureType::ALL {
            assert_eq!(feature.as_str().parse::<FeatureType>().unwrap(), feature);
        }
        assert!("weather".parse::<FeatureType>().is_err());
    }

    #[test]
    fn test_rate_limit_capacities() {
        assert_eq!(FeatureType::Schedule.requests_per_minute(), Some(10));
        assert_eq!(FeatureType::Cost.requests_per_minute(), Some(15));
        assert_eq!(FeatureType::Dispute.requests_per_minute(), Some(20));
        assert_eq!(FeatureType::Analytics.requests_per_minute(), Some(10));
        assert_eq!(FeatureType::Fairness.requests_per_minute(), None);
    }

    #[test]
    fn test_active_transitions() {
        assert_eq!(
            RecommendationStatus::Active.apply_feedback(true),
            Some(RecommendationStatus::Accepted)
        );
        assert_eq!(
            RecommendationStatus::Active.apply_feedback(false),
            Some(RecommendationStatus::Rejected)
        );
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        assert_eq!(RecommendationStatus::Accepted.apply_feedback(false), None);
        assert_eq!(RecommendationStatus::Rejected.apply_feedback(true), None);
    }

    #[test]
    fn test_trigger_source_serialization() {
        let json = serde_json::to_string(&TriggerSource::EventDriven).unwrap();
        assert_eq!(json, "\"event_driven\"");
        assert_eq!(
            "system_auto".parse::<TriggerSource>().unwrap(),
            TriggerSource::SystemAuto
        );
    }
}
