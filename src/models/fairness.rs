use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Deviation (in percentage points) beyond which a member is flagged as over- or under-using
pub const USAGE_DEVIATION_THRESHOLD: f64 = 15.0;

/// A member's contractual share of a co-owned vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipShare {
    pub user_id: String,
    /// Share in percent, 0..=100
    pub ownership_percentage: f64,
}

/// A single booking of the shared vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingSample {
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BookingSample {
    /// Booking length in hours; inverted intervals count as zero
    pub fn duration_hours(&self) -> f64 {
        let millis = (self.end_time - self.start_time).num_milliseconds().max(0);
        millis as f64 / 3_600_000.0
    }
}

/// Raw usage figures for one member over the analysis period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatistics {
    pub user_id: String,
    pub ownership_percentage: f64,
    pub total_booking_hours: f64,
    /// Distinct calendar days (UTC) touched by the member's bookings
    pub total_booking_days: u32,
    pub booking_count: u32,
    pub actual_usage_percentage: f64,
    /// actual_usage_percentage - ownership_percentage; positive means overuse
    pub usage_deviation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Overuse,
    Fair,
    Underuse,
}

impl UsageStatus {
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > USAGE_DEVIATION_THRESHOLD {
            UsageStatus::Overuse
        } else if deviation < -USAGE_DEVIATION_THRESHOLD {
            UsageStatus::Underuse
        } else {
            UsageStatus::Fair
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FairnessLevel {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
    Poor,
}

impl FairnessLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            FairnessLevel::Excellent
        } else if score >= 75.0 {
            FairnessLevel::Good
        } else if score >= 60.0 {
            FairnessLevel::Fair
        } else if score >= 40.0 {
            FairnessLevel::NeedsImprovement
        } else {
            FairnessLevel::Poor
        }
    }
}

/// Per-member fairness verdict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FairnessScore {
    #[serde(flatten)]
    pub stats: UsageStatistics,
    pub fairness_score: f64,
    pub status: UsageStatus,
    pub recommended_hours: f64,
}

/// Group-level fairness summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupFairnessResult {
    pub members: Vec<FairnessScore>,
    pub overall_fairness_score: f64,
    pub fairness_level: FairnessLevel,
    pub total_hours: f64,
    pub total_bookings: u32,
}

/// Two bookings by different members that overlap in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingConflict {
    pub first_user_id: String,
    pub second_user_id: String,
    pub overlap_start: DateTime<Utc>,
    pub overlap_end: DateTime<Utc>,
    pub overlap_hours: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Week,
    Month,
    Quarter,
    Year,
    Custom,
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Quarter => "quarter",
            TimeRange::Year => "year",
            TimeRange::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

/// Concrete window a fairness analysis covers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub range: TimeRange,
}

impl AnalysisPeriod {
    /// Resolves a named range into absolute bounds ending at `now`.
    ///
    /// A custom range needs both bounds in the right order; anything else
    /// falls back to the last month.
    pub fn resolve(
        range: TimeRange,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let days = match range {
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Quarter => 90,
            TimeRange::Year => 365,
            TimeRange::Custom => match (start, end) {
                (Some(start), Some(end)) if start <= end => {
                    return Self { start, end, range };
                }
                _ => {
                    tracing::warn!("Custom range without valid bounds, using last month");
                    return Self {
                        start: now - Duration::days(30),
                        end: now,
                        range: TimeRange::Month,
                    };
                }
            },
        };

        Self {
            start: now - Duration::days(days),
            end: now,
            range,
        }
    }
}

/// Provenance of the AI half of a fairness analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiMetadata {
    pub model: String,
    pub confidence_score: f64,
    pub processing_time_ms: u64,
}

/// Persisted result of a fairness analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FairnessRecord {
    pub id: Uuid,
    pub group_id: String,
    pub vehicle_id: Option<String>,
    pub period: AnalysisPeriod,
    #[serde(flatten)]
    pub result: GroupFairnessResult,
    pub conflicts: Vec<BookingConflict>,
    pub recommendations: Vec<String>,
    pub insights: Vec<String>,
    pub ai_metadata: AiMetadata,
    pub created_at: DateTime<Utc>,
}

/// What `analyze_fairness` hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FairnessAnalysis {
    #[serde(flatten)]
    pub record: FairnessRecord,
    pub is_fallback: bool,
    pub cached: bool,
}
