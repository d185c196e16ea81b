use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{BookingSample, FeatureType, OwnershipShare};

/// Input to the schedule feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub group_id: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    pub members: Vec<OwnershipShare>,
    #[serde(default)]
    pub booking_history: Vec<BookingSample>,
    #[serde(default)]
    pub preferences: Option<Value>,
}

/// A single historical expense
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostEntry {
    pub amount: f64,
    pub category: String,
    pub incurred_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input to the cost feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostRequest {
    pub group_id: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub expenses: Vec<CostEntry>,
    #[serde(default)]
    pub members: Vec<OwnershipShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisputeMessage {
    pub author_id: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Input to the dispute feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub group_id: String,
    #[serde(default)]
    pub dispute_id: Option<String>,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub parties: Vec<String>,
    #[serde(default)]
    pub history: Vec<DisputeMessage>,
}

/// Input to the usage analytics feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalyticsRequest {
    pub group_id: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub bookings: Vec<BookingSample>,
    #[serde(default)]
    pub members: Vec<OwnershipShare>,
}

/// Borrowed view of a request, as consumed by the fallback generator
#[derive(Debug, Clone, Copy)]
pub enum FallbackInput<'a> {
    Schedule(&'a ScheduleRequest),
    Cost(&'a CostRequest),
    Dispute(&'a DisputeRequest),
    Analytics(&'a UsageAnalyticsRequest),
}

/// A request the orchestrator can run through the AI pipeline
pub trait FeatureRequest: Send + Sync {
    fn feature_type(&self) -> FeatureType;

    fn group_id(&self) -> &str;

    /// Compact description persisted alongside the recommendation
    fn input_summary(&self) -> Value;

    /// Prompt context; history lists keep only the `window` most recent entries
    fn prompt_context(&self, window: usize) -> Value;

    fn fallback_input(&self) -> FallbackInput<'_>;
}

/// Returns the `window` most recent items according to `key`, oldest first
pub fn most_recent<T, K, F>(items: &[T], window: usize, key: F) -> Vec<T>
where
    T: Clone,
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut sorted: Vec<T> = items.to_vec();
    sorted.sort_by_key(&key);
    let skip = sorted.len().saturating_sub(window);
    sorted.into_iter().skip(skip).collect()
}

impl FeatureRequest for ScheduleRequest {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Schedule
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn input_summary(&self) -> Value {
        json!({
            "memberCount": self.members.len(),
            "bookingCount": self.booking_history.len(),
            "hasPreferences": self.preferences.is_some(),
        })
    }

    fn prompt_context(&self, window: usize) -> Value {
        json!({
            "groupId": self.group_id,
            "vehicleId": self.vehicle_id,
            "members": self.members,
            "recentBookings": most_recent(&self.booking_history, window, |b| b.start_time),
            "preferences": self.preferences,
        })
    }

    fn fallback_input(&self) -> FallbackInput<'_> {
        FallbackInput::Schedule(self)
    }
}

impl FeatureRequest for CostRequest {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Cost
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn input_summary(&self) -> Value {
        let total: f64 = self.expenses.iter().map(|e| e.amount).sum();
        json!({
            "expenseCount": self.expenses.len(),
            "totalAmount": total,
        })
    }

    fn prompt_context(&self, window: usize) -> Value {
        json!({
            "groupId": self.group_id,
            "vehicleId": self.vehicle_id,
            "members": self.members,
            "recentExpenses": most_recent(&self.expenses, window, |e| e.incurred_at),
        })
    }

    fn fallback_input(&self) -> FallbackInput<'_> {
        FallbackInput::Cost(self)
    }
}

impl FeatureRequest for DisputeRequest {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Dispute
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn input_summary(&self) -> Value {
        json!({
            "disputeId": self.dispute_id,
            "category": self.category,
            "partyCount": self.parties.len(),
            "messageCount": self.history.len(),
        })
    }

    fn prompt_context(&self, window: usize) -> Value {
        json!({
            "groupId": self.group_id,
            "category": self.category,
            "description": self.description,
            "parties": self.parties,
            "recentMessages": most_recent(&self.history, window, |m| m.sent_at),
        })
    }

    fn fallback_input(&self) -> FallbackInput<'_> {
        FallbackInput::Dispute(self)
    }
}

impl FeatureRequest for UsageAnalyticsRequest {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Analytics
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn input_summary(&self) -> Value {
        json!({
            "memberCount": self.members.len(),
            "bookingCount": self.bookings.len(),
        })
    }

    fn prompt_context(&self, window: usize) -> Value {
        json!({
            "groupId": self.group_id,
            "vehicleId": self.vehicle_id,
            "members": self.members,
            "recentBookings": most_recent(&self.bookings, window, |b| b.start_time),
        })
    }

    fn fallback_input(&self) -> FallbackInput<'_> {
        FallbackInput::Analytics(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn booking(user: &str, day: i64) -> BookingSample {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::days(day);
        BookingSample {
            user_id: user.to_string(),
            start_time: start,
            end_time: start + Duration::hours(2),
        }
    }

    #[test]
    fn test_most_recent_keeps_tail_in_order() {
        let bookings = vec![booking("a", 3), booking("b", 1), booking("c", 2), booking("d", 0)];
        let recent = most_recent(&bookings, 2, |b| b.start_time);
        let users: Vec<&str> = recent.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(users, vec!["c", "a"]);
    }

    #[test]
    fn test_most_recent_with_large_window_keeps_everything() {
        let bookings = vec![booking("a", 1), booking("b", 0)];
        assert_eq!(most_recent(&bookings, 50, |b| b.start_time).len(), 2);
    }

    #[test]
    fn test_schedule_prompt_context_is_bounded() {
        let request = ScheduleRequest {
            group_id: "g1".to_string(),
            vehicle_id: None,
            members: vec![],
            booking_history: (0..30).map(|d| booking("a", d)).collect(),
            preferences: None,
        };

        let context = request.prompt_context(5);
        assert_eq!(context["recentBookings"].as_array().unwrap().len(), 5);
        assert_eq!(request.input_summary()["bookingCount"], 30);
    }

    #[test]
    fn test_cost_summary_totals_amounts() {
        let request = CostRequest {
            group_id: "g1".to_string(),
            vehicle_id: None,
            expenses: vec![
                CostEntry {
                    amount: 40.0,
                    category: "fuel".to_string(),
                    incurred_at: Utc::now(),
                    description: None,
                },
                CostEntry {
                    amount: 60.0,
                    category: "insurance".to_string(),
                    incurred_at: Utc::now(),
                    description: None,
                },
            ],
            members: vec![],
        };

        assert_eq!(request.input_summary()["totalAmount"], 100.0);
        assert_eq!(request.feature_type(), FeatureType::Cost);
    }
}
