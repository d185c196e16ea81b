/// Group and booking data owned by other services
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{BookingSample, OwnershipShare},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UpstreamData: Send + Sync {
    /// Ownership shares of the group's members
    async fn fetch_group(&self, group_id: &str) -> AppResult<Vec<OwnershipShare>>;

    /// Bookings of the group that start inside `[start, end]`
    async fn fetch_bookings(
        &self,
        group_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookingSample>>;
}

#[derive(Debug, Deserialize)]
struct GroupResponse {
    #[serde(default)]
    members: Vec<OwnershipShare>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BookingsResponse {
    Wrapped { bookings: Vec<BookingSample> },
    Bare(Vec<BookingSample>),
}

impl From<BookingsResponse> for Vec<BookingSample> {
    fn from(response: BookingsResponse) -> Self {
        match response {
            BookingsResponse::Wrapped { bookings } => bookings,
            BookingsResponse::Bare(bookings) => bookings,
        }
    }
}

/// REST client for the group and booking services
#[derive(Clone)]
pub struct HttpUpstream {
    http_client: HttpClient,
    group_service_url: String,
    booking_service_url: String,
}

impl HttpUpstream {
    pub fn new(group_service_url: String, booking_service_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            group_service_url,
            booking_service_url,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> AppResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ExternalApi(format!(
            "Upstream returned status {}: {}",
            status, body
        )))
    }
}

#[async_trait::async_trait]
impl UpstreamData for HttpUpstream {
    async fn fetch_group(&self, group_id: &str) -> AppResult<Vec<OwnershipShare>> {
        let url = format!("{}/api/v1/groups/{}", self.group_service_url, group_id);
        let response = self.http_client.get(&url).send().await?;
        let group: GroupResponse = Self::ensure_success(response).await?.json().await?;

        tracing::debug!(group_id = %group_id, members = group.members.len(), "Group fetched");
        Ok(group.members)
    }

    async fn fetch_bookings(
        &self,
        group_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookingSample>> {
        let url = format!("{}/api/v1/bookings", self.booking_service_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("groupId", group_id.to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
            ])
            .send()
            .await?;
        let bookings: BookingsResponse = Self::ensure_success(response).await?.json().await?;
        let bookings: Vec<BookingSample> = bookings.into();

        tracing::debug!(group_id = %group_id, bookings = bookings.len(), "Bookings fetched");
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookings_response_accepts_both_shapes() {
        let wrapped = r#"{"bookings": [{"userId": "a", "startTime": "2024-01-01T08:00:00Z", "endTime": "2024-01-01T10:00:00Z"}]}"#;
        let bare = r#"[{"userId": "a", "startTime": "2024-01-01T08:00:00Z", "endTime": "2024-01-01T10:00:00Z"}]"#;

        let wrapped: Vec<BookingSample> = serde_json::from_str::<BookingsResponse>(wrapped)
            .unwrap()
            .into();
        let bare: Vec<BookingSample> = serde_json::from_str::<BookingsResponse>(bare).unwrap().into();

        assert_eq!(wrapped, bare);
        assert_eq!(wrapped[0].duration_hours(), 2.0);
    }

    #[test]
    fn test_group_response_members() {
        let raw = r#"{"id": "g1", "members": [{"userId": "a", "ownershipPercentage": 60}, {"userId": "b", "ownershipPercentage": 40}]}"#;
        let group: GroupResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.members[1].ownership_percentage, 40.0);
    }
}
