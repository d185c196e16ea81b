use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use fairshare_advisor::{
    api::{create_router, AppState},
    db::{Cache, InMemoryStore, MemoryCacheStore},
    error::AppResult,
    models::{BookingSample, OwnershipShare},
    services::{
        ai::{AiGateway, RetryPolicy},
        events::NoopPublisher,
        providers::{AiProvider, GenerationConfig, ProviderError, ProviderReply},
        rate_limit::SlidingWindowLimiter,
        upstream::UpstreamData,
        Orchestrator, PipelineSettings,
    },
};

const SCHEDULE_REPLY: &str = r#"{"recommended_schedule": [{"user_id": "a", "hours": 12}],
    "fairness_metrics": {"overall_score": 0.9}, "conflicts": [], "suggestions": ["Alternate weekends"]}"#;

/// Replies with a fixed text, or fails every call when none is set
struct ScriptedProvider {
    reply: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn replying(text: &'static str) -> Self {
        Self {
            reply: Some(text),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl AiProvider for ScriptedProvider {
    async fn complete(
        &self,
        _model: &str,
        _prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some(text) => Ok(ProviderReply {
                text: text.to_string(),
            }),
            None => Err(ProviderError::Status {
                status: 503,
                body: "overloaded".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct StaticUpstream {
    members: Vec<OwnershipShare>,
    bookings: Vec<BookingSample>,
}

#[async_trait::async_trait]
impl UpstreamData for StaticUpstream {
    async fn fetch_group(&self, _group_id: &str) -> AppResult<Vec<OwnershipShare>> {
        Ok(self.members.clone())
    }

    async fn fetch_bookings(
        &self,
        _group_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> AppResult<Vec<BookingSample>> {
        Ok(self.bookings.clone())
    }
}

fn share(user_id: &str, percentage: f64) -> OwnershipShare {
    OwnershipShare {
        user_id: user_id.to_string(),
        ownership_percentage: percentage,
    }
}

fn recent_booking(user_id: &str, days_ago: i64, hours: i64) -> BookingSample {
    let start = Utc::now() - chrono::Duration::days(days_ago);
    BookingSample {
        user_id: user_id.to_string(),
        start_time: start,
        end_time: start + chrono::Duration::hours(hours),
    }
}

fn create_test_server(provider: Arc<ScriptedProvider>) -> TestServer {
    let gateway = AiGateway::new(
        provider,
        "test-model".to_string(),
        GenerationConfig::default(),
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::ZERO,
        },
    );
    let upstream = StaticUpstream {
        members: vec![share("a", 60.0), share("b", 40.0)],
        bookings: vec![recent_booking("a", 3, 6), recent_booking("b", 2, 4)],
    };
    let orchestrator = Orchestrator::new(
        gateway,
        Cache::new(Arc::new(MemoryCacheStore::new()), 3600),
        Arc::new(SlidingWindowLimiter::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(NoopPublisher),
        Arc::new(upstream),
        PipelineSettings::default(),
    );

    TestServer::new(create_router(AppState::new(orchestrator))).unwrap()
}

fn user(id: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_static(id),
    )
}

fn schedule_body(group_id: &str) -> Value {
    json!({
        "groupId": group_id,
        "members": [
            {"userId": "a", "ownershipPercentage": 60},
            {"userId": "b", "ownershipPercentage": 40}
        ]
    })
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(Arc::new(ScriptedProvider::failing()));
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(Arc::new(ScriptedProvider::failing()));
    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("trace-123"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "trace-123");
}

#[tokio::test]
async fn test_generate_schedule_then_serve_from_cache() {
    let provider = Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY));
    let server = create_test_server(provider.clone());
    let (name, value) = user("a");

    let response = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name.clone(), value.clone())
        .json(&schedule_body("g1"))
        .await;
    response.assert_status_ok();
    let first: Value = response.json();
    assert_eq!(first["source"], "generated");
    assert_eq!(first["status"], "active");
    assert_eq!(first["model"], "test-model");
    assert_eq!(first["userId"], "a");

    let response = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name, value)
        .json(&schedule_body("g1"))
        .await;
    response.assert_status_ok();
    let second: Value = response.json();
    assert_eq!(second["source"], "cached");
    assert_eq!(second["id"], first["id"]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_provider_failure_serves_fallback() {
    let provider = Arc::new(ScriptedProvider::failing());
    let server = create_test_server(provider.clone());
    let (name, value) = user("a");

    let response = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name, value)
        .json(&schedule_body("g1"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "fallback");
    assert_eq!(body["isFallback"], true);
    assert_eq!(body["confidenceScore"], 0.5);
    // One retry after the first attempt
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_returns_429_with_retry_after() {
    let server = create_test_server(Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY)));
    let (name, value) = user("a");

    // Schedule admits 10 per minute
    for _ in 0..10 {
        server
            .post("/api/v1/recommendations/schedule")
            .add_header(name.clone(), value.clone())
            .json(&schedule_body("g1"))
            .await
            .assert_status_ok();
    }

    let response = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name, value)
        .json(&schedule_body("g1"))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .header(header::RETRY_AFTER)
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another member still has budget
    let (name, value) = user("b");
    server
        .post("/api/v1/recommendations/schedule")
        .add_header(name, value)
        .json(&schedule_body("g1"))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_missing_user_header_is_rejected() {
    let server = create_test_server(Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY)));

    let response = server
        .post("/api/v1/recommendations/schedule")
        .json(&schedule_body("g1"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_empty_group_is_rejected() {
    let server = create_test_server(Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY)));
    let (name, value) = user("a");

    server
        .post("/api/v1/recommendations/schedule")
        .add_header(name, value)
        .json(&schedule_body(" "))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feedback_closes_recommendation_once() {
    let server = create_test_server(Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY)));
    let (name, value) = user("a");

    let created: Value = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name.clone(), value.clone())
        .json(&schedule_body("g1"))
        .await
        .json();
    let id = created["id"].as_str().unwrap().to_string();
    let path = format!("/api/v1/recommendations/{}/feedback", id);

    let response = server
        .post(&path)
        .add_header(name.clone(), value.clone())
        .json(&json!({"accepted": true, "rating": 5, "comment": "works for us"}))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["status"], "accepted");
    assert_eq!(updated["userFeedback"]["rating"], 5);
    assert_eq!(updated["userFeedback"]["userId"], "a");

    server
        .post(&path)
        .add_header(name, value)
        .json(&json!({"accepted": false}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_feedback_validation() {
    let server = create_test_server(Arc::new(ScriptedProvider::replying(SCHEDULE_REPLY)));
    let (name, value) = user("a");

    let unknown = format!("/api/v1/recommendations/{}/feedback", uuid::Uuid::new_v4());
    server
        .post(&unknown)
        .add_header(name.clone(), value.clone())
        .json(&json!({"accepted": true}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let created: Value = server
        .post("/api/v1/recommendations/schedule")
        .add_header(name.clone(), value.clone())
        .json(&schedule_body("g1"))
        .await
        .json();
    let path = format!(
        "/api/v1/recommendations/{}/feedback",
        created["id"].as_str().unwrap()
    );
    server
        .post(&path)
        .add_header(name, value)
        .json(&json!({"accepted": true, "rating": 9}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fairness_analysis_without_provider() {
    let server = create_test_server(Arc::new(ScriptedProvider::failing()));

    let response = server
        .post("/api/v1/fairness/analyze")
        .json(&json!({"groupId": "g1", "timeRange": "week"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["isFallback"], true);
    assert_eq!(body["cached"], false);
    assert_eq!(body["groupId"], "g1");
    assert_eq!(body["period"]["range"], "week");
    assert_eq!(body["members"].as_array().unwrap().len(), 2);
    assert_eq!(body["totalBookings"], 2);
    assert_eq!(body["aiMetadata"]["model"], "rule-based");
    assert!(!body["insights"].as_array().unwrap().is_empty());
}
