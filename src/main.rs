use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fairshare_advisor::{
    api::{create_router, AppState},
    config::{Config, RateLimitBackend},
    db::{create_pool, create_redis_client, Cache, PostgresStore, RedisCacheStore},
    services::{
        ai::{AiGateway, RetryPolicy},
        events::{spawn_invalidation_listener, RedisEventBus},
        providers::{GeminiProvider, GenerationConfig},
        rate_limit::{RateLimiter, RedisRateLimiter, SlidingWindowLimiter},
        upstream::HttpUpstream,
        Orchestrator, PipelineSettings,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairshare_advisor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connected and migrations applied");
    let store = Arc::new(PostgresStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let cache_store = RedisCacheStore::new(redis_client.clone()).await?;
    let cache = Cache::new(Arc::new(cache_store), config.cache_staleness_secs);

    let limiter: Arc<dyn RateLimiter> = match config.rate_limit_backend {
        RateLimitBackend::Memory => {
            tracing::warn!("Using process-local rate limiting");
            Arc::new(SlidingWindowLimiter::new())
        }
        RateLimitBackend::Redis => Arc::new(RedisRateLimiter::new(redis_client.clone()).await?),
    };

    let publisher = Arc::new(
        RedisEventBus::new(
            redis_client.clone(),
            config.event_publish_attempts,
            Duration::from_millis(config.event_retry_delay_ms),
        )
        .await?,
    );

    let provider = GeminiProvider::new(
        config.ai_api_key.clone(),
        config.ai_api_url.clone(),
        Duration::from_secs(config.ai_timeout_secs),
    )?;
    let gateway = AiGateway::new(
        Arc::new(provider),
        config.ai_model.clone(),
        GenerationConfig {
            temperature: config.ai_temperature,
            max_output_tokens: config.ai_max_output_tokens,
        },
        RetryPolicy {
            max_retries: config.ai_max_retries,
            base_delay: Duration::from_millis(config.ai_base_delay_ms),
        },
    );

    let upstream = Arc::new(HttpUpstream::new(
        config.group_service_url.clone(),
        config.booking_service_url.clone(),
    ));

    let listener_task = spawn_invalidation_listener(redis_client, cache.clone());

    let orchestrator = Orchestrator::new(
        gateway,
        cache,
        limiter,
        store,
        publisher,
        upstream,
        PipelineSettings::from_config(&config),
    );
    let app = create_router(AppState::new(orchestrator));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid host or port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, model = %config.ai_model, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    listener_task.abort();
    let _ = listener_task.await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
