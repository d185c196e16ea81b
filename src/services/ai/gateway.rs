use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{prompts, validator};
use crate::models::{AiResponse, FeatureType};
use crate::services::providers::{AiProvider, GenerationConfig};

/// Exponential backoff between provider attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept before 0-indexed attempt `attempt`: none before the first,
    /// then `base × 2^(attempt − 1)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }
}

/// Validated, scored AI output
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub response: AiResponse,
    pub confidence: f64,
    pub attempts: u32,
    pub model: String,
    pub latency_ms: u64,
}

/// Every attempt failed; the caller is expected to fall back
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("AI provider failed after {attempts} attempts: {last_error}")]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: String,
}

/// Builds prompts, calls the provider with retries and validates the output
#[derive(Clone)]
pub struct AiGateway {
    provider: Arc<dyn AiProvider>,
    provider_name: &'static str,
    model: String,
    generation: GenerationConfig,
    policy: RetryPolicy,
}

impl AiGateway {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        model: String,
        generation: GenerationConfig,
        policy: RetryPolicy,
    ) -> Self {
        let provider_name = provider.name();
        Self {
            provider,
            provider_name,
            model,
            generation,
            policy,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Renders `template` with `context` and asks the provider for a
    /// completion, retrying provider errors with backoff.
    ///
    /// Malformed output is not retried; the validator repairs it.
    pub async fn call(
        &self,
        template: &str,
        context: &Value,
        feature: FeatureType,
    ) -> Result<GatewayResponse, Exhausted> {
        let prompt = prompts::render(template, context);
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                tracing::warn!(
                    feature = %feature,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "AI call failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .provider
                .complete(&self.model, &prompt, &self.generation)
                .await
            {
                Ok(reply) => {
                    let response = validator::validate(&reply.text, feature);
                    let confidence = validator::score_confidence(&response);
                    let latency_ms = start.elapsed().as_millis() as u64;

                    tracing::info!(
                        feature = %feature,
                        provider = self.provider_name,
                        attempts = attempt + 1,
                        confidence,
                        latency_ms,
                        "AI call succeeded"
                    );

                    return Ok(GatewayResponse {
                        response,
                        confidence,
                        attempts: attempt + 1,
                        model: self.model.clone(),
                        latency_ms,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
        }

        tracing::error!(
            feature = %feature,
            provider = self.provider_name,
            attempts = max_attempts,
            error = %last_error,
            "AI provider exhausted"
        );

        Err(Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
