//! OpenAI similarity-judge implementation.
//!
//! Uses `async-openai` for API calls, `moka` for response caching, and
//! `backoff` for exponential-backoff retry on rate limits / transient errors.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use md5::{Digest, Md5};
use moka::future::Cache;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{JudgeError, Result, SyncError};

use super::{SimilarityJudge, SimilarityVerdict};

const SYSTEM_PROMPT: &str = "You compare two descriptions of entities from a role-play \
world and decide whether they denote the same entity. Respond with a similarity score \
between 0.0 and 1.0, whether they are the same entity, and a one-sentence reasoning.";

// ── Cache configuration ───────────────────────────────────────────────────────

/// Configuration for the in-process verdict cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    pub max_capacity: u64,
    /// How long each entry lives before eviction.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Duration::from_secs(3_600), // 1 hour
        }
    }
}

// ── Judge struct ──────────────────────────────────────────────────────────────

/// OpenAI judge implementing [`SimilarityJudge`].
pub struct OpenAiJudge {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    /// Keyed by `md5(model + text_a + text_b)` → serialised verdict JSON.
    cache: Cache<String, String>,
}

impl OpenAiJudge {
    /// Create a new judge.
    ///
    /// # Arguments
    /// * `api_key` – OpenAI secret key.
    /// * `model`   – Model name (e.g. `"gpt-4o-mini"`).
    /// * `cache_config` – Cache capacity and TTL.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        let config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
        let client = async_openai::Client::with_config(config);

        let cache = Cache::builder()
            .max_capacity(cache_config.max_capacity)
            .time_to_live(cache_config.ttl)
            .build();

        Self {
            client,
            model: model.into(),
            temperature: 0.0,
            cache,
        }
    }

    /// Override the sampling temperature (default `0.0`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Compute an MD5 cache key from model + both compared texts.
    fn cache_key(&self, text_a: &str, text_b: &str) -> String {
        let mut h = Md5::new();
        h.update(self.model.as_bytes());
        h.update([0u8]);
        h.update(text_a.as_bytes());
        h.update([0u8]);
        h.update(text_b.as_bytes());
        format!("{:x}", h.finalize())
    }

    /// Call the chat completions endpoint with exponential-backoff retry.
    ///
    /// Retries on [`JudgeError::RateLimit`] (HTTP 429) and transient 5xx errors.
    async fn call_with_retry(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .build();

        backoff::future::retry(backoff, || async {
            let outcome: std::result::Result<serde_json::Value, async_openai::error::OpenAIError> =
                self.client.chat().create_byot(request.clone()).await;

            match outcome {
                Ok(response) => Ok(response),
                Err(e) => {
                    let judge_err = map_openai_error(e);
                    match &judge_err {
                        JudgeError::RateLimit => {
                            warn!("judge rate limit hit — retrying with backoff");
                            Err(backoff::Error::transient(judge_err))
                        }
                        JudgeError::Api { status, .. } if *status >= 500 => {
                            warn!("judge transient server error ({}) — retrying", status);
                            Err(backoff::Error::transient(judge_err))
                        }
                        _ => Err(backoff::Error::permanent(judge_err)),
                    }
                }
            }
        })
        .await
        .map_err(SyncError::Judge)
    }

    /// Extract the assistant message text from a chat-completions response.
    ///
    /// A non-null `refusal` field means the model declined to answer, which
    /// maps to [`JudgeError::Refusal`] rather than an empty response.
    fn extract_content(response: &serde_json::Value) -> Result<String> {
        let message = &response["choices"][0]["message"];

        if message["refusal"].as_str().is_some_and(|r| !r.is_empty()) {
            return Err(SyncError::Judge(JudgeError::Refusal));
        }

        message["content"]
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or(SyncError::Judge(JudgeError::EmptyResponse))
    }
}

// ── SimilarityJudge implementation ────────────────────────────────────────────

impl SimilarityJudge for OpenAiJudge {
    async fn similarity_check(&self, text_a: &str, text_b: &str) -> Result<SimilarityVerdict> {
        let key = self.cache_key(text_a, text_b);

        if let Some(cached) = self.cache.get(&key).await {
            debug!("judge cache hit");
            return serde_json::from_str(&cached).map_err(SyncError::Serialization);
        }

        // Constrain the model output to the verdict schema.
        let schema = schemars::schema_for!(SimilarityVerdict);
        let schema_value = serde_json::to_value(&schema)?;

        let request = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Entity A:\n{text_a}\n\nEntity B:\n{text_b}"),
                },
            ],
            "temperature": self.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "similarity_verdict",
                    "schema": schema_value,
                    "strict": true,
                }
            }
        });

        let response = self.call_with_retry(request).await?;
        let content = Self::extract_content(&response)?;

        let verdict: SimilarityVerdict =
            serde_json::from_str(&content).map_err(SyncError::Serialization)?;

        self.cache.insert(key, content).await;

        Ok(verdict)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Map an [`async_openai::error::OpenAIError`] to our [`JudgeError`] domain type.
fn map_openai_error(err: async_openai::error::OpenAIError) -> JudgeError {
    use async_openai::error::OpenAIError;

    match err {
        OpenAIError::ApiError(api_err) => {
            let status = api_err.status.unwrap_or(0);
            match status {
                401 | 403 => JudgeError::Authentication,
                429 => JudgeError::RateLimit,
                other => JudgeError::Api {
                    status: other,
                    message: api_err.message,
                },
            }
        }
        other => JudgeError::Api {
            status: 0,
            message: other.to_string(),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
