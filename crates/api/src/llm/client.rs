//! reqwest-backed [`GenerativeModel`] implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerativeModel, ModelCompletion, ModelError};

/// Max tokens requested per completion; the orchestrator and scheduler
/// only ever need a bounded JSON document back, never a long-form reply.
const MAX_RESPONSE_TOKENS: u32 = 8192;
/// Anthropic API version header, pinned per the Messages API contract.
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

/// Talks to the Anthropic Messages API.
pub struct HttpGenerativeModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpGenerativeModel {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a sane default TLS config");

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl GenerativeModel for HttpGenerativeModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_payload: &str,
    ) -> Result<ModelCompletion, ModelError> {
        let started = Instant::now();

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_RESPONSE_TOKENS,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: user_payload,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Unavailable("request timed out".to_string())
                } else {
                    ModelError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(ModelError::InsufficientCredit);
        }
        if !status.is_success() {
            return Err(ModelError::Unavailable(format!(
                "gateway returned status {status}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidOutput(format!("response body: {e}")))?;

        let raw_text = parsed
            .content
            .into_iter()
            .find_map(|b| b.text)
            .ok_or_else(|| ModelError::InvalidOutput("no text content block".to_string()))?;

        Ok(ModelCompletion {
            raw_text,
            latency_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: parsed.usage.as_ref().and_then(|u| u.input_tokens),
            completion_tokens: parsed.usage.as_ref().and_then(|u| u.output_tokens),
        })
    }
}
