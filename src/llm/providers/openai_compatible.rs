use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;

use crate::errors::OracleError;
use crate::llm::parse::parse_decision;
use crate::llm::prompt::{system_prompt, user_prompt};
use crate::llm::provider::DecisionOracle;
use crate::llm::types::{ChatMessage, ContentPart, Decision, ImageUrl, OracleContext};
use crate::perception::types::Frame;

/// Vision model behind any OpenAI-style `/chat/completions` endpoint
/// (OpenAI, Gemini's compatibility layer, OpenRouter, local servers).
pub struct OpenAiCompatibleOracle {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OpenAiCompatibleOracle {
    pub fn new(
        id: String,
        api_base: String,
        api_key: String,
        model: String,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            id,
            api_base,
            api_key,
            model,
            temperature,
            client,
        }
    }

    pub fn request_body(&self, task: &str, frame: &Frame, ctx: &OracleContext<'_>) -> serde_json::Value {
        let image = base64::engine::general_purpose::STANDARD.encode(&frame.bytes);
        let messages = vec![
            ChatMessage::system(system_prompt(&ctx.grid.description)),
            ChatMessage::user_parts(vec![
                ContentPart::Text {
                    text: user_prompt(task, ctx),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{image}"),
                    },
                },
            ]),
        ];
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
        })
    }
}

/// Copy of `body` with base64 image payloads replaced, for logging.
fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.pointer_mut("/image_url/url") {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

/// Map a non-success HTTP reply to the oracle error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> OracleError {
    let summary = format!("{status}: {}", body.chars().take(300).collect::<String>());
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("rate limit")
        || lowered.contains("resource_exhausted")
        || lowered.contains("quota")
    {
        OracleError::RateLimited(summary)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        OracleError::Unavailable(summary)
    } else {
        OracleError::Request(summary)
    }
}

#[async_trait]
impl DecisionOracle for OpenAiCompatibleOracle {
    fn name(&self) -> &str {
        &self.id
    }

    async fn decide(
        &self,
        task: &str,
        frame: &Frame,
        ctx: &OracleContext<'_>,
    ) -> Result<Decision, OracleError> {
        if self.api_key.is_empty() {
            return Err(OracleError::Unavailable(format!(
                "no API key for provider '{}' (set VIRTUOS_{}_API_KEY)",
                self.id,
                self.id.to_uppercase()
            )));
        }

        let body = self.request_body(task, frame, ctx);
        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            image_bytes = frame.bytes.len(),
            iteration = ctx.iteration,
            "sending oracle request"
        );
        tracing::trace!(body = %sanitize_for_log(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &err_body);
            tracing::warn!(provider = %self.id, error = %err, "oracle call failed");
            return Err(err);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or("");
        tracing::info!(content_len = content.len(), "oracle reply received");

        parse_decision(content)
    }
}
