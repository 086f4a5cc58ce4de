use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::{ContentPart, FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use sitewright_types::SitewrightError;

// ---------------------------------------------------------------------------
// AnthropicAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn from_env() -> Result<Self, SitewrightError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| SitewrightError::AuthError {
            provider: "anthropic".into(),
        })?;
        Ok(Self::new(key))
    }
}

// ---------------------------------------------------------------------------
// Request translation (unified → Anthropic JSON)
// ---------------------------------------------------------------------------

fn build_request_body(request: &Request) -> serde_json::Value {
    // System messages become the top-level system field.
    let system_text: Vec<String> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .flat_map(|m| {
            m.content.iter().filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.clone()),
                _ => None,
            })
        })
        .collect();

    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(convert_message)
        .collect();

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(4096),
        "messages": messages,
    });

    if !system_text.is_empty() {
        body["system"] = json!(system_text.join("\n\n"));
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    body
}

fn convert_message(message: &Message) -> serde_json::Value {
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };
    let content: Vec<serde_json::Value> = message
        .content
        .iter()
        .map(|p| match p {
            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
            ContentPart::Image { data, media_type } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
        })
        .collect();
    json!({ "role": role, "content": content })
}

// ---------------------------------------------------------------------------
// Response translation (Anthropic JSON → unified Response)
// ---------------------------------------------------------------------------

fn parse_response(body: &serde_json::Value) -> Response {
    let id = body["id"].as_str().unwrap_or("").to_string();
    let model = body["model"].as_str().unwrap_or("").to_string();

    let finish_reason = match body["stop_reason"].as_str() {
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("stop_sequence") => FinishReason::StopSequence,
        _ => FinishReason::EndTurn,
    };

    // The text payload is nested in content blocks; missing blocks yield an
    // empty string rather than an error.
    let mut text_parts: Vec<String> = Vec::new();
    if let Some(content) = body["content"].as_array() {
        for block in content {
            if block["type"].as_str() == Some("text") {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
            }
        }
    }

    let usage_obj = &body["usage"];
    let input_tokens = usage_obj["input_tokens"].as_u64().unwrap_or(0);
    let output_tokens = usage_obj["output_tokens"].as_u64().unwrap_or(0);

    Response {
        id,
        text: text_parts.join(""),
        usage: Usage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        },
        model,
        finish_reason,
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> SitewrightError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            SitewrightError::RateLimited {
                provider: "anthropic".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 => SitewrightError::AuthError {
            provider: "anthropic".into(),
        },
        500 | 529 => SitewrightError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => SitewrightError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, SitewrightError> {
        let body = build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SitewrightError::ProviderError {
                provider: "anthropic".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| SitewrightError::ProviderError {
                provider: "anthropic".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| SitewrightError::ProviderError {
                provider: "anthropic".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        Ok(parse_response(&json))
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        "claude-sonnet-4-5-20250929"
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
