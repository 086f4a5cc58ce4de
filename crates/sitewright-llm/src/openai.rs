use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::{ContentPart, FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use sitewright_types::SitewrightError;

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, SitewrightError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| SitewrightError::AuthError {
            provider: "openai".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let input: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

        let mut body = json!({
            "model": request.model,
            "input": input,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Response {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"].as_str().unwrap_or("").to_string();

        let finish_reason = match body["status"].as_str() {
            Some("incomplete") => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        };

        // The text payload is nested two levels down; any missing field
        // degrades to an empty string instead of raising.
        let mut text_parts: Vec<String> = Vec::new();
        if let Some(output) = body["output"].as_array() {
            for item in output {
                if item["type"].as_str() != Some("message") {
                    continue;
                }
                if let Some(content) = item["content"].as_array() {
                    for block in content {
                        if block["type"] == "output_text" {
                            if let Some(t) = block["text"].as_str() {
                                text_parts.push(t.to_string());
                            }
                        }
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
}

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let content: Vec<serde_json::Value> = msg
        .content
        .iter()
        .map(|p| match p {
            ContentPart::Text { text } => json!({ "type": "input_text", "text": text }),
            ContentPart::Image { data, media_type } => json!({
                "type": "input_image",
                "image_url": format!(
                    "data:{};base64,{}",
                    media_type,
                    base64::engine::general_purpose::STANDARD.encode(data)
                ),
            }),
        })
        .collect();

    json!({ "role": role, "content": content })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> SitewrightError {
    let status_u16 = status.as_u16();
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());

    match status_u16 {
        429 => SitewrightError::RateLimited {
            provider: "openai".into(),
            retry_after_ms: 1000,
        },
        401 => SitewrightError::AuthError {
            provider: "openai".into(),
        },
        500..=599 => SitewrightError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message,
            retryable: true,
        },
        _ => SitewrightError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message,
            retryable: false,
        },
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, SitewrightError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SitewrightError::ProviderError {
                provider: "openai".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| SitewrightError::ProviderError {
                provider: "openai".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| SitewrightError::ProviderError {
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        Ok(self.parse_response(json))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
