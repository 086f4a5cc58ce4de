use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sitewright_types::{GenOutcome, SitewrightError};

use crate::{DynProvider, ProviderAdapter, Request, Response, Usage};

// ---------------------------------------------------------------------------
// UsageReporter
// ---------------------------------------------------------------------------

/// Best-effort usage/cost sink. Reporting is a side call that must never
/// fail the primary operation; implementations log their own problems.
pub trait UsageReporter: Send + Sync {
    fn report(&self, model: &str, usage: &Usage);
}

/// Default reporter: structured log line per call.
pub struct LogReporter;

impl UsageReporter for LogReporter {
    fn report(&self, model: &str, usage: &Usage) {
        tracing::info!(
            model = %model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Model usage"
        );
    }
}

// ---------------------------------------------------------------------------
// ModelGateway
// ---------------------------------------------------------------------------

const RATE_LIMIT_ATTEMPTS: usize = 3;

pub struct ModelGateway {
    providers: HashMap<String, DynProvider>,
    reporter: Option<Arc<dyn UsageReporter>>,
    backoff_base: Duration,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            reporter: None,
            backoff_base: Duration::from_millis(500),
        }
    }

    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_reporter(mut self, reporter: impl UsageReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Create from environment variables; at least one provider key must be
    /// present (ANTHROPIC_API_KEY or OPENAI_API_KEY).
    pub fn from_env() -> Result<Self, SitewrightError> {
        let mut gateway = Self::new();
        let mut found_any = false;

        if let Ok(adapter) = crate::AnthropicAdapter::from_env() {
            gateway.register_provider(adapter);
            found_any = true;
        }
        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            gateway.register_provider(adapter);
            found_any = true;
        }

        if !found_any {
            return Err(SitewrightError::Other(
                "No model provider API keys found in environment".to_string(),
            ));
        }
        Ok(gateway)
    }

    /// Complete a request, retrying rate limits with a linearly increasing
    /// sleep (attempt × base, or the provider's retry-after when larger),
    /// capped at 3 attempts. Other errors surface immediately.
    pub async fn complete(&self, request: &Request) -> Result<Response, SitewrightError> {
        let provider = self.resolve_provider(request)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match provider.complete(request).await {
                Ok(resp) => {
                    self.report_usage(&resp);
                    return Ok(resp);
                }
                Err(SitewrightError::RateLimited {
                    provider: name,
                    retry_after_ms,
                }) if attempt < RATE_LIMIT_ATTEMPTS => {
                    let linear = self.backoff_base * attempt as u32;
                    let delay = linear.max(Duration::from_millis(retry_after_ms));
                    tracing::warn!(
                        provider = %name,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Complete and wrap the text payload as a [`GenOutcome`]: whitespace-only
    /// output is the `Empty` state, not an error, so retry loops can branch
    /// on it directly.
    pub async fn generate_text(&self, request: &Request) -> Result<GenOutcome, SitewrightError> {
        let resp = self.complete(request).await?;
        Ok(GenOutcome::from_text(resp.text))
    }

    fn report_usage(&self, resp: &Response) {
        if let Some(reporter) = &self.reporter {
            let reporter = Arc::clone(reporter);
            let model = resp.model.clone();
            let usage = resp.usage.clone();
            // Guarded so a misbehaving reporter can never fail the call.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                reporter.report(&model, &usage);
            }));
            if result.is_err() {
                tracing::warn!("Usage reporter panicked, ignoring");
            }
        }
    }

    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, SitewrightError> {
        // 1. Explicit provider field
        if let Some(ref provider_name) = request.provider {
            return self.providers.get(provider_name).ok_or_else(|| {
                SitewrightError::Other(format!("Provider '{provider_name}' not registered"))
            });
        }

        // 2. Model-name prefix heuristic
        if let Some(name) = provider_for_model(&request.model) {
            if let Some(provider) = self.providers.get(name) {
                return Ok(provider);
            }
        }

        // 3. First registered provider
        if let Some(provider) = self.providers.values().next() {
            return Ok(provider);
        }

        Err(SitewrightError::Other("No providers registered".to_string()))
    }
}

impl Default for ModelGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn provider_for_model(model: &str) -> Option<&'static str> {
    if model.starts_with("claude") {
        Some("anthropic")
    } else if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3") {
        Some("openai")
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
