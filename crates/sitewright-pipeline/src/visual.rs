//! Dynamic (rendered) validation of the generated page.
//!
//! Renders the page in a fixed mobile viewport, captures a screenshot, and
//! asks a vision-capable reviewer for a PASS/FAIL-with-specifics verdict.
//! A FAIL is repairable and feeds back into regeneration; any exception
//! during rendering/capture is ERROR, terminal for the cycle; an unreachable
//! preview server is SKIPPED.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sitewright_types::{CriticVerdict, QaStatus, Result, SitewrightError};

use sitewright_llm::{Message, ModelGateway, Request};

pub const MOBILE_VIEWPORT: (u32, u32) = (390, 844);

#[derive(Debug, Clone)]
pub struct QaReport {
    pub status: QaStatus,
    pub report: String,
}

// ---------------------------------------------------------------------------
// PageRenderer
// ---------------------------------------------------------------------------

/// Rendering seam: probe the preview server and capture a screenshot.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn probe(&self) -> bool;
    async fn capture(&self, url: &str) -> Result<Vec<u8>>;
}

/// Subprocess-based renderer shelling out to a headless Chromium binary.
pub struct HeadlessChromeRenderer {
    preview_url: String,
    browser: String,
    viewport: (u32, u32),
    timeout: Duration,
}

impl HeadlessChromeRenderer {
    pub fn new(preview_url: impl Into<String>) -> Self {
        Self {
            preview_url: preview_url.into(),
            browser: "chromium".to_string(),
            viewport: MOBILE_VIEWPORT,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn screenshot_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("sitewright-qa-{}.png", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl PageRenderer for HeadlessChromeRenderer {
    async fn probe(&self) -> bool {
        let client = reqwest::Client::new();
        client
            .get(&self.preview_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    async fn capture(&self, url: &str) -> Result<Vec<u8>> {
        let shot = self.screenshot_path();
        let (width, height) = self.viewport;

        let mut cmd = tokio::process::Command::new(&self.browser);
        cmd.arg("--headless=new")
            .arg("--disable-gpu")
            .arg(format!("--window-size={width},{height}"))
            .arg(format!("--screenshot={}", shot.display()))
            .arg(url)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let status = match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(SitewrightError::CommandTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !status.success() {
            let _ = std::fs::remove_file(&shot);
            return Err(SitewrightError::RenderError(format!(
                "browser exited with {status}"
            )));
        }

        let bytes = std::fs::read(&shot)
            .map_err(|e| SitewrightError::RenderError(format!("screenshot unreadable: {e}")))?;
        let _ = std::fs::remove_file(&shot);
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// VisualInspector
// ---------------------------------------------------------------------------

/// Seam between the engineering cycle and visual QA, so the cycle can be
/// tested with scripted reviewers.
#[async_trait]
pub trait VisualReviewer: Send + Sync {
    async fn inspect(&self, page_url: &str) -> QaReport;
}

pub struct VisualInspector {
    renderer: Arc<dyn PageRenderer>,
    gateway: Arc<ModelGateway>,
    model: String,
    prompt: String,
}

impl VisualInspector {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        gateway: Arc<ModelGateway>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            gateway,
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl VisualReviewer for VisualInspector {
    async fn inspect(&self, page_url: &str) -> QaReport {
        if !self.renderer.probe().await {
            tracing::warn!(url = %page_url, "Preview server unreachable, skipping visual QA");
            return QaReport {
                status: QaStatus::Skipped,
                report: "Visual QA skipped: preview server unreachable.".to_string(),
            };
        }

        let screenshot = match self.renderer.capture(page_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(url = %page_url, error = %e, "Screenshot capture failed");
                return QaReport {
                    status: QaStatus::Error,
                    report: format!("Visual QA error: {e}"),
                };
            }
        };

        let request = Request::new(
            &self.model,
            vec![Message::user_with_image(
                &self.prompt,
                screenshot,
                "image/png",
            )],
        )
        .with_max_tokens(1024);

        let review = match self.gateway.complete(&request).await {
            Ok(resp) => resp.text,
            Err(e) => {
                tracing::error!(error = %e, "Vision review call failed");
                return QaReport {
                    status: QaStatus::Error,
                    report: format!("Visual QA error: {e}"),
                };
            }
        };

        match CriticVerdict::from_review(&review) {
            CriticVerdict::Fail(report) => QaReport {
                status: QaStatus::Fail,
                report,
            },
            CriticVerdict::Pass => QaReport {
                status: QaStatus::Pass,
                report: review,
            },
            CriticVerdict::Ambiguous => {
                tracing::warn!("Ambiguous visual verdict, treating as pass");
                QaReport {
                    status: QaStatus::Pass,
                    report: review,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sitewright_llm::{FinishReason, ProviderAdapter, Response, Usage};

    struct StubRenderer {
        reachable: bool,
        capture_result: std::result::Result<Vec<u8>, String>,
    }

    #[async_trait]
    impl PageRenderer for StubRenderer {
        async fn probe(&self) -> bool {
            self.reachable
        }

        async fn capture(&self, _url: &str) -> Result<Vec<u8>> {
            match &self.capture_result {
                Ok(bytes) => Ok(bytes.clone()),
                Err(msg) => Err(SitewrightError::RenderError(msg.clone())),
            }
        }
    }

    struct FixedProvider {
        text: String,
    }

    #[async_trait]
    impl ProviderAdapter for FixedProvider {
        async fn complete(
            &self,
            _request: &Request,
        ) -> std::result::Result<Response, SitewrightError> {
            Ok(Response {
                id: "qa".into(),
                text: self.text.clone(),
                usage: Usage::default(),
                model: "vision-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn default_model(&self) -> &str {
            "vision-model"
        }
        fn supports_vision(&self) -> bool {
            true
        }
    }

    fn inspector(renderer: StubRenderer, verdict_text: &str) -> VisualInspector {
        let mut gateway = ModelGateway::new();
        gateway.register_provider(FixedProvider {
            text: verdict_text.into(),
        });
        VisualInspector::new(
            Arc::new(renderer),
            Arc::new(gateway),
            "vision-model",
            "Review this UI.",
        )
    }

    #[tokio::test]
    async fn unreachable_preview_is_skipped() {
        let inspector = inspector(
            StubRenderer {
                reachable: false,
                capture_result: Ok(vec![]),
            },
            "PASS",
        );
        let qa = inspector.inspect("http://localhost:3000/clients/acme").await;
        assert_eq!(qa.status, QaStatus::Skipped);
        assert!(qa.report.contains("unreachable"));
    }

    #[tokio::test]
    async fn capture_failure_is_error_not_fail() {
        let inspector = inspector(
            StubRenderer {
                reachable: true,
                capture_result: Err("browser crashed".into()),
            },
            "PASS",
        );
        let qa = inspector.inspect("http://localhost:3000/clients/acme").await;
        assert_eq!(qa.status, QaStatus::Error);
        assert!(qa.report.contains("browser crashed"));
    }

    #[tokio::test]
    async fn pass_verdict_passes() {
        let inspector = inspector(
            StubRenderer {
                reachable: true,
                capture_result: Ok(vec![1, 2, 3]),
            },
            "PASS — spacing and contrast look good",
        );
        let qa = inspector.inspect("http://localhost:3000/clients/acme").await;
        assert_eq!(qa.status, QaStatus::Pass);
    }

    #[tokio::test]
    async fn fail_verdict_carries_specifics() {
        let inspector = inspector(
            StubRenderer {
                reachable: true,
                capture_result: Ok(vec![1, 2, 3]),
            },
            "FAIL: hero text overlaps the nav; CTA is cut off at 390px",
        );
        let qa = inspector.inspect("http://localhost:3000/clients/acme").await;
        assert_eq!(qa.status, QaStatus::Fail);
        assert!(qa.report.contains("CTA is cut off"));
    }

    #[tokio::test]
    async fn ambiguous_verdict_treated_as_pass() {
        let inspector = inspector(
            StubRenderer {
                reachable: true,
                capture_result: Ok(vec![1]),
            },
            "The page renders reasonably.",
        );
        let qa = inspector.inspect("http://localhost:3000/clients/acme").await;
        assert_eq!(qa.status, QaStatus::Pass);
    }
}
