//! Sequences one client job end to end while holding the per-client lock:
//! Router → Architect (with the Designer forked alongside) → Copywriter →
//! Builder → finalize.

use std::sync::Arc;

use sitewright_llm::ModelGateway;
use sitewright_store::{artifact, ClientWorkspace, LearningStore, LockManager};
use sitewright_types::{ClientId, Result, SitewrightError, Theme};

use crate::builder::{BuildLimits, BuildReport, Builder};
use crate::config::PipelineConfig;
use crate::notify::{LogNotifier, Notifier};
use crate::stages::{Architect, Copywriter, Designer, Prompts, Router};
use crate::syntax::{CodeValidator, SyntaxChecker};
use crate::visual::{HeadlessChromeRenderer, VisualInspector, VisualReviewer};

pub struct Orchestrator {
    config: PipelineConfig,
    gateway: Arc<ModelGateway>,
    locks: LockManager,
    memory: LearningStore,
    prompts: Arc<Prompts>,
    notifier: Arc<dyn Notifier>,
    validator: Arc<dyn CodeValidator>,
    reviewer: Arc<dyn VisualReviewer>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, gateway: Arc<ModelGateway>) -> Self {
        let locks = LockManager::new(&config.locks_dir, config.lock_ttl);
        let memory = LearningStore::new(&config.memory_dir);
        let prompts = Arc::new(Prompts::default());

        let renderer = Arc::new(
            HeadlessChromeRenderer::new(&config.preview_url).with_timeout(config.render_timeout),
        );
        let reviewer = Arc::new(VisualInspector::new(
            renderer,
            Arc::clone(&gateway),
            config.model_vision.clone(),
            prompts.visual_qa.clone(),
        ));
        let validator = Arc::new(
            SyntaxChecker::new(config.project_root.clone()).with_timeout(config.syntax_timeout),
        );

        Self {
            config,
            gateway,
            locks,
            memory,
            prompts,
            notifier: Arc::new(LogNotifier),
            validator,
            reviewer,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn CodeValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn VisualReviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn memory(&self) -> &LearningStore {
        &self.memory
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one client. Lock contention is a normal
    /// skip, not a crash; the lock guard releases on every exit path.
    pub async fn process_client(&self, id: &ClientId) -> Result<BuildReport> {
        let _guard = self.locks.acquire(id)?;
        tracing::info!(client = %id, "Processing client");

        let ws = ClientWorkspace::new(&self.config.clients_root, id.clone());
        let intake = ws.read_intake()?;

        let router = Router::new(
            Arc::clone(&self.gateway),
            self.config.model_strategy.clone(),
            self.prompts.router.clone(),
        );
        let persona = router.classify(&intake).await;
        tracing::info!(client = %id, persona = %persona, "Routed intake");

        // The one deliberate fork: the designer proceeds while the
        // architect's critic loop runs on this task.
        let designer = Designer::new(
            Arc::clone(&self.gateway),
            self.config.model_strategy.clone(),
            &self.prompts,
            self.config.critic_max_attempts,
        );
        let mut designer_task = tokio::spawn(designer.run(intake.clone()));

        let architect = Architect::new(
            Arc::clone(&self.gateway),
            self.config.model_strategy.clone(),
            &self.prompts,
            self.config.critic_max_attempts,
        );
        let brief = architect.run(&ws, &intake, persona).await?;

        let theme =
            match tokio::time::timeout(self.config.designer_timeout, &mut designer_task).await {
                Ok(Ok(theme)) => theme,
                Ok(Err(e)) => {
                    tracing::warn!(client = %id, error = %e, "Designer task failed, using default theme");
                    Theme::default()
                }
                Err(_) => {
                    // The soft timeout is enforceable: cancel the task
                    // instead of blocking on it.
                    designer_task.abort();
                    tracing::warn!(client = %id, "Designer timed out, using default theme");
                    Theme::default()
                }
            };
        ws.write_theme(&theme)?;

        let copywriter = Copywriter::new(
            Arc::clone(&self.gateway),
            self.config.model_copy.clone(),
            &self.prompts,
            self.config.critic_max_attempts,
        );
        let content = copywriter.run(&ws, &brief).await?;

        let builder = Builder::new(
            Arc::clone(&self.gateway),
            self.memory.clone(),
            Arc::clone(&self.validator),
            Arc::clone(&self.reviewer),
        )
        .with_limits(BuildLimits {
            max_syntax_retries: self.config.max_syntax_retries,
            max_visual_retries: self.config.max_visual_retries,
            repeat_threshold: self.config.repeat_threshold,
        })
        .with_model(self.config.model_coder.clone())
        .with_manifest_path(self.config.manifest_path.clone())
        .with_system_prompt(self.prompts.builder.clone())
        .with_heartbeat_interval(self.config.heartbeat_interval);

        let page_path = ws.page_path(&self.config.pages_root);
        let page_url = format!(
            "{}/clients/{}",
            self.config.preview_url.trim_end_matches('/'),
            id
        );
        let report = builder
            .run(&ws, &brief, &content, Some(&theme), &page_path, &page_url)
            .await?;

        // Finalize: best-effort notification, then the marker rename — the
        // rename is last so a crash mid-run leaves the job retryable.
        self.notifier
            .build_completed(id, report.status, &report.qa_report)
            .await;
        ws.mark_processed()?;

        tracing::info!(client = %id, status = %report.status, "Client finalized");
        Ok(report)
    }

    /// Process every pending client once. Per-client failures are logged and
    /// the client stays pending for the next pass; the loop never crashes.
    pub async fn run_pass(&self) -> usize {
        let pending = match artifact::pending_clients(&self.config.clients_root) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan clients root");
                return 0;
            }
        };

        if pending.is_empty() {
            tracing::info!("No pending clients");
            return 0;
        }

        let mut processed = 0;
        for id in pending {
            match self.process_client(&id).await {
                Ok(report) => {
                    processed += 1;
                    tracing::info!(client = %id, status = %report.status, "Client processed");
                }
                Err(SitewrightError::LockContention { .. }) => {
                    tracing::info!(client = %id, "Locked by another run, skipping this pass");
                }
                Err(e) => {
                    tracing::error!(
                        client = %id,
                        error = %e,
                        "Pipeline failed; client stays pending for the next pass"
                    );
                }
            }
        }
        processed
    }
}
