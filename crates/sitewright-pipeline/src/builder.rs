//! The builder's engineering cycle.
//!
//! Per attempt: GENERATE → EXTRACT_CODE → SYNTAX_CHECK → SAVE → VISUAL_QA,
//! feeding syntax and visual failures back as targeted repair instructions.
//! Early-exit heuristics cap cost on failure patterns that do not converge
//! with more retries. Every failure is appended to the learning store before
//! the next attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sitewright_llm::{Message, ModelGateway, Request};
use sitewright_store::{artifact, ClientWorkspace, LearningStore};
use sitewright_types::{FailureCategory, FailureRecord, GenOutcome, QaStatus, Result, Theme};

use crate::classify::{FailureClassifier, HeuristicClassifier, RepetitionTracker};
use crate::extract::CodeExtractor;
use crate::syntax::CodeValidator;
use crate::visual::VisualReviewer;

const GENERATION_MAX_TOKENS: u32 = 16_000;

#[derive(Debug, Clone)]
pub struct BuildLimits {
    pub max_syntax_retries: usize,
    pub max_visual_retries: usize,
    pub repeat_threshold: usize,
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            max_syntax_retries: 2,
            max_visual_retries: 2,
            repeat_threshold: 3,
        }
    }
}

impl BuildLimits {
    /// Total attempt budget for one cycle.
    pub fn budget(&self) -> usize {
        self.max_syntax_retries + self.max_visual_retries
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub status: QaStatus,
    pub attempts: usize,
    pub saved: bool,
    pub qa_report: String,
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// Background progress signal during long cycles, so operators can tell
/// "working" from "hung". Aborted on every exit path via drop.
struct Heartbeat {
    handle: tokio::task::JoinHandle<()>,
}

impl Heartbeat {
    fn spawn(client: String, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut beats = 0u64;
            loop {
                tokio::time::sleep(interval).await;
                beats += 1;
                tracing::info!(client = %client, beats, "Engineering cycle still running");
            }
        });
        Self { handle }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct Builder {
    gateway: Arc<ModelGateway>,
    memory: LearningStore,
    validator: Arc<dyn CodeValidator>,
    reviewer: Arc<dyn VisualReviewer>,
    classifier: Box<dyn FailureClassifier>,
    extractor: CodeExtractor,
    limits: BuildLimits,
    manifest_path: PathBuf,
    model: String,
    system_prompt: String,
    heartbeat_interval: Duration,
    rules_top_n: usize,
}

impl Builder {
    pub fn new(
        gateway: Arc<ModelGateway>,
        memory: LearningStore,
        validator: Arc<dyn CodeValidator>,
        reviewer: Arc<dyn VisualReviewer>,
    ) -> Self {
        Self {
            gateway,
            memory,
            validator,
            reviewer,
            classifier: Box::new(HeuristicClassifier),
            extractor: CodeExtractor::for_page_code(),
            limits: BuildLimits::default(),
            manifest_path: PathBuf::from("design-system/manifest.md"),
            model: "claude-sonnet-4-5-20250929".to_string(),
            system_prompt:
                "You are a React engineer. Produce the complete page.tsx for a Next.js landing \
                 page, selecting components only from the manifest and mapping the content into \
                 their props. Output only the code."
                    .to_string(),
            heartbeat_interval: Duration::from_secs(15),
            rules_top_n: 5,
        }
    }

    pub fn with_limits(mut self, limits: BuildLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Run the engineering cycle for one client page.
    pub async fn run(
        &self,
        ws: &ClientWorkspace,
        brief: &str,
        content: &str,
        theme: Option<&Theme>,
        page_path: &Path,
        page_url: &str,
    ) -> Result<BuildReport> {
        let budget = self.limits.budget();
        let client = ws.id().clone();
        let _heartbeat = Heartbeat::spawn(client.to_string(), self.heartbeat_interval);

        let mut tracker = RepetitionTracker::new(self.limits.repeat_threshold);
        let mut syntax_feedback: Option<String> = None;
        let mut visual_feedback: Option<String> = None;
        let mut status = QaStatus::Fail;
        let mut qa_report_text = String::new();
        let mut attempts = 0;
        let mut saved = false;

        while attempts < budget {
            attempts += 1;
            tracing::info!(client = %client, attempt = attempts, budget, "Generating page code");

            // GENERATE
            let request = self.build_request(
                brief,
                content,
                theme,
                syntax_feedback.as_deref(),
                visual_feedback.as_deref(),
            );
            let raw = match self.gateway.generate_text(&request).await? {
                GenOutcome::Text(text) => text,
                GenOutcome::Empty => {
                    tracing::warn!(client = %client, attempt = attempts, "Empty generation");
                    self.record(
                        &client,
                        attempts,
                        FailureCategory::Builder,
                        "model returned empty output",
                        "regenerate",
                    );
                    continue;
                }
            };

            // EXTRACT_CODE
            let extracted = self.extractor.extract(&raw);
            tracing::debug!(strategy = extracted.strategy, "Extracted candidate code");

            // SYNTAX_CHECK
            let report = self.validator.check(&extracted.code).await;
            if !report.passed {
                let issue = report.feedback();
                self.record(
                    &client,
                    attempts,
                    FailureCategory::Syntax,
                    &issue,
                    "regenerate with compiler feedback",
                );

                let category = self.classifier.classify(&issue);
                let tripped = tracker.record(&category);
                if tripped {
                    tracing::warn!(
                        client = %client,
                        attempt = attempts,
                        "Same failure category repeated, aborting cycle early"
                    );
                    status = QaStatus::Skipped;
                    break;
                }
                if category.is_module_resolution() && attempts >= 2 {
                    tracing::warn!(
                        client = %client,
                        attempt = attempts,
                        "Module-resolution failure persists, aborting cycle early"
                    );
                    status = QaStatus::Skipped;
                    break;
                }

                syntax_feedback = Some(issue);
                continue;
            }
            tracker.reset();
            syntax_feedback = None;

            // SAVE — only after the candidate passes the static gate.
            artifact::atomic_write(page_path, &extracted.code)?;
            saved = true;

            // VISUAL_QA
            let qa = self.reviewer.inspect(page_url).await;
            ws.write_qa_report(&qa.report)?;
            qa_report_text = qa.report.clone();

            match qa.status {
                QaStatus::Pass => {
                    status = QaStatus::Pass;
                    break;
                }
                QaStatus::Error | QaStatus::Skipped => {
                    tracing::warn!(
                        client = %client,
                        status = %qa.status,
                        "Visual QA did not complete, finishing cycle with warning"
                    );
                    status = qa.status;
                    break;
                }
                QaStatus::Fail => {
                    self.record(
                        &client,
                        attempts,
                        FailureCategory::Visual,
                        &qa.report,
                        "regenerate with QA feedback",
                    );
                    visual_feedback = Some(qa.report);
                }
            }
        }

        if attempts > 1 {
            // Digest rewrite happens at most once per multi-attempt cycle,
            // never per individual failure.
            self.memory.save_rules(self.rules_top_n);
        }

        tracing::info!(client = %client, attempts, status = %status, "Engineering cycle finished");
        Ok(BuildReport {
            status,
            attempts,
            saved,
            qa_report: qa_report_text,
        })
    }

    fn build_request(
        &self,
        brief: &str,
        content: &str,
        theme: Option<&Theme>,
        syntax_feedback: Option<&str>,
        visual_feedback: Option<&str>,
    ) -> Request {
        let mut system = vec![self.system_prompt.clone()];

        let rules = self.memory.prompt_injection();
        if !rules.is_empty() {
            system.push(rules);
        }
        let golden = self.memory.golden_prompt();
        if !golden.is_empty() {
            system.push(golden);
        }

        let manifest = artifact::read_or_default(&self.manifest_path, "");
        if manifest.trim().is_empty() {
            tracing::warn!(
                path = %self.manifest_path.display(),
                "Component manifest not found, the model will generate raw code"
            );
        } else {
            system.push(format!(
                "## COMPONENT MANIFEST (allowed building blocks)\n\n{manifest}"
            ));
        }

        if let Some(theme) = theme {
            if let Ok(json) = serde_json::to_string_pretty(theme) {
                system.push(format!("## THEME\n\n```json\n{json}\n```"));
            }
        }

        let mut user = format!("Brief:\n{brief}\n\nContent:\n{content}");
        if let Some(fb) = syntax_feedback {
            user.push_str(&format!(
                "\n\nThe previous attempt failed type checking. Fix these errors:\n{fb}"
            ));
        }
        if let Some(fb) = visual_feedback {
            user.push_str(&format!(
                "\n\nThe previous attempt failed visual QA. Address this report:\n{fb}"
            ));
        }

        Request::new(
            &self.model,
            vec![Message::system(system.join("\n\n")), Message::user(user)],
        )
        .with_max_tokens(GENERATION_MAX_TOKENS)
    }

    fn record(
        &self,
        client: &sitewright_types::ClientId,
        attempt: usize,
        category: FailureCategory,
        issue: &str,
        fix: &str,
    ) {
        self.memory.record_failure(
            FailureRecord::new(category, issue, fix)
                .with_meta("client_id", serde_json::json!(client.as_str()))
                .with_meta("attempt", serde_json::json!(attempt)),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxReport;
    use crate::visual::QaReport;
    use async_trait::async_trait;
    use sitewright_llm::{FinishReason, ProviderAdapter, Response, Usage};
    use sitewright_types::{ClientId, SitewrightError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        async fn complete(
            &self,
            request: &Request,
        ) -> std::result::Result<Response, SitewrightError> {
            self.requests.lock().unwrap().push(request.clone());
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "```tsx\nexport default function Page() {}\n```".into());
            Ok(Response {
                id: "scripted".into(),
                text,
                usage: Usage::default(),
                model: "scripted".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn default_model(&self) -> &str {
            "scripted"
        }
        fn supports_vision(&self) -> bool {
            true
        }
    }

    struct ScriptedValidator {
        reports: Mutex<VecDeque<SyntaxReport>>,
        calls: Mutex<usize>,
    }

    impl ScriptedValidator {
        fn new(reports: Vec<SyntaxReport>) -> Self {
            Self {
                reports: Mutex::new(reports.into_iter().collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn pass() -> SyntaxReport {
            SyntaxReport {
                passed: true,
                errors: vec![],
                timed_out: false,
            }
        }

        fn fail(error: &str) -> SyntaxReport {
            SyntaxReport {
                passed: false,
                errors: vec![error.to_string()],
                timed_out: false,
            }
        }
    }

    #[async_trait]
    impl CodeValidator for ScriptedValidator {
        async fn check(&self, _code: &str) -> SyntaxReport {
            *self.calls.lock().unwrap() += 1;
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(ScriptedValidator::pass)
        }
    }

    struct ScriptedReviewer {
        reports: Mutex<VecDeque<QaReport>>,
        calls: Mutex<usize>,
    }

    impl ScriptedReviewer {
        fn new(reports: Vec<QaReport>) -> Self {
            Self {
                reports: Mutex::new(reports.into_iter().collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn pass() -> QaReport {
            QaReport {
                status: QaStatus::Pass,
                report: "PASS".into(),
            }
        }
    }

    #[async_trait]
    impl VisualReviewer for ScriptedReviewer {
        async fn inspect(&self, _page_url: &str) -> QaReport {
            *self.calls.lock().unwrap() += 1;
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(ScriptedReviewer::pass)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ws: ClientWorkspace,
        memory: LearningStore,
        page_path: PathBuf,
        provider: Arc<ScriptedProvider>,
        validator: Arc<ScriptedValidator>,
        reviewer: Arc<ScriptedReviewer>,
    }

    fn fixture(
        responses: Vec<&str>,
        syntax: Vec<SyntaxReport>,
        visual: Vec<QaReport>,
    ) -> (Builder, Fixture) {
        let dir = tempfile::tempdir().unwrap();
        let ws = ClientWorkspace::new(dir.path(), ClientId::parse("acme").unwrap());
        std::fs::create_dir_all(ws.dir()).unwrap();
        let memory = LearningStore::new(dir.path().join("memory"));
        let page_path = dir.path().join("pages").join("acme").join("page.tsx");

        let provider = Arc::new(ScriptedProvider::new(responses));
        let validator = Arc::new(ScriptedValidator::new(syntax));
        let reviewer = Arc::new(ScriptedReviewer::new(visual));

        struct SharedProvider(Arc<ScriptedProvider>);
        #[async_trait]
        impl ProviderAdapter for SharedProvider {
            async fn complete(
                &self,
                request: &Request,
            ) -> std::result::Result<Response, SitewrightError> {
                self.0.complete(request).await
            }
            fn name(&self) -> &str {
                "mock"
            }
            fn default_model(&self) -> &str {
                "scripted"
            }
            fn supports_vision(&self) -> bool {
                true
            }
        }

        let mut gateway = ModelGateway::new();
        gateway.register_provider(SharedProvider(provider.clone()));

        let builder = Builder::new(
            Arc::new(gateway),
            memory.clone(),
            validator.clone(),
            reviewer.clone(),
        )
        .with_manifest_path(dir.path().join("manifest.md"))
        .with_heartbeat_interval(Duration::from_secs(3600));

        (
            builder,
            Fixture {
                _dir: dir,
                ws,
                memory,
                page_path,
                provider,
                validator,
                reviewer,
            },
        )
    }

    async fn run(builder: &Builder, fx: &Fixture) -> BuildReport {
        builder
            .run(
                &fx.ws,
                "the brief",
                "the content",
                None,
                &fx.page_path,
                "http://localhost:3000/clients/acme",
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn clean_pass_on_first_attempt() {
        let (builder, fx) = fixture(
            vec!["```tsx\nexport default function Page() { return null; }\n```"],
            vec![ScriptedValidator::pass()],
            vec![ScriptedReviewer::pass()],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Pass);
        assert_eq!(report.attempts, 1);
        assert!(report.saved);

        // Fence was stripped before saving.
        let saved = std::fs::read_to_string(&fx.page_path).unwrap();
        assert_eq!(saved, "export default function Page() { return null; }");
        // QA report persisted.
        assert!(fx.ws.qa_report_path().exists());
        // Clean run records no failures.
        assert!(fx.memory.load_log().is_empty());
    }

    #[tokio::test]
    async fn syntax_fail_then_pass_records_one_failure() {
        let (builder, fx) = fixture(
            vec![
                "```tsx\nbroken code\n```",
                "```tsx\nexport default function Page() {}\n```",
            ],
            vec![
                ScriptedValidator::fail("candidate.tsx(1,1): error TS2304: Cannot find name 'broken'."),
                ScriptedValidator::pass(),
            ],
            vec![ScriptedReviewer::pass()],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Pass);
        assert_eq!(report.attempts, 2);

        // A candidate with a syntax error never reaches visual QA.
        assert_eq!(fx.reviewer.calls(), 1);
        assert_eq!(fx.validator.calls(), 2);

        // Exactly one syntax failure was learned.
        let log = fx.memory.load_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, FailureCategory::Syntax);
        assert_eq!(log[0].metadata.get("attempt"), Some(&serde_json::json!(1)));

        // Only the passing candidate was saved.
        let saved = std::fs::read_to_string(&fx.page_path).unwrap();
        assert_eq!(saved, "export default function Page() {}");

        // The repair generation saw the compiler feedback.
        let requests = fx.provider.requests.lock().unwrap();
        let second_user = match &requests[1].messages[1].content[0] {
            sitewright_llm::ContentPart::Text { text } => text.clone(),
            _ => panic!("expected text"),
        };
        assert!(second_user.contains("TS2304"));
    }

    #[tokio::test]
    async fn repeated_category_triggers_early_exit() {
        let same = "candidate.tsx(1,1): error TS2304: Cannot find name 'Hero'.";
        let (builder, fx) = fixture(
            vec!["```tsx\na\n```", "```tsx\nb\n```", "```tsx\nc\n```"],
            vec![
                ScriptedValidator::fail(same),
                ScriptedValidator::fail(same),
                ScriptedValidator::fail(same),
            ],
            vec![],
        );

        let report = run(&builder, &fx).await;
        // Tripped at 3 consecutive, before the budget of 4 was exhausted.
        assert_eq!(report.status, QaStatus::Skipped);
        assert_eq!(report.attempts, 3);
        assert!(!report.saved);
        assert_eq!(fx.reviewer.calls(), 0);
        assert_eq!(fx.memory.load_log().len(), 3);
    }

    #[tokio::test]
    async fn module_resolution_on_second_attempt_exits_early() {
        let (builder, fx) = fixture(
            vec!["```tsx\na\n```", "```tsx\nb\n```"],
            vec![
                ScriptedValidator::fail("candidate.tsx(1,1): error TS2304: Cannot find name 'x'."),
                ScriptedValidator::fail(
                    "candidate.tsx(1,1): error TS2307: Cannot find module '@/components/Nope'.",
                ),
            ],
            vec![],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Skipped);
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn visual_fail_feeds_report_back_then_passes() {
        let (builder, fx) = fixture(
            vec!["```tsx\nv1\n```", "```tsx\nv2\n```"],
            vec![ScriptedValidator::pass(), ScriptedValidator::pass()],
            vec![
                QaReport {
                    status: QaStatus::Fail,
                    report: "FAIL: hero overlaps nav".into(),
                },
                ScriptedReviewer::pass(),
            ],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Pass);
        assert_eq!(report.attempts, 2);

        // One visual failure learned.
        let log = fx.memory.load_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, FailureCategory::Visual);

        // The repair pass carried the QA report text (and only text).
        let requests = fx.provider.requests.lock().unwrap();
        let second_user = match &requests[1].messages[1].content[0] {
            sitewright_llm::ContentPart::Text { text } => text.clone(),
            _ => panic!("expected text"),
        };
        assert!(second_user.contains("hero overlaps nav"));

        // Both passing candidates were saved; the final file is the repair.
        assert_eq!(std::fs::read_to_string(&fx.page_path).unwrap(), "v2");
    }

    #[tokio::test]
    async fn qa_error_is_terminal_for_the_cycle() {
        let (builder, fx) = fixture(
            vec!["```tsx\nv1\n```"],
            vec![ScriptedValidator::pass()],
            vec![QaReport {
                status: QaStatus::Error,
                report: "Visual QA error: browser crashed".into(),
            }],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Error);
        assert_eq!(report.attempts, 1);
        assert!(report.saved);
    }

    #[tokio::test]
    async fn qa_skipped_finishes_with_warning() {
        let (builder, fx) = fixture(
            vec!["```tsx\nv1\n```"],
            vec![ScriptedValidator::pass()],
            vec![QaReport {
                status: QaStatus::Skipped,
                report: "Visual QA skipped: preview server unreachable.".into(),
            }],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Skipped);
        assert!(report.saved);
    }

    #[tokio::test]
    async fn empty_generation_is_retried_and_recorded() {
        let (builder, fx) = fixture(
            vec!["", "```tsx\nrecovered\n```"],
            vec![ScriptedValidator::pass()],
            vec![ScriptedReviewer::pass()],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Pass);
        assert_eq!(report.attempts, 2);

        let log = fx.memory.load_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, FailureCategory::Builder);
    }

    #[tokio::test]
    async fn budget_exhaustion_ends_with_fail() {
        let distinct = |n: usize| {
            ScriptedValidator::fail(&format!("candidate.tsx(1,1): error TS{n}: problem {n}"))
        };
        let (builder, fx) = fixture(
            vec!["```tsx\na\n```"; 4],
            vec![distinct(1), distinct(2), distinct(1), distinct(2)],
            vec![],
        );

        let report = run(&builder, &fx).await;
        assert_eq!(report.status, QaStatus::Fail);
        assert_eq!(report.attempts, 4);
        assert!(!report.saved);
        // More than one attempt: the rules digest was recompiled.
        assert!(!fx.memory.prompt_injection().is_empty());
    }

    #[tokio::test]
    async fn learned_rules_are_injected_into_later_prompts() {
        let (builder, fx) = fixture(
            vec!["```tsx\nok\n```"],
            vec![ScriptedValidator::pass()],
            vec![ScriptedReviewer::pass()],
        );

        fx.memory.record_failure(FailureRecord::new(
            FailureCategory::Syntax,
            "imported a component missing from the manifest",
            "only use manifest components",
        ));
        fx.memory.save_rules(5);

        run(&builder, &fx).await;

        let requests = fx.provider.requests.lock().unwrap();
        let system = match &requests[0].messages[0].content[0] {
            sitewright_llm::ContentPart::Text { text } => text.clone(),
            _ => panic!("expected text"),
        };
        assert!(system.contains("LEARNED RULES"));
        assert!(system.contains("missing from the manifest"));
    }
}
