//! The primary pipeline stages: Router, Architect, Designer, Copywriter.
//!
//! Architect, Designer, and Copywriter each drive the generic critic loop;
//! the Router is a single classification call with a safe fallback. Prompt
//! templates are owned by the caller (loading them is outside this crate);
//! the embedded defaults keep the stages runnable on their own.

use std::sync::Arc;

use sitewright_llm::{Message, ModelGateway, Request};
use sitewright_store::ClientWorkspace;
use sitewright_types::{CriticVerdict, Persona, Result, Theme};

use crate::critic::run_critic_loop;
use crate::extract::CodeExtractor;

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Prompts {
    pub router: String,
    pub architect: String,
    pub architect_review: String,
    pub designer: String,
    pub designer_review: String,
    pub copywriter: String,
    pub copywriter_review: String,
    pub builder: String,
    pub visual_qa: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            router: "You are an intake router for a landing-page studio. Classify the business \
                     described in the intake notes as one of: local-service, saas, ecommerce, \
                     portfolio. Reply with the single label only."
                .into(),
            architect: "You are a senior strategist. Create a project brief from these intake \
                        notes. Sections: Overview, Brand Colors, Sitemap, Layout Strategy."
                .into(),
            architect_review: "You are a demanding creative director. Compare the brief against \
                               the intake notes. Reply PASS if the brief is faithful and \
                               complete; otherwise reply FAIL followed by the concrete problems."
                .into(),
            designer: "You are a brand designer. From the intake notes, produce a JSON color and \
                       typography theme with keys: primary, secondary, accent, background, \
                       font_heading, font_body, border_radius, source. Output only JSON."
                .into(),
            designer_review: "You are an accessibility reviewer. Check this theme for readable \
                              text contrast on its background. Reply PASS if acceptable; \
                              otherwise reply FAIL followed by the failing pairs."
                .into(),
            copywriter: "You are a conversion copywriter. Write website content (Hero, Features, \
                         Testimonials) based on this brief. Output Markdown."
                .into(),
            copywriter_review: "You are a direct-response editor. Compare the copy against the \
                                brief. Reply PASS if it covers the brief's promise and sections; \
                                otherwise reply FAIL followed by what is missing or off-brand."
                .into(),
            builder: "You are a React engineer. Produce the complete page.tsx for a Next.js \
                      landing page, selecting components only from the manifest and mapping the \
                      content into their props. Output only the code."
                .into(),
            visual_qa: "Review this mobile rendering of the page. Reply PASS if it is ready to \
                        ship. If not, reply FAIL followed by the high-severity issues."
                .into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct Router {
    gateway: Arc<ModelGateway>,
    model: String,
    prompt: String,
}

impl Router {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    /// Classify the intake into a persona. Unrecognized output or a provider
    /// failure falls back to the general persona; routing never aborts the
    /// pipeline.
    pub async fn classify(&self, intake: &str) -> Persona {
        let request = Request::new(
            &self.model,
            vec![Message::system(&self.prompt), Message::user(intake)],
        )
        .with_max_tokens(16);

        match self.gateway.complete(&request).await {
            Ok(resp) => {
                let label = resp.text.trim().to_string();
                let persona = Persona::from_label(&label);
                if persona == Persona::General && !label.eq_ignore_ascii_case("general") {
                    tracing::warn!(label = %label, "Unrecognized route, using general persona");
                }
                persona
            }
            Err(e) => {
                tracing::warn!(error = %e, "Router call failed, using general persona");
                Persona::General
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Review helper
// ---------------------------------------------------------------------------

/// One reviewer call. A reviewer failure must not block the pipeline, so
/// errors collapse to an ambiguous verdict with a warning.
async fn review_artifact(
    gateway: &ModelGateway,
    model: &str,
    review_prompt: &str,
    user: String,
) -> CriticVerdict {
    let request = Request::new(
        model,
        vec![Message::system(review_prompt), Message::user(user)],
    )
    .with_max_tokens(1024);

    match gateway.complete(&request).await {
        Ok(resp) => CriticVerdict::from_review(&resp.text),
        Err(e) => {
            tracing::warn!(error = %e, "Reviewer call failed, treating as ambiguous");
            CriticVerdict::Ambiguous
        }
    }
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

pub struct Architect {
    gateway: Arc<ModelGateway>,
    model: String,
    prompt: String,
    review_prompt: String,
    max_attempts: usize,
}

impl Architect {
    pub fn new(
        gateway: Arc<ModelGateway>,
        model: impl Into<String>,
        prompts: &Prompts,
        max_attempts: usize,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            prompt: prompts.architect.clone(),
            review_prompt: prompts.architect_review.clone(),
            max_attempts,
        }
    }

    /// Generate the brief through the critic loop, persisting the working
    /// copy plus the immutable original.
    pub async fn run(
        &self,
        ws: &ClientWorkspace,
        intake: &str,
        persona: Persona,
    ) -> Result<String> {
        let system = format!("{}\n\nSite persona: {persona}.", self.prompt);
        let gateway = Arc::clone(&self.gateway);
        let model = self.model.clone();
        let review_gateway = Arc::clone(&self.gateway);
        let review_model = self.model.clone();
        let review_prompt = self.review_prompt.clone();
        let intake_owned = intake.to_string();
        let review_intake = intake.to_string();

        let outcome = run_critic_loop(
            "architect",
            self.max_attempts,
            move |feedback| {
                let gateway = Arc::clone(&gateway);
                let model = model.clone();
                let system = system.clone();
                let mut user = intake_owned.clone();
                async move {
                    if let Some(fb) = feedback {
                        user.push_str(&format!(
                            "\n\nRevise the brief to address this review feedback:\n{fb}"
                        ));
                    }
                    let request = Request::new(
                        &model,
                        vec![Message::system(system), Message::user(user)],
                    )
                    .with_max_tokens(2000);
                    gateway.generate_text(&request).await
                }
            },
            move |artifact| {
                let gateway = Arc::clone(&review_gateway);
                let model = review_model.clone();
                let prompt = review_prompt.clone();
                let intake = review_intake.clone();
                async move {
                    review_artifact(
                        &gateway,
                        &model,
                        &prompt,
                        format!("Intake notes:\n{intake}\n\nBrief:\n{artifact}"),
                    )
                    .await
                }
            },
        )
        .await?;

        ws.write_brief(&outcome.artifact)?;
        Ok(outcome.artifact)
    }
}

// ---------------------------------------------------------------------------
// Designer
// ---------------------------------------------------------------------------

pub struct Designer {
    gateway: Arc<ModelGateway>,
    model: String,
    prompt: String,
    review_prompt: String,
    max_attempts: usize,
}

impl Designer {
    pub fn new(
        gateway: Arc<ModelGateway>,
        model: impl Into<String>,
        prompts: &Prompts,
        max_attempts: usize,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            prompt: prompts.designer.clone(),
            review_prompt: prompts.designer_review.clone(),
            max_attempts,
        }
    }

    /// Produce a theme from the intake. Never errors: any failure, including
    /// malformed JSON, degrades to the default theme so the pipeline is not
    /// blocked on styling.
    pub async fn run(self, intake: String) -> Theme {
        let gateway = Arc::clone(&self.gateway);
        let model = self.model.clone();
        let system = self.prompt.clone();
        let review_gateway = Arc::clone(&self.gateway);
        let review_model = self.model.clone();
        let review_prompt = self.review_prompt.clone();

        let outcome = run_critic_loop(
            "designer",
            self.max_attempts,
            move |feedback| {
                let gateway = Arc::clone(&gateway);
                let model = model.clone();
                let system = system.clone();
                let mut user = intake.clone();
                async move {
                    if let Some(fb) = feedback {
                        user.push_str(&format!(
                            "\n\nRevise the theme to address this review feedback:\n{fb}"
                        ));
                    }
                    let request = Request::new(
                        &model,
                        vec![Message::system(system), Message::user(user)],
                    )
                    .with_max_tokens(1000);
                    gateway.generate_text(&request).await
                }
            },
            move |artifact| {
                let gateway = Arc::clone(&review_gateway);
                let model = review_model.clone();
                let prompt = review_prompt.clone();
                async move {
                    review_artifact(&gateway, &model, &prompt, format!("Theme:\n{artifact}")).await
                }
            },
        )
        .await;

        let artifact = match outcome {
            Ok(outcome) => outcome.artifact,
            Err(e) => {
                tracing::warn!(error = %e, "Designer failed, using default theme");
                return Theme::default();
            }
        };

        let json = CodeExtractor::for_json().extract(&artifact).code;
        match serde_json::from_str::<Theme>(&json) {
            Ok(theme) => theme,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed theme JSON, using default theme");
                Theme::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Copywriter
// ---------------------------------------------------------------------------

pub struct Copywriter {
    gateway: Arc<ModelGateway>,
    model: String,
    prompt: String,
    review_prompt: String,
    max_attempts: usize,
}

impl Copywriter {
    pub fn new(
        gateway: Arc<ModelGateway>,
        model: impl Into<String>,
        prompts: &Prompts,
        max_attempts: usize,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            prompt: prompts.copywriter.clone(),
            review_prompt: prompts.copywriter_review.clone(),
            max_attempts,
        }
    }

    pub async fn run(&self, ws: &ClientWorkspace, brief: &str) -> Result<String> {
        let gateway = Arc::clone(&self.gateway);
        let model = self.model.clone();
        let system = self.prompt.clone();
        let review_gateway = Arc::clone(&self.gateway);
        let review_model = self.model.clone();
        let review_prompt = self.review_prompt.clone();
        let brief_owned = brief.to_string();
        let review_brief = brief.to_string();

        let outcome = run_critic_loop(
            "copywriter",
            self.max_attempts,
            move |feedback| {
                let gateway = Arc::clone(&gateway);
                let model = model.clone();
                let system = system.clone();
                let mut user = brief_owned.clone();
                async move {
                    if let Some(fb) = feedback {
                        user.push_str(&format!(
                            "\n\nRevise the copy to address this review feedback:\n{fb}"
                        ));
                    }
                    let request = Request::new(
                        &model,
                        vec![Message::system(system), Message::user(user)],
                    )
                    .with_max_tokens(4000);
                    gateway.generate_text(&request).await
                }
            },
            move |artifact| {
                let gateway = Arc::clone(&review_gateway);
                let model = review_model.clone();
                let prompt = review_prompt.clone();
                let brief = review_brief.clone();
                async move {
                    review_artifact(
                        &gateway,
                        &model,
                        &prompt,
                        format!("Brief:\n{brief}\n\nCopy:\n{artifact}"),
                    )
                    .await
                }
            },
        )
        .await?;

        ws.write_content(&outcome.artifact)?;
        Ok(outcome.artifact)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitewright_llm::{FinishReason, ProviderAdapter, Response, Usage};
    use sitewright_types::{ClientId, SitewrightError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct SequenceProvider {
        responses: Mutex<VecDeque<String>>,
    }

    impl SequenceProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for SequenceProvider {
        async fn complete(
            &self,
            _request: &Request,
        ) -> std::result::Result<Response, SitewrightError> {
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "PASS".into());
            Ok(Response {
                id: "seq".into(),
                text,
                usage: Usage::default(),
                model: "seq-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn default_model(&self) -> &str {
            "seq-model"
        }
        fn supports_vision(&self) -> bool {
            false
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ProviderAdapter for FailingProvider {
        async fn complete(
            &self,
            _request: &Request,
        ) -> std::result::Result<Response, SitewrightError> {
            Err(SitewrightError::AuthError {
                provider: "mock".into(),
            })
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn default_model(&self) -> &str {
            "seq-model"
        }
        fn supports_vision(&self) -> bool {
            false
        }
    }

    fn gateway_with(provider: impl ProviderAdapter + 'static) -> Arc<ModelGateway> {
        let mut gateway = ModelGateway::new();
        gateway.register_provider(provider);
        Arc::new(gateway)
    }

    fn workspace(dir: &std::path::Path) -> ClientWorkspace {
        ClientWorkspace::new(dir, ClientId::parse("acme").unwrap())
    }

    #[tokio::test]
    async fn router_maps_known_label() {
        let router = Router::new(
            gateway_with(SequenceProvider::new(vec!["saas"])),
            "seq-model",
            Prompts::default().router,
        );
        assert_eq!(router.classify("we sell software").await, Persona::Saas);
    }

    #[tokio::test]
    async fn router_falls_back_on_unrecognized_label() {
        let router = Router::new(
            gateway_with(SequenceProvider::new(vec!["space-tourism"])),
            "seq-model",
            Prompts::default().router,
        );
        assert_eq!(router.classify("rockets").await, Persona::General);
    }

    #[tokio::test]
    async fn router_falls_back_on_provider_failure() {
        let router = Router::new(
            gateway_with(FailingProvider),
            "seq-model",
            Prompts::default().router,
        );
        assert_eq!(router.classify("anything").await, Persona::General);
    }

    #[tokio::test]
    async fn architect_regenerates_on_rejection_and_persists_both_copies() {
        // Call order: generate, review (FAIL), generate, review (PASS).
        let gateway = gateway_with(SequenceProvider::new(vec![
            "brief draft one",
            "FAIL: missing sitemap",
            "brief draft two",
            "PASS",
        ]));
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());

        let architect = Architect::new(gateway, "seq-model", &Prompts::default(), 3);
        let brief = architect
            .run(&ws, "intake notes", Persona::LocalService)
            .await
            .unwrap();

        assert_eq!(brief, "brief draft two");
        assert_eq!(ws.read_brief().unwrap(), "brief draft two");
        // The immutable original is the first accepted write, untouched after.
        assert_eq!(
            std::fs::read_to_string(ws.dir().join("brief.orig.md")).unwrap(),
            "brief draft two"
        );
    }

    #[tokio::test]
    async fn designer_parses_fenced_theme_json() {
        let theme_json = r##"```json
{"primary": "#112233", "secondary": "#0f172a", "accent": "#f59e0b",
 "background": "#ffffff", "font_heading": "Sora", "font_body": "Inter",
 "border_radius": "0.75rem", "source": "designer"}
```"##;
        let gateway = gateway_with(SequenceProvider::new(vec![theme_json, "PASS"]));
        let designer = Designer::new(gateway, "seq-model", &Prompts::default(), 3);

        let theme = designer.run("intake".into()).await;
        assert_eq!(theme.primary, "#112233");
        assert_eq!(theme.font_heading, "Sora");
        assert_eq!(theme.source, "designer");
    }

    #[tokio::test]
    async fn designer_defaults_on_malformed_json() {
        let gateway = gateway_with(SequenceProvider::new(vec!["not json at all", "PASS"]));
        let designer = Designer::new(gateway, "seq-model", &Prompts::default(), 3);

        let theme = designer.run("intake".into()).await;
        assert_eq!(theme, Theme::default());
    }

    #[tokio::test]
    async fn designer_defaults_on_provider_failure() {
        let designer = Designer::new(
            gateway_with(FailingProvider),
            "seq-model",
            &Prompts::default(),
            3,
        );
        let theme = designer.run("intake".into()).await;
        assert_eq!(theme, Theme::default());
    }

    #[tokio::test]
    async fn copywriter_writes_content_artifacts() {
        let gateway = gateway_with(SequenceProvider::new(vec!["# Hero\ngreat copy", "PASS"]));
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());

        let copywriter = Copywriter::new(gateway, "seq-model", &Prompts::default(), 3);
        let content = copywriter.run(&ws, "the brief").await.unwrap();

        assert!(content.contains("great copy"));
        assert_eq!(ws.read_content().unwrap(), content);
        assert!(ws.dir().join("content.orig.md").exists());
    }
}
