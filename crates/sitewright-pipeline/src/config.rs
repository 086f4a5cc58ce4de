//! Pipeline configuration knobs with the observed production defaults.
//!
//! Staleness thresholds and attempt budgets are fixed constants in spirit;
//! they are exposed here as knobs so deployments can tune them via the
//! environment without touching the state machines.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of per-client artifact directories.
    pub clients_root: PathBuf,
    /// Root the generated pages are written under (`<pages_root>/<id>/page.tsx`).
    pub pages_root: PathBuf,
    pub locks_dir: PathBuf,
    pub memory_dir: PathBuf,
    /// Manifest of allowed building blocks fed to the builder prompt.
    pub manifest_path: PathBuf,
    /// Root of the site project whose tsconfig the syntax checker extends.
    pub project_root: PathBuf,
    /// Base URL of the preview server used for visual QA.
    pub preview_url: String,

    pub lock_ttl: Duration,
    pub max_syntax_retries: usize,
    pub max_visual_retries: usize,
    pub repeat_threshold: usize,
    pub critic_max_attempts: usize,
    pub designer_timeout: Duration,
    pub poll_interval: Duration,
    pub syntax_timeout: Duration,
    pub render_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub rules_top_n: usize,

    pub model_strategy: String,
    pub model_coder: String,
    pub model_copy: String,
    pub model_vision: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clients_root: PathBuf::from("clients"),
            pages_root: PathBuf::from("app/clients"),
            locks_dir: PathBuf::from("data/locks"),
            memory_dir: PathBuf::from("data/memory"),
            manifest_path: PathBuf::from("design-system/manifest.md"),
            project_root: PathBuf::from("."),
            preview_url: "http://localhost:3000".to_string(),

            lock_ttl: Duration::from_secs(3600),
            max_syntax_retries: 2,
            max_visual_retries: 2,
            repeat_threshold: 3,
            critic_max_attempts: 3,
            designer_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3600),
            syntax_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
            rules_top_n: 5,

            model_strategy: "claude-opus-4-5-20251101".to_string(),
            model_coder: "claude-sonnet-4-5-20250929".to_string(),
            model_copy: "gpt-4o".to_string(),
            model_vision: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with env overrides for the deployment-specific paths.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("SITEWRIGHT_CLIENTS_ROOT") {
            config.clients_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("SITEWRIGHT_PAGES_ROOT") {
            config.pages_root = PathBuf::from(root);
        }
        if let Ok(url) = std::env::var("SITEWRIGHT_PREVIEW_URL") {
            config.preview_url = url;
        }
        if let Ok(secs) = std::env::var("SITEWRIGHT_POLL_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.poll_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(secs) = std::env::var("SITEWRIGHT_LOCK_TTL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.lock_ttl = Duration::from_secs(secs);
            }
        }
        config
    }

    /// Total engineering-cycle attempt budget.
    pub fn build_budget(&self) -> usize {
        self.max_syntax_retries + self.max_visual_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.lock_ttl, Duration::from_secs(3600));
        assert_eq!(config.build_budget(), 4);
        assert_eq!(config.repeat_threshold, 3);
        assert_eq!(config.designer_timeout, Duration::from_secs(60));
        assert_eq!(config.rules_top_n, 5);
    }
}
