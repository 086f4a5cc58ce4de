//! Shared types, errors, and verdicts for the Sitewright content factory.
//!
//! This crate provides the foundational types used across all other Sitewright
//! crates:
//! - `SitewrightError` — unified error taxonomy
//! - `ClientId` — validated client identifier, safe for filesystem paths
//! - `CriticVerdict` — tri-state review verdict (never a boolean)
//! - `GenOutcome` — explicit generation result, so retry logic is a state check
//! - `FailureRecord` — durable memory of past mistakes
//! - `Theme`, `Persona`, `QaStatus` — pipeline artifacts and statuses

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unified error type for all Sitewright subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SitewrightError {
    // === Model provider errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    // === Pipeline errors ===
    #[error("Stage '{stage}' produced empty output after {attempts} attempts")]
    EmptyGeneration { stage: String, attempts: usize },

    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    #[error("Client '{client}' is locked by another run")]
    LockContention { client: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SitewrightError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SitewrightError::RateLimited { .. }
                | SitewrightError::CommandTimeout { .. }
                | SitewrightError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SitewrightError::AuthError { .. }
                | SitewrightError::InvalidClientId(_)
                | SitewrightError::EmptyGeneration { .. }
        )
    }
}

/// A convenience alias for `Result<T, SitewrightError>`.
pub type Result<T> = std::result::Result<T, SitewrightError>;

// ---------------------------------------------------------------------------
// ClientId — validated client identifier
// ---------------------------------------------------------------------------

/// A validated client identifier, safe for use in filesystem paths.
///
/// Rules: 1+ characters of `[A-Za-z0-9_-]`, first and last character
/// alphanumeric. Path separators, traversal sequences, and Windows-invalid
/// characters are rejected by the charset restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self> {
        if Self::is_valid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(SitewrightError::InvalidClientId(raw.to_string()))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        let bytes = raw.as_bytes();
        if bytes.is_empty() {
            return false;
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return false;
        }
        let first = bytes[0] as char;
        let last = bytes[bytes.len() - 1] as char;
        first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ClientId {
    type Err = SitewrightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClientId {
    type Error = SitewrightError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// CriticVerdict — tri-state review verdict
// ---------------------------------------------------------------------------

/// Verdict returned by a reviewer. Never a boolean: on `Fail` the feedback
/// text must survive into the next generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticVerdict {
    Pass,
    Fail(String),
    /// Reviewer produced neither marker. Treated as a pass with a warning.
    Ambiguous,
}

impl CriticVerdict {
    /// Classify raw reviewer text.
    ///
    /// FAIL is evaluated before PASS: rejection feedback may legitimately
    /// contain the substring "PASS" and must not be mistaken for an accept.
    pub fn from_review(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.contains("FAIL") {
            CriticVerdict::Fail(trimmed.to_string())
        } else if trimmed.contains("PASS") {
            CriticVerdict::Pass
        } else {
            CriticVerdict::Ambiguous
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CriticVerdict::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, CriticVerdict::Fail(_))
    }

    pub fn feedback(&self) -> Option<&str> {
        match self {
            CriticVerdict::Fail(feedback) => Some(feedback),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GenOutcome — explicit generation result
// ---------------------------------------------------------------------------

/// Outcome of one generation call. Provider failures are `Err` at the call
/// site; an empty completion is a state, not an exception, so retry logic is
/// a plain match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenOutcome {
    Text(String),
    Empty,
}

impl GenOutcome {
    /// Wrap raw completion text, mapping whitespace-only output to `Empty`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            GenOutcome::Empty
        } else {
            GenOutcome::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, GenOutcome::Empty)
    }
}

// ---------------------------------------------------------------------------
// QaStatus — final status of an engineering cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaStatus {
    Pass,
    Fail,
    /// Infrastructure failure during rendering/capture. Terminal for the
    /// cycle: cannot be repaired by regenerating code.
    Error,
    /// QA could not run (preview unreachable) or the cycle exited early.
    Skipped,
}

impl std::fmt::Display for QaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QaStatus::Pass => "pass",
            QaStatus::Fail => "fail",
            QaStatus::Error => "error",
            QaStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// FailureRecord — append-only memory of past mistakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Syntax,
    Visual,
    A11y,
    Builder,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::Syntax => "syntax",
            FailureCategory::Visual => "visual",
            FailureCategory::A11y => "a11y",
            FailureCategory::Builder => "builder",
        };
        f.write_str(s)
    }
}

/// One recorded failure. Immutable once written; the log is the sole durable
/// memory of past mistakes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub category: FailureCategory,
    pub issue: String,
    pub fix: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FailureRecord {
    pub fn new(
        category: FailureCategory,
        issue: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            category,
            issue: issue.into(),
            fix: fix.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Theme — Designer output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub font_heading: String,
    pub font_body: String,
    pub border_radius: String,
    pub source: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: "#1d4ed8".into(),
            secondary: "#0f172a".into(),
            accent: "#f59e0b".into(),
            background: "#ffffff".into(),
            font_heading: "Inter".into(),
            font_body: "Inter".into(),
            border_radius: "0.5rem".into(),
            source: "default".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Persona — Router classification
// ---------------------------------------------------------------------------

/// Site persona selected by the Router. Unrecognized classifier output maps
/// to `General` so the pipeline proceeds instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persona {
    LocalService,
    Saas,
    Ecommerce,
    Portfolio,
    General,
}

impl Persona {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "local-service" | "local_service" | "local service" => Persona::LocalService,
            "saas" => Persona::Saas,
            "ecommerce" | "e-commerce" => Persona::Ecommerce,
            "portfolio" => Persona::Portfolio,
            _ => Persona::General,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Persona::LocalService => "local-service",
            Persona::Saas => "saas",
            Persona::Ecommerce => "ecommerce",
            Persona::Portfolio => "portfolio",
            Persona::General => "general",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
