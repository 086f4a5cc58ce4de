//! Static syntax gate for generated page code.
//!
//! The candidate is staged in its own temporary project with a config that
//! extends the real project's, so it resolves the same path aliases without
//! being polluted by pre-existing errors elsewhere in the repository.
//! Compiler output is filtered to errors attributable to the candidate file
//! only. A timeout is fatal for that attempt, not for the whole cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sitewright_types::Result;

const CANDIDATE_FILE: &str = "candidate.tsx";

#[derive(Debug, Clone)]
pub struct SyntaxReport {
    pub passed: bool,
    /// Diagnostics attributable to the candidate file.
    pub errors: Vec<String>,
    pub timed_out: bool,
}

impl SyntaxReport {
    fn passing() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            timed_out: false,
        }
    }

    fn failing(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            errors,
            timed_out: false,
        }
    }

    pub fn feedback(&self) -> String {
        self.errors.join("\n")
    }
}

/// Seam between the engineering cycle and the static checker, so the cycle
/// can be tested with scripted validators.
#[async_trait]
pub trait CodeValidator: Send + Sync {
    async fn check(&self, code: &str) -> SyntaxReport;
}

// ---------------------------------------------------------------------------
// SyntaxChecker
// ---------------------------------------------------------------------------

pub struct SyntaxChecker {
    project_root: PathBuf,
    timeout: Duration,
    program: String,
    args: Vec<String>,
}

impl SyntaxChecker {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            timeout: Duration::from_secs(120),
            program: "npx".to_string(),
            args: vec!["tsc".into(), "--noEmit".into(), "-p".into()],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the checker command (the staged tsconfig path is appended as
    /// the final argument).
    pub fn with_tool(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub async fn run(&self, code: &str) -> Result<SyntaxReport> {
        let stage_dir = std::env::temp_dir().join(format!("sitewright-tsc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&stage_dir)?;

        let result = self.run_in(&stage_dir, code).await;
        let _ = std::fs::remove_dir_all(&stage_dir);
        result
    }

    async fn run_in(&self, stage_dir: &Path, code: &str) -> Result<SyntaxReport> {
        std::fs::write(stage_dir.join(CANDIDATE_FILE), code)?;
        let tsconfig = stage_dir.join("tsconfig.json");
        std::fs::write(&tsconfig, self.staged_tsconfig())?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&tsconfig)
            .current_dir(stage_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = %self.timeout.as_millis(),
                    "Type check timed out, treating as a syntax failure"
                );
                return Ok(SyntaxReport {
                    passed: false,
                    errors: vec![format!(
                        "type check timed out after {}s",
                        self.timeout.as_secs()
                    )],
                    timed_out: true,
                });
            }
        };

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let errors = attributable_errors(&combined, CANDIDATE_FILE);

        if errors.is_empty() {
            // A nonzero exit caused only by unrelated files must not fail
            // the candidate.
            Ok(SyntaxReport::passing())
        } else {
            Ok(SyntaxReport::failing(errors))
        }
    }

    fn staged_tsconfig(&self) -> String {
        let extends = self.project_root.join("tsconfig.json");
        format!(
            r#"{{
  "extends": "{}",
  "compilerOptions": {{
    "noEmit": true,
    "skipLibCheck": true
  }},
  "include": ["{}"]
}}
"#,
            extends.display(),
            CANDIDATE_FILE
        )
    }
}

/// Keep only diagnostic lines attributable to the given file.
fn attributable_errors(output: &str, file: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(file))
        .map(|line| line.trim().to_string())
        .collect()
}

#[async_trait]
impl CodeValidator for SyntaxChecker {
    async fn check(&self, code: &str) -> SyntaxReport {
        match self.run(code).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Type checker failed to run");
                SyntaxReport::failing(vec![format!("type checker failed to run: {e}")])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
