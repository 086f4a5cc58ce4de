//! Cross-run learning store.
//!
//! Append-only failure log, a rule compiler that folds recurring failure
//! categories into a ranked digest, and a sampler of golden reference
//! artifacts for few-shot guidance. Recording must never abort the pipeline:
//! every public mutation reports success as a bool and logs on failure.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use sitewright_types::{FailureCategory, FailureRecord};

use crate::artifact::atomic_write;

const GOLDEN_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js"];

/// One compiled rule: a failure category with its occurrence count and a
/// representative issue + fix.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledRule {
    pub category: FailureCategory,
    pub count: usize,
    pub issue: String,
    pub fix: String,
}

/// The digest regenerated wholesale from the failure log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledRules {
    pub total_failures: usize,
    pub rules: Vec<CompiledRule>,
}

impl CompiledRules {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Render the digest as markdown. An empty log yields a well-formed
    /// "no data yet" document, never an error.
    pub fn render_markdown(&self) -> String {
        if self.rules.is_empty() {
            return "# Dynamic Rules\n\n*No failures recorded yet. The system is learning.*\n"
                .to_string();
        }

        let mut md = String::from("# Dynamic Rules - Top Avoidable Mistakes\n\n");
        md.push_str(&format!(
            "*Auto-generated from {} recorded failures.*\n\n",
            self.total_failures
        ));
        for (i, rule) in self.rules.iter().enumerate() {
            md.push_str(&format!(
                "## Rule {}: Avoid {} errors ({} occurrences)\n\n",
                i + 1,
                rule.category,
                rule.count
            ));
            md.push_str(&format!("**Common problem:** {}\n\n", rule.issue));
            if !rule.fix.is_empty() {
                md.push_str(&format!("**Prevention:** {}\n\n", rule.fix));
            }
            md.push_str("---\n\n");
        }
        md
    }
}

/// Summary counts over the failure log.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub total: usize,
    pub by_category: HashMap<FailureCategory, usize>,
}

// ---------------------------------------------------------------------------
// LearningStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LearningStore {
    dir: PathBuf,
}

impl LearningStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("failures.json")
    }

    fn rules_path(&self) -> PathBuf {
        self.dir.join("rules.md")
    }

    fn golden_dir(&self) -> PathBuf {
        self.dir.join("golden")
    }

    /// Append a record to the durable log. Never propagates an error to the
    /// caller: a failure to record must not abort the pipeline.
    pub fn record_failure(&self, record: FailureRecord) -> bool {
        let mut log = self.load_log();
        let preview: String = record.issue.chars().take(80).collect();
        log.push(record);

        let json = match serde_json::to_string_pretty(&log) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize failure log");
                return false;
            }
        };
        match atomic_write(&self.log_path(), &json) {
            Ok(()) => {
                tracing::info!(issue = %preview, "Recorded failure");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write failure log");
                false
            }
        }
    }

    /// Load the full log. A missing or corrupted file starts fresh with a
    /// warning.
    pub fn load_log(&self) -> Vec<FailureRecord> {
        let raw = match fs::read_to_string(self.log_path()) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(error = %e, "Corrupted failure log, starting fresh");
                Vec::new()
            }
        }
    }

    /// Compile the ranked digest from the log: group by category, count
    /// occurrences, keep the first unique issue per category as the
    /// representative, order by frequency descending, cap at `top_n`.
    pub fn compile_rules(&self, top_n: usize) -> CompiledRules {
        let log = self.load_log();
        let mut counts: HashMap<FailureCategory, usize> = HashMap::new();
        let mut representative: HashMap<FailureCategory, (String, String)> = HashMap::new();

        for record in &log {
            *counts.entry(record.category).or_default() += 1;
            representative
                .entry(record.category)
                .or_insert_with(|| (record.issue.clone(), record.fix.clone()));
        }

        let mut rules: Vec<CompiledRule> = counts
            .into_iter()
            .map(|(category, count)| {
                let (issue, fix) = representative
                    .get(&category)
                    .cloned()
                    .unwrap_or_default();
                CompiledRule {
                    category,
                    count,
                    issue,
                    fix,
                }
            })
            .collect();

        // Frequency descending; category name breaks ties deterministically.
        rules.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.category.to_string().cmp(&b.category.to_string()))
        });
        rules.truncate(top_n);

        CompiledRules {
            total_failures: log.len(),
            rules,
        }
    }

    /// Regenerate `rules.md` wholesale from the log.
    ///
    /// Call sites invoke this only when a cycle needed more than one attempt,
    /// not on every failure, to avoid rewrite storms.
    pub fn save_rules(&self, top_n: usize) -> bool {
        let digest = self.compile_rules(top_n).render_markdown();
        match atomic_write(&self.rules_path(), &digest) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write rules digest");
                false
            }
        }
    }

    /// The compiled digest formatted for inclusion in a generation system
    /// prompt, or empty if no rules exist yet.
    pub fn prompt_injection(&self) -> String {
        let digest = match fs::read_to_string(self.rules_path()) {
            Ok(content) => content,
            Err(_) => {
                let compiled = self.compile_rules(5);
                if compiled.is_empty() {
                    return String::new();
                }
                compiled.render_markdown()
            }
        };
        if digest.trim().is_empty() {
            return String::new();
        }
        format!("## LEARNED RULES (from previous mistakes - MUST FOLLOW)\n\n{digest}\n---\n")
    }

    /// Uniformly sample one golden reference artifact. Returns `None` when
    /// the set is empty; callers omit the prompt section rather than erroring.
    pub fn golden_reference(&self) -> Option<(String, String)> {
        let entries = fs::read_dir(self.golden_dir()).ok()?;
        let samples: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_golden_extension(p))
            .collect();

        let chosen = samples.choose(&mut rand::thread_rng())?;
        let name = chosen.file_name()?.to_string_lossy().into_owned();
        let content = fs::read_to_string(chosen).ok()?;
        tracing::info!(sample = %name, "Loaded golden reference");
        Some((name, content))
    }

    /// The golden reference formatted as a few-shot prompt section, or empty.
    pub fn golden_prompt(&self) -> String {
        let Some((name, content)) = self.golden_reference() else {
            return String::new();
        };
        format!(
            "## GOLDEN REFERENCE (example of good output)\n\n\
             **File:** `{name}`\n\n```tsx\n{content}\n```\n---\n"
        )
    }

    pub fn add_golden_sample(&self, name: &str, content: &str) -> bool {
        match atomic_write(&self.golden_dir().join(name), content) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, sample = %name, "Failed to save golden sample");
                false
            }
        }
    }

    pub fn stats(&self) -> MemoryStats {
        let log = self.load_log();
        let mut by_category: HashMap<FailureCategory, usize> = HashMap::new();
        for record in &log {
            *by_category.entry(record.category).or_default() += 1;
        }
        MemoryStats {
            total: log.len(),
            by_category,
        }
    }

    /// Trim the log to its most recent `keep_last_n` entries. Returns how
    /// many were removed.
    pub fn clear_old_failures(&self, keep_last_n: usize) -> usize {
        let log = self.load_log();
        if log.len() <= keep_last_n {
            return 0;
        }
        let removed = log.len() - keep_last_n;
        let kept = &log[removed..];
        let Ok(json) = serde_json::to_string_pretty(kept) else {
            return 0;
        };
        if atomic_write(&self.log_path(), &json).is_err() {
            return 0;
        }
        tracing::info!(removed, kept = keep_last_n, "Trimmed failure log");
        removed
    }
}

fn has_golden_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| GOLDEN_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: FailureCategory, issue: &str) -> FailureRecord {
        FailureRecord::new(category, issue, "fix it")
    }

    #[test]
    fn record_failure_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        assert!(store.record_failure(record(FailureCategory::Syntax, "missing import")));
        assert!(store.record_failure(record(FailureCategory::Visual, "overlapping text")));

        let log = store.load_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].issue, "missing import");
        assert_eq!(log[1].category, FailureCategory::Visual);
    }

    #[test]
    fn corrupted_log_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("failures.json"), "{ corrupt").unwrap();

        assert!(store.load_log().is_empty());
        // Recording over a corrupted log still works.
        assert!(store.record_failure(record(FailureCategory::Syntax, "x")));
        assert_eq!(store.load_log().len(), 1);
    }

    #[test]
    fn compile_rules_on_empty_log_is_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        let rules = store.compile_rules(5);
        assert!(rules.is_empty());
        assert_eq!(rules.total_failures, 0);
        let md = rules.render_markdown();
        assert!(md.contains("No failures recorded yet"));
    }

    #[test]
    fn compile_rules_ranks_by_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        for i in 0..5 {
            store.record_failure(record(FailureCategory::Syntax, &format!("syntax {i}")));
        }
        for i in 0..2 {
            store.record_failure(record(FailureCategory::Visual, &format!("visual {i}")));
        }

        let rules = store.compile_rules(5);
        assert_eq!(rules.total_failures, 7);
        assert_eq!(rules.rules[0].category, FailureCategory::Syntax);
        assert_eq!(rules.rules[0].count, 5);
        assert_eq!(rules.rules[1].category, FailureCategory::Visual);
        assert_eq!(rules.rules[1].count, 2);
        // Representative is the first recorded issue for the category.
        assert_eq!(rules.rules[0].issue, "syntax 0");
    }

    #[test]
    fn compile_rules_caps_at_top_n() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        store.record_failure(record(FailureCategory::Syntax, "a"));
        store.record_failure(record(FailureCategory::Visual, "b"));
        store.record_failure(record(FailureCategory::A11y, "c"));

        assert_eq!(store.compile_rules(2).rules.len(), 2);
    }

    #[test]
    fn prompt_injection_empty_without_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());
        assert!(store.prompt_injection().is_empty());
    }

    #[test]
    fn prompt_injection_wraps_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());
        store.record_failure(record(FailureCategory::Syntax, "missing import"));
        store.save_rules(5);

        let injection = store.prompt_injection();
        assert!(injection.contains("LEARNED RULES"));
        assert!(injection.contains("missing import"));
    }

    #[test]
    fn golden_reference_empty_set_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());
        assert!(store.golden_reference().is_none());
        assert!(store.golden_prompt().is_empty());
    }

    #[test]
    fn golden_reference_samples_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        assert!(store.add_golden_sample("great_saas.tsx", "export default function Page() {}"));
        // Non-code files are never sampled.
        fs::write(store.golden_dir().join("notes.txt"), "ignore me").unwrap();

        let (name, content) = store.golden_reference().unwrap();
        assert_eq!(name, "great_saas.tsx");
        assert!(content.contains("export default"));
        assert!(store.golden_prompt().contains("great_saas.tsx"));
    }

    #[test]
    fn stats_counts_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        store.record_failure(record(FailureCategory::Syntax, "a"));
        store.record_failure(record(FailureCategory::Syntax, "b"));
        store.record_failure(record(FailureCategory::Builder, "c"));

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category[&FailureCategory::Syntax], 2);
        assert_eq!(stats.by_category[&FailureCategory::Builder], 1);
    }

    #[test]
    fn clear_old_failures_trims_to_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path());

        for i in 0..6 {
            store.record_failure(record(FailureCategory::Syntax, &format!("issue {i}")));
        }
        assert_eq!(store.clear_old_failures(4), 2);

        let log = store.load_log();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].issue, "issue 2");
        assert_eq!(store.clear_old_failures(10), 0);
    }
}
