//! Failure-category detection and repetition tracking for early exit.
//!
//! Classification is a pluggable interface so new heuristics can be added and
//! tested without touching the retry state machine.

/// Normalized category of a syntax failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing/unresolvable imports. This failure mode does not converge
    /// with more retries.
    ModuleResolution,
    /// Anything else, keyed by its first-line signature.
    Other(String),
}

impl ErrorCategory {
    pub fn is_module_resolution(&self) -> bool {
        matches!(self, ErrorCategory::ModuleResolution)
    }
}

pub trait FailureClassifier: Send + Sync {
    fn classify(&self, compiler_output: &str) -> ErrorCategory;
}

/// Substring heuristics over compiler text.
pub struct HeuristicClassifier;

const MODULE_RESOLUTION_MARKERS: &[&str] = &[
    "Cannot find module",
    "Module not found",
    "TS2307",
    "has no exported member",
];

impl FailureClassifier for HeuristicClassifier {
    fn classify(&self, compiler_output: &str) -> ErrorCategory {
        if MODULE_RESOLUTION_MARKERS
            .iter()
            .any(|marker| compiler_output.contains(marker))
        {
            return ErrorCategory::ModuleResolution;
        }
        let signature: String = compiler_output
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(120)
            .collect();
        ErrorCategory::Other(signature)
    }
}

// ---------------------------------------------------------------------------
// RepetitionTracker
// ---------------------------------------------------------------------------

/// Tracks consecutive failures of the same category. When the same category
/// repeats `threshold` times in a row, the cycle should abort early instead
/// of retrying to exhaustion.
#[derive(Debug)]
pub struct RepetitionTracker {
    threshold: usize,
    last: Option<ErrorCategory>,
    consecutive: usize,
}

impl RepetitionTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            last: None,
            consecutive: 0,
        }
    }

    /// Record a failure category. Returns `true` when the threshold is hit.
    pub fn record(&mut self, category: &ErrorCategory) -> bool {
        if self.last.as_ref() == Some(category) {
            self.consecutive += 1;
        } else {
            self.last = Some(category.clone());
            self.consecutive = 1;
        }
        self.consecutive >= self.threshold
    }

    /// Reset after a success so unrelated later failures start fresh.
    pub fn reset(&mut self) {
        self.last = None;
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
