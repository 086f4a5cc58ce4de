//! The self-correcting pipeline engine.
//!
//! Each stage produces an artifact, a second model reviews it, and the stage
//! regenerates on rejection up to a bounded attempt count (the critic loop).
//! Code generation additionally passes through the builder's engineering
//! cycle: generate, static syntax gate, save, rendered visual gate, repair.

pub mod builder;
pub mod classify;
pub mod config;
pub mod critic;
pub mod extract;
pub mod notify;
pub mod orchestrator;
pub mod stages;
pub mod syntax;
pub mod visual;

pub use builder::{BuildLimits, BuildReport, Builder};
pub use classify::{ErrorCategory, FailureClassifier, HeuristicClassifier, RepetitionTracker};
pub use config::PipelineConfig;
pub use critic::{run_critic_loop, CriticOutcome};
pub use extract::{CodeExtractor, ExtractedCode};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::Orchestrator;
pub use stages::{Architect, Copywriter, Designer, Prompts, Router};
pub use syntax::{CodeValidator, SyntaxChecker, SyntaxReport};
pub use visual::{HeadlessChromeRenderer, PageRenderer, QaReport, VisualInspector, VisualReviewer};
