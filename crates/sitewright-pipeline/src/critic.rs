//! The generic critic loop: generate, review, retry-with-feedback.
//!
//! Used identically for brief-vs-intake critique, copy-vs-brief critique, and
//! theme-vs-accessibility critique. Exhausting the review budget never blocks
//! the pipeline; the last artifact is returned with its verdict.

use std::future::Future;

use sitewright_types::{CriticVerdict, GenOutcome, Result, SitewrightError};

/// Result of a completed critic loop.
#[derive(Debug, Clone)]
pub struct CriticOutcome {
    /// Final artifact text; always non-empty.
    pub artifact: String,
    /// The last verdict, for telemetry.
    pub verdict: CriticVerdict,
    pub attempts: usize,
}

/// Drive generate → review → accept/retry up to `max_attempts`.
///
/// `generate` receives the feedback from the previous attempt only (not an
/// accumulated history). An empty generation is retried without consuming
/// critic feedback; empty on the final attempt is a terminal generation
/// error. A FAIL verdict on the final attempt is logged and the artifact is
/// used anyway.
pub async fn run_critic_loop<G, GFut, R, RFut>(
    stage: &str,
    max_attempts: usize,
    mut generate: G,
    mut review: R,
) -> Result<CriticOutcome>
where
    G: FnMut(Option<String>) -> GFut,
    GFut: Future<Output = Result<GenOutcome>>,
    R: FnMut(String) -> RFut,
    RFut: Future<Output = CriticVerdict>,
{
    let mut feedback: Option<String> = None;
    let mut attempt = 0;
    let mut artifact = String::new();
    let mut verdict = CriticVerdict::Ambiguous;

    while attempt < max_attempts {
        attempt += 1;

        match generate(feedback.clone()).await? {
            GenOutcome::Text(text) => artifact = text,
            GenOutcome::Empty => {
                tracing::warn!(stage, attempt, "Empty generation, retrying");
                if attempt >= max_attempts {
                    return Err(SitewrightError::EmptyGeneration {
                        stage: stage.to_string(),
                        attempts: attempt,
                    });
                }
                continue;
            }
        }

        verdict = review(artifact.clone()).await;
        match &verdict {
            CriticVerdict::Fail(fb) => {
                if attempt >= max_attempts {
                    tracing::warn!(
                        stage,
                        attempt,
                        "Review budget exhausted, using last artifact anyway"
                    );
                    break;
                }
                tracing::info!(stage, attempt, "Review rejected artifact, regenerating");
                feedback = Some(fb.clone());
            }
            CriticVerdict::Pass => break,
            CriticVerdict::Ambiguous => {
                tracing::warn!(stage, attempt, "Ambiguous review, accepting artifact");
                break;
            }
        }
    }

    Ok(CriticOutcome {
        artifact,
        verdict,
        attempts: attempt,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
