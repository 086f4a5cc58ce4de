//! Operator notification seam.
//!
//! Delivery transport (chat webhooks) lives outside this crate; the pipeline
//! only speaks to this trait, and missing notification config degrades to
//! logging rather than failing the run.

use async_trait::async_trait;
use sitewright_types::{ClientId, QaStatus};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort announcement that a build finished. Implementations must
    /// swallow their own delivery errors.
    async fn build_completed(&self, client: &ClientId, status: QaStatus, report: &str);
}

/// Default notifier: a structured log line.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn build_completed(&self, client: &ClientId, status: QaStatus, report: &str) {
        match status {
            QaStatus::Pass => {
                tracing::info!(client = %client, "Build ready for final approval");
            }
            _ => {
                tracing::warn!(
                    client = %client,
                    status = %status,
                    report = %report,
                    "Build finished with issues"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_handles_all_statuses() {
        let notifier = LogNotifier;
        let id = ClientId::parse("acme").unwrap();
        for status in [
            QaStatus::Pass,
            QaStatus::Fail,
            QaStatus::Error,
            QaStatus::Skipped,
        ] {
            notifier.build_completed(&id, status, "report").await;
        }
    }
}
