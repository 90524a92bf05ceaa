//! Operational journal: tracing events mirrored into `service_logs` and `errors`
//!
//! Journal writes are best-effort. A failed mirror insert is reported through
//! tracing and never turns a successful pipeline step into a failure.

use crate::error::Error;
use crate::storage::{ErrorRecord, ServiceLogRecord, Store};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Handle used by the engines to report progress and per-item failures
#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn Store>,
    program_name: String,
}

impl Journal {
    pub fn new(store: Arc<dyn Store>, program_name: impl Into<String>) -> Self {
        Self {
            store,
            program_name: program_name.into(),
        }
    }

    pub async fn info(&self, message: &str) {
        tracing::info!("{message}");
        self.mirror(Severity::Info, message).await;
    }

    pub async fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        self.mirror(Severity::Warning, message).await;
    }

    pub async fn error(&self, message: &str) {
        tracing::error!("{message}");
        self.mirror(Severity::Error, message).await;
    }

    /// Record a per-item failure in the `errors` table and the service log
    pub async fn failure(&self, stage: &str, item_id: &str, err: &Error) {
        let kind = err.kind();
        crate::metrics::record_stage_error(stage, kind);
        tracing::warn!(
            stage = %stage,
            item_id = %item_id,
            kind = %kind,
            category = err.category().as_str(),
            error = %err,
            "Item failed"
        );

        let record = ErrorRecord::new(stage, item_id, kind, err.to_string());
        if let Err(e) = self.store.insert(&record).await {
            tracing::warn!(error = %e, "Failed to persist error record");
        }
        self.mirror(
            Severity::Warning,
            &format!("{} {item_id} {err}", stage.to_uppercase()),
        )
        .await;
    }

    async fn mirror(&self, severity: Severity, message: &str) {
        let record = ServiceLogRecord::new(&self.program_name, severity.as_str(), message);
        if let Err(e) = self.store.insert(&record).await {
            tracing::warn!(error = %e, "Failed to persist service log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStore, Table};
    use crate::utils::error::SourceError;

    #[tokio::test]
    async fn test_failure_writes_error_and_log_rows() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let journal = Journal::new(store.clone(), "snoolens-test");

        journal
            .failure(
                "ingest_post",
                "p1",
                &Error::Source(SourceError::NotFound("p1".into())),
            )
            .await;
        journal.info("Getting posts in subreddit rust").await;

        assert_eq!(store.count(Table::Errors).unwrap(), 1);
        assert_eq!(store.count(Table::ServiceLogs).unwrap(), 2);
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::Info.as_str(), "INFO");
        assert_eq!(Severity::Warning.as_str(), "WARNING");
        assert_eq!(Severity::Error.as_str(), "ERROR");
    }
}
