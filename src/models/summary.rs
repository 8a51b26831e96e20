//! Per-invocation report returned by the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FailureScope};

/// Runner state at the moment a failure was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Fetching,
    Normalizing,
    Filtering,
    Persisting,
    Reporting,
}

/// Kind of failure that aborted a source invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceUnavailable,
    StoreUnavailable,
    Timeout,
    Cancelled,
    Config,
}

/// Typed source-level failure carried by a [`Summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub phase: RunPhase,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(error: &AppError, phase: RunPhase) -> Self {
        let kind = match error {
            AppError::Timeout { .. } => FailureKind::Timeout,
            AppError::Cancelled(_) => FailureKind::Cancelled,
            AppError::Config(_) | AppError::Validation(_) | AppError::Selector { .. } => {
                FailureKind::Config
            }
            other if other.scope() == FailureScope::Store => FailureKind::StoreUnavailable,
            _ => FailureKind::SourceUnavailable,
        };
        Self {
            kind,
            phase,
            message: error.to_string(),
        }
    }
}

/// Counts for one source invocation. Never an unhandled failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub source_id: String,
    pub inserted: usize,
    pub duplicate: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Feeds that failed while the rest of the source went through
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feed_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Summary {
    pub fn started(source_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.into(),
            inserted: 0,
            duplicate: 0,
            skipped: 0,
            failed: 0,
            feed_errors: Vec::new(),
            error: None,
            started_at: at,
            finished_at: at,
        }
    }

    /// Summary for an invocation that never reached an adapter.
    pub fn rejected(source_id: impl Into<String>, error: &AppError) -> Self {
        let now = Utc::now();
        let mut summary = Self::started(source_id, now);
        summary.error = Some(SourceFailure::from_error(error, RunPhase::Fetching));
        summary
    }

    pub fn fail(&mut self, error: &AppError, phase: RunPhase) {
        self.error = Some(SourceFailure::from_error(error, phase));
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = at;
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Items that reached a decision (persisted or not).
    pub fn seen(&self) -> usize {
        self.inserted + self.duplicate + self.skipped + self.failed
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        let store = SourceFailure::from_error(&AppError::store("down"), RunPhase::Persisting);
        assert_eq!(store.kind, FailureKind::StoreUnavailable);
        assert_eq!(store.phase, RunPhase::Persisting);

        let timeout = SourceFailure::from_error(
            &AppError::Timeout {
                source_id: "rss".into(),
                elapsed_secs: 120,
            },
            RunPhase::Fetching,
        );
        assert_eq!(timeout.kind, FailureKind::Timeout);

        let source = SourceFailure::from_error(
            &AppError::source_unavailable("reddit", "HTTP 429"),
            RunPhase::Fetching,
        );
        assert_eq!(source.kind, FailureKind::SourceUnavailable);
    }

    #[test]
    fn test_rejected_summary_is_failure() {
        let summary = Summary::rejected("nope", &AppError::config("unknown source 'nope'"));
        assert!(!summary.is_success());
        assert_eq!(summary.seen(), 0);
        assert_eq!(summary.error.unwrap().kind, FailureKind::Config);
    }
}
