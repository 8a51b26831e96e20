//! Per-invocation fetch parameters.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::pipeline::TimeWindow;

/// Everything an adapter needs for one `fetch` call.
///
/// Adapters keep no state between calls; paging state lives in the cursor
/// created inside the call, the clock and window come from here.
#[derive(Debug, Clone)]
pub struct FetchParams {
    /// Reference time of the run
    pub now: DateTime<Utc>,
    /// Dates admitted by recency-filtered adapters
    pub window: TimeWindow,
    /// Default cap for paginated listings
    pub item_cap: usize,
    pub cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl FetchParams {
    /// Params with a two-day window and a cap of 100 items.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            window: TimeWindow::trailing_days(now, 2),
            item_cap: 100,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_item_cap(mut self, cap: usize) -> Self {
        self.item_cap = cap.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wall-clock budget starting now.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    fn timed_out(&self, source_id: &str) -> AppError {
        AppError::Timeout {
            source_id: source_id.to_string(),
            elapsed_secs: self.deadline.map(|(_, budget)| budget.as_secs()).unwrap_or(0),
        }
    }

    /// Fails once the run is cancelled or past its deadline.
    pub fn check(&self, source_id: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(source_id.to_string()));
        }
        if let Some((deadline, _)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.timed_out(source_id));
            }
        }
        Ok(())
    }

    /// Await `fut`, giving up as soon as the run is cancelled or the deadline
    /// passes. An in-flight request is dropped, not waited for.
    pub async fn guard<F, T>(&self, source_id: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.check(source_id)?;

        let expiry = async {
            match self.deadline {
                Some((deadline, _)) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            output = fut => Ok(output),
            _ = self.cancel.cancelled() => Err(AppError::Cancelled(source_id.to_string())),
            _ = expiry => Err(self.timed_out(source_id)),
        }
    }
}
