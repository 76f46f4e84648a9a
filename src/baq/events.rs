use std::path::PathBuf;

/// Diagnostic emitted on every non-fatal path of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    PlanStarted {
        plan: usize,
        total: usize,
    },
    /// Connection failure, timeout or unreadable body.
    RequestFailed {
        plan: usize,
        error: String,
    },
    StatusError {
        plan: usize,
        status: u16,
        body: String,
    },
    Retrying {
        plan: usize,
        method: String,
    },
    RetryFailed {
        plan: usize,
        error: String,
    },
    NoRows {
        plan: usize,
    },
    /// A list filter column was missing from every returned row.
    FilterKeyAbsent {
        plan: usize,
        key: String,
    },
    MissingValues {
        key: String,
        count: usize,
    },
    ReportWritten {
        path: PathBuf,
        rows: usize,
        unique_values: usize,
    },
    ReportFailed {
        path: PathBuf,
        error: String,
    },
}

/// Receives query diagnostics.
pub trait QueryObserver: Send + Sync {
    fn on_event(&self, event: &QueryEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn on_event(&self, event: &QueryEvent) {
        match event {
            QueryEvent::PlanStarted { plan, total } => {
                tracing::debug!(plan, total, "issuing BAQ request");
            }
            QueryEvent::RequestFailed { plan, error } => {
                tracing::warn!(plan, %error, "request error, plan yields no rows");
            }
            QueryEvent::StatusError { plan, status, body } => {
                tracing::warn!(plan, status, %body, "HTTP error status");
            }
            QueryEvent::Retrying { plan, method } => {
                tracing::info!(plan, %method, "retrying with alternate method");
            }
            QueryEvent::RetryFailed { plan, error } => {
                tracing::warn!(plan, %error, "retry failed, plan yields no rows");
            }
            QueryEvent::NoRows { plan } => {
                tracing::debug!(plan, "no data found for the given filters");
            }
            QueryEvent::FilterKeyAbsent { plan, key } => {
                tracing::warn!(plan, %key, "filter key not found in response columns");
            }
            QueryEvent::MissingValues { key, count } => {
                tracing::info!(%key, count, "requested values not returned");
            }
            QueryEvent::ReportWritten {
                path,
                rows,
                unique_values,
            } => {
                tracing::info!(
                    path = %path.display(),
                    rows,
                    unique_values,
                    "missing-value report written"
                );
            }
            QueryEvent::ReportFailed { path, error } => {
                tracing::error!(
                    path = %path.display(),
                    %error,
                    "failed to write missing-value report"
                );
            }
        }
    }
}
