use thiserror::Error;

/// Executor failure modes (§4.2 "Failures").
#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    /// Transient; retryable by the §4.6 retry-or-fail wrapper.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// Anything else is fatal to the job.
    #[error("executor error: {0}")]
    Fatal(String),
}

impl ExecutorError {
    /// Whether this is an expected transient failure (§4.2 "Failures",
    /// §4.7 executor poll error handling): the executor poller must log
    /// and continue on these without feeding `executor_poll_errors`.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutorError::Unavailable(_))
    }
}
