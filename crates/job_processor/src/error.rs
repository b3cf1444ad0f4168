use executor_client::ExecutorError;
use job_type_logic::LogicError;
use metadata_client::MetadataError;
use thiserror::Error;

/// How the retry-or-fail wrapper in the manager should treat a
/// processor-step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryable {
    /// Increment `retries`; re-dispatch the same operation later.
    Retryable,
    /// Transition straight to `PROCESSING_FAILED`.
    Fatal,
}

/// The union of everything a processor step can fail with. Every
/// variant maps onto exactly one collaborator's error type except
/// `Internal`, which signals a state invariant violation inside a step
/// itself.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Logic(#[from] LogicError),

    #[error("processor invariant violated: {0}")]
    Internal(String),
}

impl ProcessorError {
    pub fn classify(&self) -> Retryable {
        match self {
            ProcessorError::Executor(ExecutorError::Unavailable(_)) => Retryable::Retryable,
            ProcessorError::Executor(ExecutorError::Fatal(_)) => Retryable::Fatal,
            ProcessorError::Metadata(MetadataError::Unavailable(_)) => Retryable::Retryable,
            ProcessorError::Metadata(MetadataError::Conflict(_)) => Retryable::Fatal,
            ProcessorError::Logic(_) => Retryable::Fatal,
            ProcessorError::Internal(_) => Retryable::Fatal,
        }
    }
}
