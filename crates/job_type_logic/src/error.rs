use thiserror::Error;

/// Failure raised by a job-type plug-in or by dispatch to one. Always
/// fatal to the job; the manager maps this straight onto
/// `ErrorKind::ValidationGap`.
#[derive(Debug, Error, Clone)]
pub enum LogicError {
    #[error("job definition invalid for this job type: {0}")]
    InvalidDefinition(String),

    #[error("no job-type logic registered for '{0}'")]
    UnknownJobType(String),
}
