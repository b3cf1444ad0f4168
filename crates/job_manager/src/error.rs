use job_cache::CacheError;
use job_processor::ProcessorError;
use thiserror::Error;

/// Failure modes the manager itself can surface to a caller of
/// `add_new_job`/`query_job` (§6, §7: "`addNewJob` is the only call
/// where errors are surfaced synchronously to the submitter").
#[derive(Debug, Error)]
pub enum JobManagerError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("job already exists for key '{0}'")]
    DuplicateJob(String),

    #[error("manager invariant violated: {0}")]
    Internal(String),
}
