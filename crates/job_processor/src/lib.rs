//! Pure per-step job processing functions (C5).
//!
//! Each function takes the current `JobState` and returns a new one with
//! an updated `cacheStatus`/`tracStatus`. No I/O is hidden: a step that
//! needs the executor or metadata store takes it as an explicit
//! argument and its errors propagate to the caller.

mod error;
mod steps;

pub use error::{ProcessorError, Retryable};
pub use steps::{
    clean_up_job, fetch_job_result, handle_processing_failed, launch_job, record_job_status,
    save_initial_metadata, save_result_metadata, schedule_launch, schedule_removal,
};
