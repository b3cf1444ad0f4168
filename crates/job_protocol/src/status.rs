use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Client-visible job status (§3). Distinct from [`CacheStatus`], which is
/// the internal state-machine label the manager drives off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TracStatus {
    #[default]
    Queued,
    Preparing,
    Validated,
    Pending,
    Submitted,
    Running,
    Finishing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TracStatus {
    pub const ALL: &'static [TracStatus] = &[
        TracStatus::Queued,
        TracStatus::Preparing,
        TracStatus::Validated,
        TracStatus::Pending,
        TracStatus::Submitted,
        TracStatus::Running,
        TracStatus::Finishing,
        TracStatus::Succeeded,
        TracStatus::Failed,
        TracStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TracStatus::Queued => "QUEUED",
            TracStatus::Preparing => "PREPARING",
            TracStatus::Validated => "VALIDATED",
            TracStatus::Pending => "PENDING",
            TracStatus::Submitted => "SUBMITTED",
            TracStatus::Running => "RUNNING",
            TracStatus::Finishing => "FINISHING",
            TracStatus::Succeeded => "SUCCEEDED",
            TracStatus::Failed => "FAILED",
            TracStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TracStatus::Succeeded | TracStatus::Failed | TracStatus::Cancelled
        )
    }
}

impl fmt::Display for TracStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TracStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Ok(TracStatus::Queued),
            "PREPARING" => Ok(TracStatus::Preparing),
            "VALIDATED" => Ok(TracStatus::Validated),
            "PENDING" => Ok(TracStatus::Pending),
            "SUBMITTED" => Ok(TracStatus::Submitted),
            "RUNNING" => Ok(TracStatus::Running),
            "FINISHING" => Ok(TracStatus::Finishing),
            "SUCCEEDED" => Ok(TracStatus::Succeeded),
            "FAILED" => Ok(TracStatus::Failed),
            "CANCELLED" => Ok(TracStatus::Cancelled),
            other => Err(format!("invalid trac status: '{other}'")),
        }
    }
}

/// Internal state-machine label (§4.6). Determines the single next legal
/// operation the manager may dispatch for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    #[default]
    QueuedInTrac,
    LaunchScheduled,
    SentToExecutor,
    QueuedInExecutor,
    RunningInExecutor,
    ExecutorComplete,
    ExecutorSucceeded,
    ExecutorFailed,
    ResultsReceived,
    ResultsInvalid,
    ResultsSaved,
    ReadyToRemove,
    ScheduledToRemove,
    ProcessingFailed,
}

impl CacheStatus {
    pub const ALL: &'static [CacheStatus] = &[
        CacheStatus::QueuedInTrac,
        CacheStatus::LaunchScheduled,
        CacheStatus::SentToExecutor,
        CacheStatus::QueuedInExecutor,
        CacheStatus::RunningInExecutor,
        CacheStatus::ExecutorComplete,
        CacheStatus::ExecutorSucceeded,
        CacheStatus::ExecutorFailed,
        CacheStatus::ResultsReceived,
        CacheStatus::ResultsInvalid,
        CacheStatus::ResultsSaved,
        CacheStatus::ReadyToRemove,
        CacheStatus::ScheduledToRemove,
        CacheStatus::ProcessingFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::QueuedInTrac => "QUEUED_IN_TRAC",
            CacheStatus::LaunchScheduled => "LAUNCH_SCHEDULED",
            CacheStatus::SentToExecutor => "SENT_TO_EXECUTOR",
            CacheStatus::QueuedInExecutor => "QUEUED_IN_EXECUTOR",
            CacheStatus::RunningInExecutor => "RUNNING_IN_EXECUTOR",
            CacheStatus::ExecutorComplete => "EXECUTOR_COMPLETE",
            CacheStatus::ExecutorSucceeded => "EXECUTOR_SUCCEEDED",
            CacheStatus::ExecutorFailed => "EXECUTOR_FAILED",
            CacheStatus::ResultsReceived => "RESULTS_RECEIVED",
            CacheStatus::ResultsInvalid => "RESULTS_INVALID",
            CacheStatus::ResultsSaved => "RESULTS_SAVED",
            CacheStatus::ReadyToRemove => "READY_TO_REMOVE",
            CacheStatus::ScheduledToRemove => "SCHEDULED_TO_REMOVE",
            CacheStatus::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    /// "Running set" (glossary): jobs whose cache status indicates executor
    /// possession, counted against `max_concurrent_jobs` per §9 open
    /// question 2 (`LAUNCH_SCHEDULED` counts, admission is pessimistic).
    pub fn is_running_set(&self) -> bool {
        matches!(
            self,
            CacheStatus::LaunchScheduled
                | CacheStatus::SentToExecutor
                | CacheStatus::QueuedInExecutor
                | CacheStatus::RunningInExecutor
        )
    }

    /// "Update set" (glossary): jobs with a pending cache-initiated
    /// operation, per the §4.6 dispatch table (excludes the
    /// executor-driven running set and the delayed `SCHEDULED_TO_REMOVE`
    /// state, which is handled by a timer rather than a poll pass).
    pub fn is_update_set(&self) -> bool {
        matches!(
            self,
            CacheStatus::QueuedInTrac
                | CacheStatus::LaunchScheduled
                | CacheStatus::ExecutorComplete
                | CacheStatus::ExecutorSucceeded
                | CacheStatus::ExecutorFailed
                | CacheStatus::ResultsReceived
                | CacheStatus::ResultsInvalid
                | CacheStatus::ResultsSaved
                | CacheStatus::ReadyToRemove
                | CacheStatus::ProcessingFailed
        )
    }

    /// Once a job reaches one of these, only the cleanup/removal tail of
    /// the state machine may run (§3 invariants).
    pub fn is_terminal_outcome(&self) -> bool {
        matches!(
            self,
            CacheStatus::ExecutorFailed
                | CacheStatus::ResultsInvalid
                | CacheStatus::ProcessingFailed
        )
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QUEUED_IN_TRAC" => Ok(CacheStatus::QueuedInTrac),
            "LAUNCH_SCHEDULED" => Ok(CacheStatus::LaunchScheduled),
            "SENT_TO_EXECUTOR" => Ok(CacheStatus::SentToExecutor),
            "QUEUED_IN_EXECUTOR" => Ok(CacheStatus::QueuedInExecutor),
            "RUNNING_IN_EXECUTOR" => Ok(CacheStatus::RunningInExecutor),
            "EXECUTOR_COMPLETE" => Ok(CacheStatus::ExecutorComplete),
            "EXECUTOR_SUCCEEDED" => Ok(CacheStatus::ExecutorSucceeded),
            "EXECUTOR_FAILED" => Ok(CacheStatus::ExecutorFailed),
            "RESULTS_RECEIVED" => Ok(CacheStatus::ResultsReceived),
            "RESULTS_INVALID" => Ok(CacheStatus::ResultsInvalid),
            "RESULTS_SAVED" => Ok(CacheStatus::ResultsSaved),
            "READY_TO_REMOVE" => Ok(CacheStatus::ReadyToRemove),
            "SCHEDULED_TO_REMOVE" => Ok(CacheStatus::ScheduledToRemove),
            "PROCESSING_FAILED" => Ok(CacheStatus::ProcessingFailed),
            other => Err(format!("invalid cache status: '{other}'")),
        }
    }
}

/// Last known status reported by the executor for a submitted job (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorStatus {
    Pending,
    Queued,
    Running,
    Complete,
    Succeeded,
    Failed,
    Lost,
}

impl ExecutorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorStatus::Pending => "PENDING",
            ExecutorStatus::Queued => "QUEUED",
            ExecutorStatus::Running => "RUNNING",
            ExecutorStatus::Complete => "COMPLETE",
            ExecutorStatus::Succeeded => "SUCCEEDED",
            ExecutorStatus::Failed => "FAILED",
            ExecutorStatus::Lost => "LOST",
        }
    }

    /// Maps a poll result onto the next `cacheStatus`, per the §4.5
    /// `recordJobStatus` fold table. `LOST` folds to the same target as
    /// `FAILED` (§4.7: "Executor lost" is treated as failed, no retry).
    pub fn next_cache_status(&self) -> CacheStatus {
        match self {
            ExecutorStatus::Pending => CacheStatus::SentToExecutor,
            ExecutorStatus::Queued => CacheStatus::QueuedInExecutor,
            ExecutorStatus::Running => CacheStatus::RunningInExecutor,
            ExecutorStatus::Succeeded => CacheStatus::ExecutorSucceeded,
            ExecutorStatus::Complete => CacheStatus::ExecutorComplete,
            ExecutorStatus::Failed | ExecutorStatus::Lost => CacheStatus::ExecutorFailed,
        }
    }
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
