use std::fmt;

use thiserror::Error;

/// The error-kind taxonomy of §7, shared across crate boundaries so the
/// manager can classify any component's failure without downcasting
/// concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CacheUnavailable,
    ExecutorUnavailable,
    MetadataConflict,
    ValidationGap,
    JobFailure,
    ProcessingFailed,
    Internal,
}

impl ErrorKind {
    /// §4.6 retry-or-fail wrapper: transient kinds are retryable, all
    /// others are fatal to the current operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::CacheUnavailable | ErrorKind::ExecutorUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::CacheUnavailable => "CacheUnavailable",
            ErrorKind::ExecutorUnavailable => "ExecutorUnavailable",
            ErrorKind::MetadataConflict => "MetadataConflict",
            ErrorKind::ValidationGap => "ValidationGap",
            ErrorKind::JobFailure => "JobFailure",
            ErrorKind::ProcessingFailed => "ProcessingFailed",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{s}")
    }
}

/// A job-level failure carrying both the human message persisted to
/// `statusMessage` and the machine-readable kind (§7: "every non-crash
/// ends with a FAILED job record ... containing statusMessage and a
/// machine-readable cacheStatus").
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
