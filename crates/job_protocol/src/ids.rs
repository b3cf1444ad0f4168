use std::fmt;

use serde::{Deserialize, Serialize};

/// Object identifier assigned by the metadata store (C3) for a saved object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ObjectId(uuid::Uuid);

impl ObjectId {
    pub fn new(value: uuid::Uuid) -> Self {
        Self(value)
    }

    pub fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for ObjectId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value)
    }
}

/// Stable identity of a job once its initial metadata object has been
/// saved, derived from `(jobId, version)` (§3, §4.9 "Job-key" glossary entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Derive a job-key from the preallocated object id and its initial version.
    pub fn derive(job_id: ObjectId, version: u32) -> Self {
        Self(format!("{job_id}-v{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tenant identifier. Opaque to the core beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The object identifier the metadata store returns for the saved job
/// definition object. Distinct from [`ObjectId`] only in name, to keep
/// call sites self-documenting the way the spec distinguishes `jobId`
/// from resource object ids.
pub type JobId = ObjectId;
