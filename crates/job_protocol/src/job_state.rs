use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, JobKey, ObjectId, TenantId};
use crate::status::{CacheStatus, ExecutorStatus, TracStatus};

/// Closed tagged variant over supported job types (§3, §4.4). New job
/// types are added here and in the `job_type_logic` registry together,
/// never by an open class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    ImportModel,
    RunModel,
    RunFlow,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImportModel => "IMPORT_MODEL",
            JobType::RunModel => "RUN_MODEL",
            JobType::RunFlow => "RUN_FLOW",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IMPORT_MODEL" => Ok(JobType::ImportModel),
            "RUN_MODEL" => Ok(JobType::RunModel),
            "RUN_FLOW" => Ok(JobType::RunFlow),
            other => Err(format!("unknown job type: '{other}'")),
        }
    }
}

/// The tenant-supplied job definition. Kept opaque (structured JSON) at
/// this layer; `job_type_logic` implementations interpret it (§3, §4.4).
pub type JobDefinition = serde_json::Value;

/// A loaded dependency object, keyed by the selector that requested it
/// (§4.4 `requiredMetadata`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub objects: HashMap<String, serde_json::Value>,
}

impl ResourceBundle {
    pub fn get(&self, selector: &str) -> Option<&serde_json::Value> {
        self.objects.get(selector)
    }

    pub fn insert(&mut self, selector: impl Into<String>, value: serde_json::Value) {
        self.objects.insert(selector.into(), value);
    }
}

/// A metadata write produced by `JobTypeLogic::process_result` (§4.4, §4.5
/// `saveResultMetadata`), applied transactionally by the metadata client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub object_type: String,
    pub preallocated_id: Option<ObjectId>,
    pub definition: serde_json::Value,
    pub controlled_attrs: HashMap<String, serde_json::Value>,
}

/// The single value type stored in the job cache (§3). Every C5
/// processor function is a pure `JobState -> JobState` transform; every
/// C6 dispatch commits a new `JobState` back through a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_key: Option<JobKey>,
    pub job_id: Option<JobId>,
    pub tenant: TenantId,
    pub owner: String,
    pub owner_token: String,
    pub job_type: JobType,
    pub definition: JobDefinition,
    pub resources: ResourceBundle,
    pub resource_mapping: HashMap<String, ObjectId>,
    pub result_mapping: HashMap<String, ObjectId>,
    pub trac_status: TracStatus,
    pub cache_status: CacheStatus,
    pub batch_state: Option<serde_json::Value>,
    pub batch_status: Option<ExecutorStatus>,
    pub status_message: Option<String>,
    pub error: Option<String>,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wall-clock deadline after which a `SCHEDULED_TO_REMOVE` job is
    /// eligible for `removeFromCache` (§3 invariant, §4.5 `scheduleRemoval`).
    pub removal_deadline: Option<DateTime<Utc>>,
}

impl JobState {
    /// Construct the seed state for `addNewJob` (§6), before any metadata
    /// has been saved. `job_key`/`job_id` are filled in by
    /// `saveInitialMetadata` (§4.5).
    pub fn seed(
        tenant: TenantId,
        owner: impl Into<String>,
        owner_token: impl Into<String>,
        job_type: JobType,
        definition: JobDefinition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_key: None,
            job_id: None,
            tenant,
            owner: owner.into(),
            owner_token: owner_token.into(),
            job_type,
            definition,
            resources: ResourceBundle::default(),
            resource_mapping: HashMap::new(),
            result_mapping: HashMap::new(),
            trac_status: TracStatus::Queued,
            cache_status: CacheStatus::QueuedInTrac,
            batch_state: None,
            batch_status: None,
            status_message: None,
            error: None,
            retries: 0,
            created_at: now,
            updated_at: now,
            removal_deadline: None,
        }
    }

    /// §3 invariant: `batchState != null` implies the status is one of the
    /// executor-possession statuses.
    pub fn batch_state_invariant_holds(&self) -> bool {
        if self.batch_state.is_none() {
            return true;
        }
        matches!(
            self.cache_status,
            CacheStatus::SentToExecutor
                | CacheStatus::QueuedInExecutor
                | CacheStatus::RunningInExecutor
                | CacheStatus::ExecutorComplete
                | CacheStatus::ExecutorSucceeded
                | CacheStatus::ExecutorFailed
        )
    }

    pub fn transition(&mut self, cache_status: CacheStatus, trac_status: TracStatus, now: DateTime<Utc>) {
        self.cache_status = cache_status;
        self.trac_status = trac_status;
        self.updated_at = now;
    }
}
