use async_trait::async_trait;
use job_protocol::{ExecutorStatus, JobKey, JobState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutorError;

/// One job's status as reported by a `pollMany` call (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorJobInfo {
    pub job_key: JobKey,
    pub status: ExecutorStatus,
    pub diagnostics: Option<String>,
}

/// Final artifacts and object definitions pulled back from the executor
/// on job completion (§4.2 `fetchResult`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeJobResult {
    pub outputs: Vec<Value>,
    pub diagnostics: Option<String>,
}

/// Abstract handle to the external batch system (§4.2, C2).
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// Idempotent by `jobKey`: submitting the same key twice returns the
    /// same batch handle rather than creating a second run.
    async fn submit(&self, job_key: &JobKey, job_state: &JobState) -> Result<Value, ExecutorError>;

    /// Positional poll: the result at index *i* corresponds to the job at
    /// index *i* of `jobs`.
    async fn poll_many(
        &self,
        jobs: &[(JobKey, Value)],
    ) -> Result<Vec<ExecutorJobInfo>, ExecutorError>;

    async fn fetch_result(
        &self,
        job_key: &JobKey,
        batch_state: &Value,
    ) -> Result<RuntimeJobResult, ExecutorError>;

    /// Best-effort release of batch resources; failures here should not
    /// block the job's cache-side cleanup from completing.
    async fn clean_up(&self, job_key: &JobKey, batch_state: &Value) -> Result<(), ExecutorError>;
}
