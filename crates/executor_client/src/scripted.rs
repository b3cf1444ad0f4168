use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use job_protocol::{JobKey, JobState};
use serde_json::{json, Value};

use crate::error::ExecutorError;
use crate::traits::{ExecutorClient, ExecutorJobInfo, RuntimeJobResult};

#[derive(Default)]
struct JobScript {
    submit_responses: VecDeque<Result<Value, ExecutorError>>,
    poll_responses: VecDeque<ExecutorJobInfo>,
    fetch_responses: VecDeque<Result<RuntimeJobResult, ExecutorError>>,
    cleanup_responses: VecDeque<Result<(), ExecutorError>>,
}

/// A scripted [`ExecutorClient`] test double. Tests queue up per-job
/// responses (including transient failures) and the client replays them
/// in order, falling back to a default "success" outcome once a queue is
/// drained. This is what drives scenarios S1-S6 of §8 without a real
/// batch backend.
#[derive(Default)]
pub struct ScriptedExecutorClient {
    jobs: Mutex<HashMap<JobKey, JobScript>>,
    poll_many_failures: Mutex<VecDeque<ExecutorError>>,
}

impl ScriptedExecutorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a whole-batch failure for the next `poll_many` call, e.g. to
    /// exercise the executor poller's expected-vs-unexpected error
    /// handling (§4.7).
    pub fn script_poll_many_failure(&self, err: ExecutorError) {
        self.poll_many_failures.lock().expect("scripted executor mutex poisoned").push_back(err);
    }

    fn with_job<T>(&self, key: &JobKey, f: impl FnOnce(&mut JobScript) -> T) -> T {
        let mut jobs = self.jobs.lock().expect("scripted executor mutex poisoned");
        let script = jobs.entry(key.clone()).or_default();
        f(script)
    }

    /// Queue the result of the next `submit` call for `key`.
    pub fn script_submit(&self, key: &JobKey, result: Result<Value, ExecutorError>) {
        self.with_job(key, |s| s.submit_responses.push_back(result));
    }

    /// Queue the result of the next `poll_many` observation for `key`.
    pub fn script_poll(&self, key: &JobKey, info: ExecutorJobInfo) {
        self.with_job(key, |s| s.poll_responses.push_back(info));
    }

    /// Queue the result of the next `fetch_result` call for `key`.
    pub fn script_fetch(&self, key: &JobKey, result: Result<RuntimeJobResult, ExecutorError>) {
        self.with_job(key, |s| s.fetch_responses.push_back(result));
    }

    /// Queue the result of the next `clean_up` call for `key`.
    pub fn script_cleanup(&self, key: &JobKey, result: Result<(), ExecutorError>) {
        self.with_job(key, |s| s.cleanup_responses.push_back(result));
    }
}

#[async_trait]
impl ExecutorClient for ScriptedExecutorClient {
    async fn submit(&self, job_key: &JobKey, _job_state: &JobState) -> Result<Value, ExecutorError> {
        self.with_job(job_key, |s| {
            s.submit_responses
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "batch_id": job_key.to_string() })))
        })
    }

    async fn poll_many(
        &self,
        jobs: &[(JobKey, Value)],
    ) -> Result<Vec<ExecutorJobInfo>, ExecutorError> {
        if let Some(err) = self
            .poll_many_failures
            .lock()
            .expect("scripted executor mutex poisoned")
            .pop_front()
        {
            return Err(err);
        }
        let mut out = Vec::with_capacity(jobs.len());
        for (key, _handle) in jobs {
            let info = self.with_job(key, |s| s.poll_responses.pop_front());
            if let Some(info) = info {
                out.push(info);
            }
        }
        Ok(out)
    }

    async fn fetch_result(
        &self,
        job_key: &JobKey,
        _batch_state: &Value,
    ) -> Result<RuntimeJobResult, ExecutorError> {
        self.with_job(job_key, |s| {
            s.fetch_responses
                .pop_front()
                .unwrap_or_else(|| Ok(RuntimeJobResult::default()))
        })
    }

    async fn clean_up(&self, job_key: &JobKey, _batch_state: &Value) -> Result<(), ExecutorError> {
        self.with_job(job_key, |s| s.cleanup_responses.pop_front().unwrap_or(Ok(())))
    }
}
