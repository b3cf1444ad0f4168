use std::collections::HashMap;

use chrono::{DateTime, Utc};
use executor_client::{ExecutorClient, ExecutorJobInfo};
use job_protocol::{CacheStatus, JobKey, JobState, TracStatus, WriteRequest};
use job_type_logic::{DynamicResources, JobTypeRegistry, RuntimeJobResult};
use metadata_client::MetadataClient;
use serde_json::json;
use tracing::instrument;

use crate::error::ProcessorError;

/// Preallocates the job's own metadata object and derives `jobId`/`jobKey`.
#[instrument(skip(state, metadata), fields(tenant = %state.tenant))]
pub async fn save_initial_metadata(
    mut state: JobState,
    metadata: &dyn MetadataClient,
    now: DateTime<Utc>,
) -> Result<JobState, ProcessorError> {
    let ids = metadata
        .preallocate_ids(&state.tenant, &[("job".to_string(), 1)])
        .await?;
    let preallocated = *ids
        .first()
        .ok_or_else(|| ProcessorError::Internal("metadata store preallocated zero ids".into()))?;
    let header = metadata
        .save_initial_metadata(&state.tenant, &state.definition, preallocated)
        .await?;

    state.job_id = Some(header.object_id);
    state.job_key = Some(JobKey::derive(header.object_id, header.version));
    state.transition(CacheStatus::QueuedInTrac, TracStatus::Queued, now);
    Ok(state)
}

/// Marks a job as admitted. Admission accounting itself (comparing
/// running-set size against `maxConcurrentJobs`) is the manager's job;
/// by the time this runs the slot has already been granted.
#[instrument(skip(state), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub fn schedule_launch(mut state: JobState, now: DateTime<Utc>) -> JobState {
    state.transition(CacheStatus::LaunchScheduled, TracStatus::Preparing, now);
    state
}

/// Loads dependencies, runs the job-type transforms, preallocates result
/// ids, and submits the job to the executor.
#[instrument(skip(state, registry, metadata, executor), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub async fn launch_job(
    mut state: JobState,
    registry: &JobTypeRegistry,
    metadata: &dyn MetadataClient,
    executor: &dyn ExecutorClient,
    now: DateTime<Utc>,
) -> Result<JobState, ProcessorError> {
    let job_key = state
        .job_key
        .clone()
        .ok_or_else(|| ProcessorError::Internal("launchJob called before a job key was assigned".into()))?;
    let logic = registry.resolve(state.job_type)?;

    let selectors = logic.required_metadata(&state.definition)?;
    let loaded = metadata.load_objects(&state.tenant, &selectors).await?;
    let mut bundle = state.resources.clone();
    for (selector, value) in loaded {
        if let Some(object_id) = selector.object_id {
            state.resource_mapping.insert(selector.key.clone(), object_id);
        }
        bundle.insert(selector.key, value);
    }

    let dynamic_resources: DynamicResources = HashMap::new();
    let transformed_def = logic.apply_transform(&state.definition, &bundle, &dynamic_resources)?;
    let metadata_bundle =
        logic.apply_metadata_transform(&transformed_def, &bundle, &dynamic_resources)?;

    let new_ids = logic.new_result_ids(&transformed_def, &metadata_bundle, &state.result_mapping);
    if !new_ids.is_empty() {
        let allocated = metadata.preallocate_ids(&state.tenant, &new_ids).await?;
        let mut cursor = 0usize;
        for (object_type, count) in &new_ids {
            if *count > 0 {
                state
                    .result_mapping
                    .insert(object_type.clone(), allocated[cursor]);
            }
            cursor += count;
        }
    }

    state.definition = logic.set_result_ids(&transformed_def, &state.result_mapping)?;
    state.resources = metadata_bundle;

    let batch_state = executor.submit(&job_key, &state).await?;
    state.batch_state = Some(batch_state);
    state.transition(CacheStatus::SentToExecutor, TracStatus::Submitted, now);
    Ok(state)
}

/// Folds one `pollMany` observation into the job's status.
#[instrument(skip(state, info), fields(job_key = state.job_key.as_ref().map(JobKey::as_str), executor_status = %info.status))]
pub fn record_job_status(mut state: JobState, info: &ExecutorJobInfo, now: DateTime<Utc>) -> JobState {
    state.batch_status = Some(info.status);
    state.status_message = info.diagnostics.clone();

    let trac_status = match info.status {
        job_protocol::ExecutorStatus::Pending | job_protocol::ExecutorStatus::Queued => {
            TracStatus::Submitted
        }
        job_protocol::ExecutorStatus::Running => TracStatus::Running,
        job_protocol::ExecutorStatus::Succeeded | job_protocol::ExecutorStatus::Complete => {
            TracStatus::Finishing
        }
        job_protocol::ExecutorStatus::Failed | job_protocol::ExecutorStatus::Lost => {
            TracStatus::Failed
        }
    };
    state.transition(info.status.next_cache_status(), trac_status, now);
    state
}

/// Pulls the final result and validates its shape against the job
/// type's declared outputs. Validation failure is an expected outcome
/// (`RESULTS_INVALID`), not a propagated error.
#[instrument(skip(state, registry, executor), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub async fn fetch_job_result(
    mut state: JobState,
    registry: &JobTypeRegistry,
    executor: &dyn ExecutorClient,
    now: DateTime<Utc>,
) -> Result<(JobState, Option<RuntimeJobResult>), ProcessorError> {
    let job_key = state
        .job_key
        .clone()
        .ok_or_else(|| ProcessorError::Internal("fetchJobResult called before a job key was assigned".into()))?;
    let batch_state = state
        .batch_state
        .clone()
        .ok_or_else(|| ProcessorError::Internal("fetchJobResult called without a batch state".into()))?;
    let logic = registry.resolve(state.job_type)?;

    let raw = executor.fetch_result(&job_key, &batch_state).await?;
    let result = RuntimeJobResult {
        outputs: raw.outputs,
        diagnostics: raw.diagnostics,
    };

    let expected_total: usize = logic
        .expected_outputs(&state.definition, &state.resources)
        .values()
        .sum();
    if result.outputs.len() < expected_total {
        state.status_message = Some(format!(
            "expected {expected_total} result object(s), executor returned {}",
            result.outputs.len()
        ));
        state.transition(CacheStatus::ResultsInvalid, TracStatus::Failed, now);
        return Ok((state, None));
    }

    state.transition(CacheStatus::ResultsReceived, TracStatus::Finishing, now);
    Ok((state, Some(result)))
}

/// Turns a fetched result into metadata writes (receive path) or
/// persists a failure record (executor-failed / invalid-results path).
#[instrument(skip(state, registry, metadata, runtime_result), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub async fn save_result_metadata(
    mut state: JobState,
    registry: &JobTypeRegistry,
    metadata: &dyn MetadataClient,
    runtime_result: Option<RuntimeJobResult>,
    now: DateTime<Utc>,
) -> Result<JobState, ProcessorError> {
    let is_failure_path = matches!(
        state.cache_status,
        CacheStatus::ExecutorFailed | CacheStatus::ResultsInvalid
    );

    if is_failure_path {
        let message = state
            .status_message
            .clone()
            .unwrap_or_else(|| "job failed".to_string());
        let write = WriteRequest {
            object_type: "job_failure".to_string(),
            preallocated_id: None,
            definition: json!({ "message": message }),
            controlled_attrs: HashMap::new(),
        };
        metadata.save_result_metadata(&state.tenant, &[write]).await?;
        state.transition(CacheStatus::ResultsSaved, TracStatus::Failed, now);
        return Ok(state);
    }

    let result = runtime_result.ok_or_else(|| {
        ProcessorError::Internal("saveResultMetadata on the receive path requires a runtime result".into())
    })?;
    let logic = registry.resolve(state.job_type)?;
    let writes = logic.process_result(&state.definition, &result, &state.result_mapping)?;
    let headers = metadata.save_result_metadata(&state.tenant, &writes).await?;
    for header in headers {
        state.result_mapping.insert(header.object_type, header.object_id);
    }
    state.transition(CacheStatus::ResultsSaved, TracStatus::Succeeded, now);
    Ok(state)
}

/// Best-effort release of batch resources; failures are swallowed so
/// they never block the job's own removal from the cache.
#[instrument(skip(state, executor), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub async fn clean_up_job(mut state: JobState, executor: &dyn ExecutorClient, now: DateTime<Utc>) -> JobState {
    if let (Some(job_key), Some(batch_state)) = (state.job_key.clone(), state.batch_state.clone()) {
        if let Err(err) = executor.clean_up(&job_key, &batch_state).await {
            tracing::warn!(%err, "executor clean_up failed, proceeding anyway");
        }
    }
    state.batch_state = None;
    let trac_status = state.trac_status;
    state.transition(CacheStatus::ReadyToRemove, trac_status, now);
    state
}

/// Marks a job for delayed removal from the cache.
pub fn schedule_removal(mut state: JobState, delay: chrono::Duration, now: DateTime<Utc>) -> JobState {
    state.removal_deadline = Some(now + delay);
    let trac_status = state.trac_status;
    state.transition(CacheStatus::ScheduledToRemove, trac_status, now);
    state
}

/// Terminal path: persists a failure record and marks the job done.
#[instrument(skip(state, metadata, error), fields(job_key = state.job_key.as_ref().map(JobKey::as_str)))]
pub async fn handle_processing_failed(
    mut state: JobState,
    metadata: &dyn MetadataClient,
    message: impl Into<String>,
    error: Option<&ProcessorError>,
    now: DateTime<Utc>,
) -> Result<JobState, ProcessorError> {
    let message = message.into();
    state.status_message = Some(message.clone());
    state.error = error.map(ToString::to_string);

    let write = WriteRequest {
        object_type: "job_failure".to_string(),
        preallocated_id: None,
        definition: json!({ "message": message }),
        controlled_attrs: HashMap::new(),
    };
    metadata.save_result_metadata(&state.tenant, &[write]).await?;
    state.transition(CacheStatus::ResultsSaved, TracStatus::Failed, now);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use executor_client::ScriptedExecutorClient;
    use job_protocol::{ExecutorStatus, JobType, TenantId};
    use metadata_client::InMemoryMetadataClient;
    use serde_json::json;

    fn seed(job_type: JobType, definition: serde_json::Value) -> JobState {
        JobState::seed(
            TenantId::from("acme"),
            "alice",
            "token-abc",
            job_type,
            definition,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_initial_metadata_assigns_job_key() {
        let metadata = InMemoryMetadataClient::new();
        let state = seed(JobType::ImportModel, json!({}));
        let state = save_initial_metadata(state, &metadata, Utc::now()).await.unwrap();
        assert!(state.job_key.is_some());
        assert_eq!(state.cache_status, CacheStatus::QueuedInTrac);
    }

    #[tokio::test]
    async fn full_import_model_happy_path() {
        let metadata = InMemoryMetadataClient::new();
        let executor = ScriptedExecutorClient::new();
        let registry = JobTypeRegistry::new();

        let state = seed(JobType::ImportModel, json!({}));
        let state = save_initial_metadata(state, &metadata, Utc::now()).await.unwrap();
        let state = schedule_launch(state, Utc::now());
        assert_eq!(state.cache_status, CacheStatus::LaunchScheduled);

        let state = launch_job(state, &registry, &metadata, &executor, Utc::now())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::SentToExecutor);
        assert!(state.batch_state.is_some());
        assert!(state.result_mapping.contains_key("model"));

        let info = ExecutorJobInfo {
            job_key: state.job_key.clone().unwrap(),
            status: ExecutorStatus::Succeeded,
            diagnostics: None,
        };
        let state = record_job_status(state, &info, Utc::now());
        assert_eq!(state.cache_status, CacheStatus::ExecutorSucceeded);

        executor.script_fetch(
            state.job_key.as_ref().unwrap(),
            Ok(executor_client::RuntimeJobResult {
                outputs: vec![json!({ "weights": "s3://bucket/model.bin" })],
                diagnostics: None,
            }),
        );
        let (state, runtime_result) = fetch_job_result(state, &registry, &executor, Utc::now())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsReceived);
        assert!(runtime_result.is_some());

        let state = save_result_metadata(state, &registry, &metadata, runtime_result, Utc::now())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsSaved);
        assert_eq!(state.trac_status, TracStatus::Succeeded);

        let state = clean_up_job(state, &executor, Utc::now()).await;
        assert_eq!(state.cache_status, CacheStatus::ReadyToRemove);
        assert!(state.batch_state.is_none());

        let state = schedule_removal(state, chrono::Duration::seconds(120), Utc::now());
        assert_eq!(state.cache_status, CacheStatus::ScheduledToRemove);
        assert!(state.removal_deadline.is_some());
    }

    #[tokio::test]
    async fn launch_job_populates_resource_mapping_from_resolved_selectors() {
        let metadata = InMemoryMetadataClient::new();
        let executor = ScriptedExecutorClient::new();
        let registry = JobTypeRegistry::new();

        // Seed a "model" object so RUN_MODEL's `model_id` selector
        // resolves to something `load_objects` can actually find.
        let model_ids = metadata
            .preallocate_ids(&TenantId::from("acme"), &[("model".to_string(), 1)])
            .await
            .unwrap();
        metadata
            .save_initial_metadata(
                &TenantId::from("acme"),
                &json!({ "name": "resnet" }),
                model_ids[0],
            )
            .await
            .unwrap();

        let state = seed(
            JobType::RunModel,
            json!({ "model_id": model_ids[0].to_string() }),
        );
        let state = save_initial_metadata(state, &metadata, Utc::now()).await.unwrap();
        let state = schedule_launch(state, Utc::now());
        let state = launch_job(state, &registry, &metadata, &executor, Utc::now())
            .await
            .unwrap();

        assert_eq!(state.resource_mapping.get("model"), Some(&model_ids[0]));
    }

    #[tokio::test]
    async fn fetch_job_result_flags_short_output_as_invalid() {
        let metadata = InMemoryMetadataClient::new();
        let executor = ScriptedExecutorClient::new();
        let registry = JobTypeRegistry::new();

        let state = seed(JobType::ImportModel, json!({}));
        let state = save_initial_metadata(state, &metadata, Utc::now()).await.unwrap();
        let state = schedule_launch(state, Utc::now());
        let state = launch_job(state, &registry, &metadata, &executor, Utc::now())
            .await
            .unwrap();

        executor.script_fetch(
            state.job_key.as_ref().unwrap(),
            Ok(executor_client::RuntimeJobResult {
                outputs: vec![],
                diagnostics: None,
            }),
        );
        let (state, runtime_result) = fetch_job_result(state, &registry, &executor, Utc::now())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsInvalid);
        assert!(runtime_result.is_none());

        let state = save_result_metadata(state, &registry, &metadata, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsSaved);
        assert_eq!(state.trac_status, TracStatus::Failed);
    }

    #[tokio::test]
    async fn handle_processing_failed_persists_failure_and_marks_done() {
        let metadata = InMemoryMetadataClient::new();
        let state = seed(JobType::RunModel, json!({ "model_id": "not-a-uuid" }));
        let state = save_initial_metadata(state, &metadata, Utc::now()).await.unwrap();
        let state = handle_processing_failed(
            state,
            &metadata,
            "validation failed",
            None,
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsSaved);
        assert_eq!(state.trac_status, TracStatus::Failed);
        assert_eq!(state.status_message.as_deref(), Some("validation failed"));
    }
}
