use std::collections::HashMap;

use job_protocol::{JobDefinition, ObjectId, ResourceBundle, TenantId, WriteRequest};
use metadata_client::Selector;
use serde_json::Value;

use crate::error::LogicError;

/// Resources furnished by the caller rather than loaded from the
/// metadata store (e.g. values supplied directly on `addNewJob`).
pub type DynamicResources = HashMap<String, Value>;

/// The raw executor output a job-type's `process_result` turns into
/// metadata writes.
#[derive(Debug, Clone, Default)]
pub struct RuntimeJobResult {
    pub outputs: Vec<Value>,
    pub diagnostics: Option<String>,
}

/// Per-job-type plug-in. One implementation per member of `JobType`,
/// selected through a closed registry; there is no open extension point.
pub trait JobTypeLogic: Send + Sync {
    /// Dependencies that must be loaded from the metadata store before launch.
    fn required_metadata(&self, job_def: &JobDefinition) -> Result<Vec<Selector>, LogicError>;

    /// Fill in derived fields on the job definition (e.g. a package name
    /// derived from a repository URL) using the loaded dependency bundle
    /// and any caller-supplied dynamic resources.
    fn apply_transform(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
        dynamic_resources: &DynamicResources,
    ) -> Result<JobDefinition, LogicError>;

    /// Synthesize additional metadata that depends on the loaded bundle
    /// rather than being a plain field fill-in.
    fn apply_metadata_transform(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
        dynamic_resources: &DynamicResources,
    ) -> Result<ResourceBundle, LogicError>;

    /// Object types and counts this job type will produce, to drive
    /// result-id preallocation.
    fn expected_outputs(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
    ) -> HashMap<String, usize>;

    /// The subset of an existing id mapping that this job type's outputs
    /// already cover, so a relaunch does not re-preallocate.
    fn prior_result_ids(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
        mapping: &HashMap<String, ObjectId>,
    ) -> HashMap<String, ObjectId> {
        let expected = self.expected_outputs(job_def, bundle);
        mapping
            .iter()
            .filter(|(k, _)| expected.contains_key(k.as_str()))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Object types and counts still needing preallocation, i.e.
    /// `expected_outputs` minus what `prior_result_ids` already covers.
    fn new_result_ids(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
        mapping: &HashMap<String, ObjectId>,
    ) -> Vec<(String, usize)> {
        let expected = self.expected_outputs(job_def, bundle);
        let prior = self.prior_result_ids(job_def, bundle, mapping);
        expected
            .into_iter()
            .filter(|(k, _)| !prior.contains_key(k))
            .collect()
    }

    /// Wire a preallocated (or reused) result-id mapping into the job
    /// definition so `process_result` can read ids back off it.
    fn set_result_ids(
        &self,
        job_def: &JobDefinition,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<JobDefinition, LogicError>;

    /// Transform the executor's raw outputs into metadata writes,
    /// attaching the controlled attributes the platform requires.
    fn process_result(
        &self,
        job_config: &JobDefinition,
        runtime_result: &RuntimeJobResult,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<Vec<WriteRequest>, LogicError>;
}
