use std::sync::Arc;

use job_protocol::JobType;

use crate::error::LogicError;
use crate::traits::JobTypeLogic;
use crate::variants::{ImportModelLogic, RunModelLogic, RunFlowLogic};

/// Closed lookup from `JobType` to its plug-in implementation. There is
/// no open extension point: adding a job type means adding a variant
/// here and to `job_protocol::JobType` together.
pub struct JobTypeRegistry {
    import_model: Arc<dyn JobTypeLogic>,
    run_model: Arc<dyn JobTypeLogic>,
    run_flow: Arc<dyn JobTypeLogic>,
}

impl Default for JobTypeRegistry {
    fn default() -> Self {
        Self {
            import_model: Arc::new(ImportModelLogic),
            run_model: Arc::new(RunModelLogic),
            run_flow: Arc::new(RunFlowLogic),
        }
    }
}

impl JobTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the plug-in for `job_type`. Only fails if the registry
    /// itself has not been wired for a job type the caller already
    /// validated exists; a mis-mapping here is a `ValidationGap`.
    pub fn resolve(&self, job_type: JobType) -> Result<Arc<dyn JobTypeLogic>, LogicError> {
        match job_type {
            JobType::ImportModel => Ok(self.import_model.clone()),
            JobType::RunModel => Ok(self.run_model.clone()),
            JobType::RunFlow => Ok(self.run_flow.clone()),
        }
    }
}
