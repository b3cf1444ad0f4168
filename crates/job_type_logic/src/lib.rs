//! Per-job-type plug-in logic (C4): the one seam in the core where
//! product knowledge about a specific job type lives. Everything else
//! in the workspace treats a job definition as opaque JSON.

mod error;
mod registry;
mod traits;
mod variants;

pub use error::LogicError;
pub use registry::JobTypeRegistry;
pub use traits::{DynamicResources, JobTypeLogic, RuntimeJobResult};
pub use variants::{ImportModelLogic, RunFlowLogic, RunModelLogic};
