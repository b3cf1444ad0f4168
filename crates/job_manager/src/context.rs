use std::sync::Arc;

use executor_client::ExecutorClient;
use job_cache::JobCache;
use job_type_logic::JobTypeRegistry;
use metadata_client::MetadataClient;

use crate::config::ManagerConfig;
use crate::metrics::Metrics;

/// Shared handles to every collaborator the manager dispatches against,
/// plus its own configuration and metrics. Cloning is cheap (everything
/// is behind an `Arc`); this is what each worker task and both pollers
/// hold a copy of.
#[derive(Clone)]
pub struct ManagerContext {
    pub cache: Arc<dyn JobCache>,
    pub executor: Arc<dyn ExecutorClient>,
    pub metadata: Arc<dyn MetadataClient>,
    pub registry: Arc<JobTypeRegistry>,
    pub config: ManagerConfig,
    pub metrics: Arc<Metrics>,
}

impl ManagerContext {
    pub fn new(
        cache: Arc<dyn JobCache>,
        executor: Arc<dyn ExecutorClient>,
        metadata: Arc<dyn MetadataClient>,
        registry: Arc<JobTypeRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            cache,
            executor,
            metadata,
            registry,
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
