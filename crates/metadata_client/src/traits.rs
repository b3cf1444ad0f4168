use async_trait::async_trait;
use job_protocol::{JobDefinition, ObjectId, TenantId, WriteRequest};
use serde_json::Value;

use crate::error::MetadataError;

/// A dependency reference the job-type logic needs resolved before
/// launch (§4.4 `requiredMetadata`).
#[derive(Debug, Clone)]
pub struct Selector {
    pub key: String,
    pub object_type: String,
    pub object_id: Option<ObjectId>,
}

/// Metadata describing a saved or preallocated object (§4.3).
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub object_id: ObjectId,
    pub object_type: String,
    pub version: u32,
}

/// Abstract handle to the metadata/object store (§4.3, C3).
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Batch fetch dependencies.
    async fn load_objects(
        &self,
        tenant: &TenantId,
        selectors: &[Selector],
    ) -> Result<Vec<(Selector, Value)>, MetadataError>;

    /// Reserve ids ahead of writing the objects they will back
    /// (§4.4 `expectedOutputs` drives the counts).
    async fn preallocate_ids(
        &self,
        tenant: &TenantId,
        requests: &[(String, usize)],
    ) -> Result<Vec<ObjectId>, MetadataError>;

    /// Save the tenant-supplied job definition under a preallocated id,
    /// producing the canonical `jobId`/`jobKey` basis (§4.5
    /// `saveInitialMetadata`).
    async fn save_initial_metadata(
        &self,
        tenant: &TenantId,
        job_def: &JobDefinition,
        preallocated_id: ObjectId,
    ) -> Result<ObjectHeader, MetadataError>;

    /// Apply a batch of result writes transactionally (§4.5
    /// `saveResultMetadata`).
    async fn save_result_metadata(
        &self,
        tenant: &TenantId,
        requests: &[WriteRequest],
    ) -> Result<Vec<ObjectHeader>, MetadataError>;
}
