use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use job_protocol::{JobDefinition, ObjectId, TenantId, WriteRequest};
use serde_json::Value;

use crate::error::MetadataError;
use crate::traits::{MetadataClient, ObjectHeader, Selector};

struct StoredObject {
    header: ObjectHeader,
    value: Value,
}

/// In-process metadata store backing tests and local runs. Objects live
/// in a flat map keyed by id; there is no real tenant isolation, only
/// bookkeeping, matching the scope of the trait this backs.
#[derive(Default)]
pub struct InMemoryMetadataClient {
    objects: Mutex<HashMap<ObjectId, StoredObject>>,
    preallocated: Mutex<HashMap<ObjectId, String>>,
}

impl InMemoryMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadataClient {
    async fn load_objects(
        &self,
        _tenant: &TenantId,
        selectors: &[Selector],
    ) -> Result<Vec<(Selector, Value)>, MetadataError> {
        let objects = self.objects.lock().expect("metadata mutex poisoned");
        let mut out = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let object_id = selector.object_id.ok_or_else(|| {
                MetadataError::Conflict(format!(
                    "selector {} has no object id to resolve",
                    selector.key
                ))
            })?;
            let stored = objects.get(&object_id).ok_or_else(|| {
                MetadataError::Conflict(format!("no object found for id {object_id}"))
            })?;
            out.push((selector.clone(), stored.value.clone()));
        }
        Ok(out)
    }

    async fn preallocate_ids(
        &self,
        _tenant: &TenantId,
        requests: &[(String, usize)],
    ) -> Result<Vec<ObjectId>, MetadataError> {
        let mut preallocated = self.preallocated.lock().expect("metadata mutex poisoned");
        let mut out = Vec::new();
        for (object_type, count) in requests {
            for _ in 0..*count {
                let id = ObjectId::from(uuid::Uuid::new_v4());
                preallocated.insert(id, object_type.clone());
                out.push(id);
            }
        }
        Ok(out)
    }

    async fn save_initial_metadata(
        &self,
        _tenant: &TenantId,
        job_def: &JobDefinition,
        preallocated_id: ObjectId,
    ) -> Result<ObjectHeader, MetadataError> {
        let mut preallocated = self.preallocated.lock().expect("metadata mutex poisoned");
        let object_type = preallocated.remove(&preallocated_id).ok_or_else(|| {
            MetadataError::Conflict(format!("id {preallocated_id} was not preallocated"))
        })?;

        let mut objects = self.objects.lock().expect("metadata mutex poisoned");
        if objects.contains_key(&preallocated_id) {
            return Err(MetadataError::Conflict(format!(
                "id {preallocated_id} already has saved metadata"
            )));
        }

        let header = ObjectHeader {
            object_id: preallocated_id,
            object_type,
            version: 1,
        };
        objects.insert(
            preallocated_id,
            StoredObject {
                header: header.clone(),
                value: job_def.clone(),
            },
        );
        Ok(header)
    }

    async fn save_result_metadata(
        &self,
        _tenant: &TenantId,
        requests: &[WriteRequest],
    ) -> Result<Vec<ObjectHeader>, MetadataError> {
        let mut objects = self.objects.lock().expect("metadata mutex poisoned");

        // Validate the whole batch before mutating anything so a single
        // bad request can't leave the store half-written.
        for request in requests {
            if let Some(id) = request.preallocated_id {
                if objects.contains_key(&id) {
                    return Err(MetadataError::Conflict(format!(
                        "id {id} already has saved metadata"
                    )));
                }
            }
        }

        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            let object_id = request
                .preallocated_id
                .unwrap_or_else(|| ObjectId::from(uuid::Uuid::new_v4()));
            let header = ObjectHeader {
                object_id,
                object_type: request.object_type.clone(),
                version: 1,
            };
            objects.insert(
                object_id,
                StoredObject {
                    header: header.clone(),
                    value: request.definition.clone(),
                },
            );
            out.push(header);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn tenant() -> TenantId {
        TenantId::from("acme")
    }

    #[tokio::test]
    async fn preallocate_then_save_round_trips() {
        let client = InMemoryMetadataClient::new();
        let ids = client
            .preallocate_ids(&tenant(), &[("model".to_string(), 1)])
            .await
            .expect("preallocate");
        assert_eq!(ids.len(), 1);

        let def: JobDefinition = serde_json::json!({ "name": "my-model" });
        let header = client
            .save_initial_metadata(&tenant(), &def, ids[0])
            .await
            .expect("save initial");
        assert_eq!(header.object_id, ids[0]);
        assert_eq!(header.object_type, "model");

        let selector = Selector {
            key: "self".to_string(),
            object_type: "model".to_string(),
            object_id: Some(ids[0]),
        };
        let loaded = client
            .load_objects(&tenant(), &[selector])
            .await
            .expect("load objects");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1, def);
    }

    #[tokio::test]
    async fn save_initial_metadata_rejects_unallocated_id() {
        let client = InMemoryMetadataClient::new();
        let def: JobDefinition = serde_json::json!({});
        let err = client
            .save_initial_metadata(&tenant(), &def, ObjectId::from(uuid::Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_result_metadata_is_all_or_nothing() {
        let client = InMemoryMetadataClient::new();
        let ids = client
            .preallocate_ids(&tenant(), &[("dataset".to_string(), 1)])
            .await
            .expect("preallocate");
        let def: JobDefinition = serde_json::json!({});
        client
            .save_initial_metadata(&tenant(), &def, ids[0])
            .await
            .expect("save initial");

        let requests = vec![
            WriteRequest {
                object_type: "dataset".to_string(),
                preallocated_id: None,
                definition: serde_json::json!({ "rows": 1 }),
                controlled_attrs: Map::new(),
            },
            WriteRequest {
                object_type: "dataset".to_string(),
                preallocated_id: Some(ids[0]),
                definition: serde_json::json!({ "rows": 2 }),
                controlled_attrs: Map::new(),
            },
        ];

        let err = client
            .save_result_metadata(&tenant(), &requests)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Conflict(_)));

        // The first request must not have been committed despite being valid.
        let count = client.objects.lock().unwrap().len();
        assert_eq!(count, 1);
    }
}
