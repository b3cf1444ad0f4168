use std::collections::HashMap;

use job_protocol::{JobDefinition, ObjectId, ResourceBundle, WriteRequest};
use metadata_client::Selector;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::LogicError;
use crate::traits::{DynamicResources, JobTypeLogic, RuntimeJobResult};

fn object_id_field(job_def: &JobDefinition, field: &str) -> Result<ObjectId, LogicError> {
    let raw = job_def
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| LogicError::InvalidDefinition(format!("missing '{field}' field")))?;
    let uuid = Uuid::parse_str(raw)
        .map_err(|e| LogicError::InvalidDefinition(format!("invalid '{field}': {e}")))?;
    Ok(ObjectId::from(uuid))
}

fn merge_field(job_def: &JobDefinition, field: &str, value: Value) -> JobDefinition {
    let mut out = job_def.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.insert(field.to_string(), value);
    }
    out
}

/// Imports an externally-authored model definition into the platform.
pub struct ImportModelLogic;

impl JobTypeLogic for ImportModelLogic {
    fn required_metadata(&self, job_def: &JobDefinition) -> Result<Vec<Selector>, LogicError> {
        match job_def.get("source_repository_id").and_then(Value::as_str) {
            Some(raw) => {
                let uuid = Uuid::parse_str(raw).map_err(|e| {
                    LogicError::InvalidDefinition(format!("invalid 'source_repository_id': {e}"))
                })?;
                Ok(vec![Selector {
                    key: "source_repository".to_string(),
                    object_type: "repository".to_string(),
                    object_id: Some(ObjectId::from(uuid)),
                }])
            }
            None => Ok(Vec::new()),
        }
    }

    fn apply_transform(
        &self,
        job_def: &JobDefinition,
        bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<JobDefinition, LogicError> {
        let mut out = job_def.clone();
        if let Some(repo) = bundle.get("source_repository") {
            let derived_name = repo
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("imported-model");
            out = merge_field(&out, "package_name", json!(derived_name));
        }
        Ok(out)
    }

    fn apply_metadata_transform(
        &self,
        _job_def: &JobDefinition,
        bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<ResourceBundle, LogicError> {
        Ok(bundle.clone())
    }

    fn expected_outputs(
        &self,
        _job_def: &JobDefinition,
        _bundle: &ResourceBundle,
    ) -> HashMap<String, usize> {
        HashMap::from([("model".to_string(), 1)])
    }

    fn set_result_ids(
        &self,
        job_def: &JobDefinition,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<JobDefinition, LogicError> {
        let model_id = result_ids
            .get("model")
            .ok_or_else(|| LogicError::InvalidDefinition("no preallocated 'model' id".into()))?;
        Ok(merge_field(job_def, "model_id", json!(model_id.to_string())))
    }

    fn process_result(
        &self,
        job_config: &JobDefinition,
        runtime_result: &RuntimeJobResult,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<Vec<WriteRequest>, LogicError> {
        let model_id = *result_ids
            .get("model")
            .ok_or_else(|| LogicError::InvalidDefinition("no preallocated 'model' id".into()))?;
        let definition = runtime_result
            .outputs
            .first()
            .cloned()
            .ok_or_else(|| LogicError::InvalidDefinition("executor returned no outputs".into()))?;
        let package_name = job_config
            .get("package_name")
            .cloned()
            .unwrap_or(json!("imported-model"));
        Ok(vec![WriteRequest {
            object_type: "model".to_string(),
            preallocated_id: Some(model_id),
            definition,
            controlled_attrs: HashMap::from([("package_name".to_string(), package_name)]),
        }])
    }
}

/// Executes a single previously-imported model against supplied inputs.
pub struct RunModelLogic;

impl JobTypeLogic for RunModelLogic {
    fn required_metadata(&self, job_def: &JobDefinition) -> Result<Vec<Selector>, LogicError> {
        let model_id = object_id_field(job_def, "model_id")?;
        Ok(vec![Selector {
            key: "model".to_string(),
            object_type: "model".to_string(),
            object_id: Some(model_id),
        }])
    }

    fn apply_transform(
        &self,
        job_def: &JobDefinition,
        _bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<JobDefinition, LogicError> {
        Ok(job_def.clone())
    }

    fn apply_metadata_transform(
        &self,
        _job_def: &JobDefinition,
        bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<ResourceBundle, LogicError> {
        Ok(bundle.clone())
    }

    fn expected_outputs(
        &self,
        _job_def: &JobDefinition,
        _bundle: &ResourceBundle,
    ) -> HashMap<String, usize> {
        HashMap::from([("model_run_result".to_string(), 1)])
    }

    fn set_result_ids(
        &self,
        job_def: &JobDefinition,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<JobDefinition, LogicError> {
        let result_id = result_ids.get("model_run_result").ok_or_else(|| {
            LogicError::InvalidDefinition("no preallocated 'model_run_result' id".into())
        })?;
        Ok(merge_field(
            job_def,
            "result_id",
            json!(result_id.to_string()),
        ))
    }

    fn process_result(
        &self,
        _job_config: &JobDefinition,
        runtime_result: &RuntimeJobResult,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<Vec<WriteRequest>, LogicError> {
        let result_id = *result_ids.get("model_run_result").ok_or_else(|| {
            LogicError::InvalidDefinition("no preallocated 'model_run_result' id".into())
        })?;
        let definition = runtime_result
            .outputs
            .first()
            .cloned()
            .ok_or_else(|| LogicError::InvalidDefinition("executor returned no outputs".into()))?;
        Ok(vec![WriteRequest {
            object_type: "model_run_result".to_string(),
            preallocated_id: Some(result_id),
            definition,
            controlled_attrs: HashMap::new(),
        }])
    }
}

/// Executes a multi-node flow, producing one result object per node.
pub struct RunFlowLogic;

impl RunFlowLogic {
    fn node_names(job_def: &JobDefinition) -> Vec<String> {
        job_def
            .get("nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .enumerate()
                    .map(|(i, n)| {
                        n.get("name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("node_{i}"))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl JobTypeLogic for RunFlowLogic {
    fn required_metadata(&self, job_def: &JobDefinition) -> Result<Vec<Selector>, LogicError> {
        let flow_id = object_id_field(job_def, "flow_id")?;
        Ok(vec![Selector {
            key: "flow".to_string(),
            object_type: "flow".to_string(),
            object_id: Some(flow_id),
        }])
    }

    fn apply_transform(
        &self,
        job_def: &JobDefinition,
        _bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<JobDefinition, LogicError> {
        Ok(job_def.clone())
    }

    fn apply_metadata_transform(
        &self,
        _job_def: &JobDefinition,
        bundle: &ResourceBundle,
        _dynamic_resources: &DynamicResources,
    ) -> Result<ResourceBundle, LogicError> {
        Ok(bundle.clone())
    }

    fn expected_outputs(
        &self,
        job_def: &JobDefinition,
        _bundle: &ResourceBundle,
    ) -> HashMap<String, usize> {
        let count = Self::node_names(job_def).len().max(1);
        HashMap::from([("flow_run_result".to_string(), count)])
    }

    fn set_result_ids(
        &self,
        job_def: &JobDefinition,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<JobDefinition, LogicError> {
        let _ = result_ids.get("flow_run_result").ok_or_else(|| {
            LogicError::InvalidDefinition("no preallocated 'flow_run_result' ids".into())
        })?;
        Ok(job_def.clone())
    }

    fn process_result(
        &self,
        _job_config: &JobDefinition,
        runtime_result: &RuntimeJobResult,
        result_ids: &HashMap<String, ObjectId>,
    ) -> Result<Vec<WriteRequest>, LogicError> {
        let result_id = *result_ids.get("flow_run_result").ok_or_else(|| {
            LogicError::InvalidDefinition("no preallocated 'flow_run_result' id".into())
        })?;
        if runtime_result.outputs.is_empty() {
            return Err(LogicError::InvalidDefinition(
                "executor returned no outputs".into(),
            ));
        }
        Ok(runtime_result
            .outputs
            .iter()
            .enumerate()
            .map(|(i, output)| WriteRequest {
                object_type: "flow_run_result".to_string(),
                preallocated_id: if i == 0 { Some(result_id) } else { None },
                definition: output.clone(),
                controlled_attrs: HashMap::new(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_model_round_trips_through_result_ids() {
        let logic = ImportModelLogic;
        let job_def = json!({});
        let bundle = ResourceBundle::default();

        let outputs = logic.expected_outputs(&job_def, &bundle);
        assert_eq!(outputs.get("model"), Some(&1));

        let model_id = ObjectId::from(Uuid::new_v4());
        let mapping = HashMap::from([("model".to_string(), model_id)]);
        let with_ids = logic.set_result_ids(&job_def, &mapping).unwrap();
        assert_eq!(with_ids["model_id"], json!(model_id.to_string()));

        let result = RuntimeJobResult {
            outputs: vec![json!({ "weights": "s3://bucket/model.bin" })],
            diagnostics: None,
        };
        let writes = logic.process_result(&with_ids, &result, &mapping).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].preallocated_id, Some(model_id));
        assert_eq!(writes[0].object_type, "model");
    }

    #[test]
    fn run_model_requires_model_id_field() {
        let logic = RunModelLogic;
        let err = logic.required_metadata(&json!({})).unwrap_err();
        assert!(matches!(err, LogicError::InvalidDefinition(_)));
    }

    #[test]
    fn run_flow_expects_one_result_per_node() {
        let logic = RunFlowLogic;
        let job_def = json!({ "nodes": [{"name": "a"}, {"name": "b"}] });
        let outputs = logic.expected_outputs(&job_def, &ResourceBundle::default());
        assert_eq!(outputs.get("flow_run_result"), Some(&2));
    }
}
