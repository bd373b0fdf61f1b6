//! In-process entity store keyed by project and record ID.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sitehub_core::{ItemOutcome, ProjectId};
use tracing::debug;

use super::BulkService;
use crate::errors::HubError;

/// Item is not a JSON object.
pub const INVALID_ITEM: &str = "INVALID_ITEM";
/// Update carries no string `id`.
pub const MISSING_ID: &str = "MISSING_ID";
/// Create targets an ID that is already stored.
pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
/// Update or delete targets an ID that is not stored.
pub const NOT_FOUND: &str = "NOT_FOUND";

type Records = HashMap<String, Map<String, Value>>;

/// Bulk service backed by a map per project.
///
/// Items are applied in request order; a failing item never stops the
/// rest of the batch.
#[derive(Default)]
pub struct MemoryEntityService {
    projects: RwLock<HashMap<ProjectId, Records>>,
}

impl MemoryEntityService {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn id_of(record: &Map<String, Value>) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl BulkService for MemoryEntityService {
    async fn bulk_create(
        &self,
        project_id: &ProjectId,
        items: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, HubError> {
        let mut projects = self.projects.write();
        let records = projects.entry(project_id.clone()).or_default();
        let outcomes = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let Value::Object(mut record) = item else {
                    return ItemOutcome::failed(INVALID_ITEM).with_index(index);
                };
                let id = id_of(&record).unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
                if records.contains_key(&id) {
                    return ItemOutcome::failed(ALREADY_EXISTS)
                        .with_index(index)
                        .with_id(id);
                }
                let _ = record.insert("id".into(), Value::String(id.clone()));
                let data = Value::Object(record.clone());
                let _ = records.insert(id.clone(), record);
                ItemOutcome::succeeded()
                    .with_index(index)
                    .with_id(id)
                    .with_data(data)
            })
            .collect();
        debug!(project_id = %project_id, stored = records.len(), "bulk create applied");
        Ok(outcomes)
    }

    async fn bulk_update(
        &self,
        project_id: &ProjectId,
        updates: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, HubError> {
        let mut projects = self.projects.write();
        let records = projects.entry(project_id.clone()).or_default();
        let outcomes = updates
            .into_iter()
            .enumerate()
            .map(|(index, update)| {
                let Value::Object(patch) = update else {
                    return ItemOutcome::failed(INVALID_ITEM).with_index(index);
                };
                let Some(id) = id_of(&patch) else {
                    return ItemOutcome::failed(MISSING_ID).with_index(index);
                };
                let Some(record) = records.get_mut(&id) else {
                    return ItemOutcome::failed(NOT_FOUND).with_index(index).with_id(id);
                };
                let mut fields = Vec::with_capacity(patch.len());
                for (key, value) in patch {
                    if key == "id" {
                        continue;
                    }
                    fields.push(key.clone());
                    let _ = record.insert(key, value);
                }
                fields.sort();
                ItemOutcome::succeeded()
                    .with_index(index)
                    .with_id(id)
                    .with_fields(fields)
                    .with_data(Value::Object(record.clone()))
            })
            .collect();
        Ok(outcomes)
    }

    async fn bulk_delete(
        &self,
        project_id: &ProjectId,
        ids: Vec<String>,
    ) -> Result<Vec<ItemOutcome>, HubError> {
        let mut projects = self.projects.write();
        let outcomes = match projects.get_mut(project_id) {
            Some(records) => ids
                .into_iter()
                .map(|id| match records.remove(&id) {
                    Some(_) => ItemOutcome::succeeded().with_id(id),
                    None => ItemOutcome::failed(NOT_FOUND).with_id(id),
                })
                .collect(),
            None => ids
                .into_iter()
                .map(|id| ItemOutcome::failed(NOT_FOUND).with_id(id))
                .collect(),
        };
        if projects.get(project_id).is_some_and(HashMap::is_empty) {
            let _ = projects.remove(project_id);
        }
        Ok(outcomes)
    }
}
