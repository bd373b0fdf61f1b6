//! Per-entity-type bulk services and their registry.

mod memory;

pub use memory::{ALREADY_EXISTS, INVALID_ITEM, MISSING_ID, MemoryEntityService, NOT_FOUND};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sitehub_core::{BulkAction, ItemOutcome, ProjectId};

use crate::errors::HubError;

/// Bulk create/update/delete for one entity type.
///
/// Implementations report per-item failures in the returned outcomes, in
/// request order. An `Err` fails the whole batch.
#[async_trait]
pub trait BulkService: Send + Sync {
    /// Create records.
    async fn bulk_create(
        &self,
        project_id: &ProjectId,
        items: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, HubError>;

    /// Apply partial updates. Each update carries the record's `id`.
    async fn bulk_update(
        &self,
        project_id: &ProjectId,
        updates: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, HubError>;

    /// Delete records by ID.
    async fn bulk_delete(
        &self,
        project_id: &ProjectId,
        ids: Vec<String>,
    ) -> Result<Vec<ItemOutcome>, HubError>;
}

/// Maps entity type names to bulk services.
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn BulkService>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register a service for an entity type, replacing any previous one.
    pub fn register(&mut self, entity_type: &str, service: impl BulkService + 'static) {
        let _ = self
            .services
            .insert(entity_type.to_owned(), Arc::new(service));
    }

    /// Look up the service for `entity_type`.
    pub fn resolve(
        &self,
        action: BulkAction,
        entity_type: &str,
    ) -> Result<Arc<dyn BulkService>, HubError> {
        self.services
            .get(entity_type)
            .cloned()
            .ok_or_else(|| HubError::NotImplemented {
                action: action.into(),
                entity_type: entity_type.to_owned(),
            })
    }

    /// Registered entity types (sorted).
    pub fn entity_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
