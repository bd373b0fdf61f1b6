//! Bulk create/update/delete payloads and the per-item result report.
//!
//! A bulk operation never fails as a whole because one record failed; each
//! record gets its own [`ItemOutcome`] and the counts are derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `BULK_UPDATE_ELEMENTS` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdatePayload {
    /// Entity type the records belong to (e.g. `field_device`).
    pub entity_type: String,
    /// Partial records; each carries its `id` plus the fields to change.
    pub updates: Vec<Value>,
}

/// `BULK_DELETE_ELEMENTS` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkDeletePayload {
    /// Entity type the records belong to.
    pub entity_type: String,
    /// IDs of the records to delete.
    pub ids: Vec<String>,
}

/// `BULK_CREATE_ELEMENTS` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkCreatePayload {
    /// Entity type the records belong to.
    pub entity_type: String,
    /// Full records to create.
    pub items: Vec<Value>,
}

/// Kind of bulk operation reported in a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Records created.
    Create,
    /// Records updated.
    Update,
    /// Records deleted.
    Delete,
}

impl BulkAction {
    /// Lowercase name, used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Outcome for one record of a bulk operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Record ID, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Position of the record in the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Whether the record was applied.
    pub success: bool,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fields applied by an update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// The record as stored, echoed back to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ItemOutcome {
    /// A successful outcome.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A failed outcome with an error code.
    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(code.into()),
            ..Self::default()
        }
    }

    /// Attach the record ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach the request position.
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attach the list of applied fields.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Attach the stored record.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Result payload echoed for every bulk action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkOperationResult {
    /// Entity type the operation ran against.
    pub entity_type: String,
    /// Operation kind.
    pub action: BulkAction,
    /// Number of records in the request.
    pub total_count: usize,
    /// Records applied.
    pub success_count: usize,
    /// Records rejected.
    pub failure_count: usize,
    /// Per-record outcomes, in request order.
    pub results: Vec<ItemOutcome>,
}

impl BulkOperationResult {
    /// Build a result, deriving the counts from the outcomes.
    pub fn from_outcomes(
        entity_type: impl Into<String>,
        action: BulkAction,
        results: Vec<ItemOutcome>,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            entity_type: entity_type.into(),
            action,
            total_count: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }
}
