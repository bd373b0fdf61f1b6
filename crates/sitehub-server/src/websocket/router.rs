//! Inbound envelope routing.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sitehub_core::{
    Action, BulkAction, BulkCreatePayload, BulkDeletePayload, BulkOperationResult,
    BulkUpdatePayload, Envelope, InboundEnvelope, ItemOutcome,
};
use tracing::{debug, error, info, warn};

use super::connection::{Connection, Frame};
use super::hub::HubHandle;
use crate::errors::{ErrorKind, HubError};
use crate::metrics::{BULK_OPERATION_DURATION_SECONDS, HUB_ERRORS_TOTAL, HUB_MESSAGES_TOTAL};
use crate::services::ServiceRegistry;

/// Handles one raw inbound frame on behalf of a connection.
///
/// An `Err` is echoed to that connection only, as an `ERROR` envelope.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process `raw`, received on `connection`.
    async fn handle_message(
        &self,
        connection: &Arc<Connection>,
        raw: &[u8],
    ) -> Result<(), HubError>;
}

/// Decodes envelopes, validates them against the sender's room and
/// dispatches bulk actions to the registered services.
pub struct MessageRouter {
    hub: HubHandle,
    services: Arc<ServiceRegistry>,
    service_timeout: Duration,
}

impl MessageRouter {
    /// Create a router that broadcasts through `hub`.
    pub fn new(hub: HubHandle, services: Arc<ServiceRegistry>, service_timeout: Duration) -> Self {
        Self {
            hub,
            services,
            service_timeout,
        }
    }

    async fn route(&self, conn: &Arc<Connection>, raw: &[u8]) -> Result<(), HubError> {
        let envelope = InboundEnvelope::decode(raw).map_err(HubError::Decode)?;

        if &envelope.project_id != conn.project_id() {
            return Err(HubError::ProjectMismatch {
                expected: conn.project_id().clone(),
                got: envelope.project_id,
            });
        }

        counter!(HUB_MESSAGES_TOTAL, "action" => action_label(&envelope.action)).increment(1);
        let Some(kind) = envelope.action.bulk() else {
            return Err(HubError::UnknownAction(envelope.action));
        };
        self.dispatch_bulk(conn, kind, envelope).await
    }

    async fn dispatch_bulk(
        &self,
        conn: &Arc<Connection>,
        kind: BulkAction,
        envelope: InboundEnvelope,
    ) -> Result<(), HubError> {
        let InboundEnvelope {
            action,
            payload,
            project_id,
        } = envelope;

        let (entity_type, outcomes) = match kind {
            BulkAction::Create => {
                let p: BulkCreatePayload = decode_payload(&action, payload)?;
                let service = self.services.resolve(kind, &p.entity_type)?;
                let outcomes = self
                    .bounded(&action, kind, service.bulk_create(&project_id, p.items))
                    .await?;
                (p.entity_type, outcomes)
            }
            BulkAction::Update => {
                let p: BulkUpdatePayload = decode_payload(&action, payload)?;
                let service = self.services.resolve(kind, &p.entity_type)?;
                let outcomes = self
                    .bounded(&action, kind, service.bulk_update(&project_id, p.updates))
                    .await?;
                (p.entity_type, outcomes)
            }
            BulkAction::Delete => {
                let p: BulkDeletePayload = decode_payload(&action, payload)?;
                let service = self.services.resolve(kind, &p.entity_type)?;
                let outcomes = self
                    .bounded(&action, kind, service.bulk_delete(&project_id, p.ids))
                    .await?;
                (p.entity_type, outcomes)
            }
        };

        let result = BulkOperationResult::from_outcomes(entity_type, kind, outcomes);
        info!(
            project_id = %project_id,
            user_id = %conn.user_id(),
            action = %action,
            entity_type = %result.entity_type,
            total = result.total_count,
            failed = result.failure_count,
            "bulk operation applied"
        );

        let frame = match Envelope::bulk_result(action, project_id.clone(), result).encode() {
            Ok(json) => Frame::from(json),
            Err(e) => {
                error!(error = %e, "failed to encode bulk result");
                return Ok(());
            }
        };
        self.hub.broadcast(project_id, frame, None).await
    }

    async fn bounded<F>(
        &self,
        action: &Action,
        kind: BulkAction,
        call: F,
    ) -> Result<Vec<ItemOutcome>, HubError>
    where
        F: Future<Output = Result<Vec<ItemOutcome>, HubError>> + Send,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.service_timeout, call).await;
        histogram!(BULK_OPERATION_DURATION_SECONDS, "action" => kind.as_str())
            .record(start.elapsed().as_secs_f64());
        result.unwrap_or_else(|_elapsed| {
            error!(action = %action, "bulk service timed out after {:?}", self.service_timeout);
            Err(HubError::Timeout {
                action: action.clone(),
            })
        })
    }
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn handle_message(
        &self,
        connection: &Arc<Connection>,
        raw: &[u8],
    ) -> Result<(), HubError> {
        debug!(connection_id = %connection.id(), bytes = raw.len(), "inbound frame");
        let result = self.route(connection, raw).await;
        if let Err(err) = &result {
            counter!(HUB_ERRORS_TOTAL, "code" => err.code()).increment(1);
            match err.kind() {
                ErrorKind::Decode | ErrorKind::Validation => {
                    debug!(connection_id = %connection.id(), code = err.code(), "rejected: {err}");
                }
                ErrorKind::Service | ErrorKind::Internal => {
                    warn!(connection_id = %connection.id(), code = err.code(), "failed: {err}");
                }
            }
        }
        result
    }
}

fn decode_payload<T: DeserializeOwned>(action: &Action, payload: Value) -> Result<T, HubError> {
    serde_json::from_value(payload).map_err(|source| HubError::InvalidPayload {
        action: action.clone(),
        source,
    })
}

/// Bounded metric label: client-chosen action strings collapse to one value.
fn action_label(action: &Action) -> String {
    match action {
        Action::Unknown(_) => "UNKNOWN".to_owned(),
        known => known.as_str().to_owned(),
    }
}
