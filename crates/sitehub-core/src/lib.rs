//! # sitehub-core
//!
//! Shared vocabulary for the sitehub collaboration hub.
//!
//! - **Branded IDs**: `UserId`, `ProjectId`, `ConnectionId` as newtypes for type safety
//! - **Envelope**: the `{action, payload, project_id}` wire message and the `Action` sum type
//! - **Presence**: per-room presence entries and deduplication
//! - **Bulk**: bulk create/update/delete payloads and the per-item result report
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod bulk;
pub mod envelope;
pub mod ids;
pub mod logging;
pub mod presence;

pub use bulk::{
    BulkAction, BulkCreatePayload, BulkDeletePayload, BulkOperationResult, BulkUpdatePayload,
    ItemOutcome,
};
pub use envelope::{Action, Envelope, ErrorPayload, InboundEnvelope};
pub use ids::{ConnectionId, ProjectId, UserId};
pub use presence::{PresenceEntry, PresenceLeave, dedup_presence};
pub use logging::{LogFormat, init_subscriber};
