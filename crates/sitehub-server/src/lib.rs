//! # sitehub-server
//!
//! Per-project collaboration hub behind an Axum HTTP + `WebSocket` server.
//!
//! - `WebSocket` gateway: one session per client, bounded outbound queue, ping/pong liveness
//! - Hub actor: owns the room table, presence snapshots and join/leave notifications
//! - Message router: envelope validation and bulk create/update/delete dispatch
//! - Bulk services: per-entity-type backends, with an in-memory store bundled
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod websocket;

pub use config::{ConnectionConfig, ServerConfig};
pub use errors::HubError;
pub use server::HubServer;
pub use services::{BulkService, MemoryEntityService, ServiceRegistry};
