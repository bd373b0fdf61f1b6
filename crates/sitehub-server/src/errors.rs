//! Per-message error codes and error type.
//!
//! Every [`HubError`] returned while handling an inbound message is turned
//! into one `ERROR` envelope sent to the originating connection only.
//! Transport failures are not represented here; they end the connection.

use sitehub_core::{Action, Envelope, ErrorPayload, ProjectId};

// ── Error code constants ────────────────────────────────────────────

/// Frame is not a well-formed envelope.
pub const DECODE_ERROR: &str = "DECODE_ERROR";
/// Envelope is well-formed but its payload does not fit the action.
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
/// Envelope addressed to a project other than the connection's.
pub const PROJECT_MISMATCH: &str = "PROJECT_MISMATCH";
/// Action is not accepted from clients.
pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
/// No service handles the requested entity type.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";
/// The bulk service failed the whole batch.
pub const SERVICE_ERROR: &str = "SERVICE_ERROR";
/// The bulk service did not answer in time.
pub const TIMEOUT: &str = "TIMEOUT";
/// The hub event loop is gone (shutdown).
pub const HUB_UNAVAILABLE: &str = "HUB_UNAVAILABLE";

/// Coarse error category, used for log levels and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input.
    Decode,
    /// Well-formed input the hub refuses.
    Validation,
    /// Failure inside a bulk service.
    Service,
    /// Failure inside the hub itself.
    Internal,
}

/// Error produced while handling one inbound message.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The frame could not be decoded as an envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload does not match the action's schema.
    #[error("invalid {action} payload: {source}")]
    InvalidPayload {
        /// Action whose payload failed to decode.
        action: Action,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The envelope names a project other than the connection's.
    #[error("envelope for project {got} sent on a connection bound to {expected}")]
    ProjectMismatch {
        /// The connection's project.
        expected: ProjectId,
        /// The project named in the envelope.
        got: ProjectId,
    },

    /// The action is not one clients may send.
    #[error("unknown action '{0}'")]
    UnknownAction(Action),

    /// No service is registered for the entity type.
    #[error("{action} is not implemented for entity type '{entity_type}'")]
    NotImplemented {
        /// Requested action.
        action: Action,
        /// Requested entity type.
        entity_type: String,
    },

    /// The bulk service rejected the batch as a whole.
    #[error("{message}")]
    Service {
        /// Description from the service.
        message: String,
    },

    /// The bulk service exceeded its deadline.
    #[error("{action} timed out")]
    Timeout {
        /// Action that timed out.
        action: Action,
    },

    /// The hub event loop has stopped.
    #[error("hub is not running")]
    HubUnavailable,
}

impl HubError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => DECODE_ERROR,
            Self::InvalidPayload { .. } => INVALID_PAYLOAD,
            Self::ProjectMismatch { .. } => PROJECT_MISMATCH,
            Self::UnknownAction(_) => UNKNOWN_ACTION,
            Self::NotImplemented { .. } => NOT_IMPLEMENTED,
            Self::Service { .. } => SERVICE_ERROR,
            Self::Timeout { .. } => TIMEOUT,
            Self::HubUnavailable => HUB_UNAVAILABLE,
        }
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::InvalidPayload { .. } => ErrorKind::Decode,
            Self::ProjectMismatch { .. } | Self::UnknownAction(_) | Self::NotImplemented { .. } => {
                ErrorKind::Validation
            }
            Self::Service { .. } | Self::Timeout { .. } => ErrorKind::Service,
            Self::HubUnavailable => ErrorKind::Internal,
        }
    }

    /// The `ERROR` envelope sent back to the connection in `project_id`.
    pub fn reply(&self, project_id: ProjectId) -> Envelope<ErrorPayload> {
        Envelope::error(project_id, self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").unwrap_err()
    }

    #[test]
    fn decode_code_and_kind() {
        let err = HubError::Decode(json_error());
        assert_eq!(err.code(), DECODE_ERROR);
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("malformed envelope"));
    }

    #[test]
    fn mismatch_message_names_both_projects() {
        let err = HubError::ProjectMismatch {
            expected: ProjectId::from("p1"),
            got: ProjectId::from("p2"),
        };
        assert_eq!(err.code(), PROJECT_MISMATCH);
        assert_eq!(err.kind(), ErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains("p1") && msg.contains("p2"));
    }

    #[test]
    fn unknown_action_shows_wire_name() {
        let err = HubError::UnknownAction(Action::Unknown("DROP_TABLES".into()));
        assert_eq!(err.to_string(), "unknown action 'DROP_TABLES'");
        assert_eq!(err.code(), UNKNOWN_ACTION);
    }

    #[test]
    fn not_implemented_payload() {
        let err = HubError::NotImplemented {
            action: Action::BulkCreateElements,
            entity_type: "cable".into(),
        };
        let reply = err.reply(ProjectId::from("p1"));
        assert_eq!(reply.action, Action::Error);
        assert_eq!(reply.project_id.as_str(), "p1");
        assert_eq!(reply.payload.code, NOT_IMPLEMENTED);
        assert_eq!(
            reply.payload.message,
            "BULK_CREATE_ELEMENTS is not implemented for entity type 'cable'"
        );
    }

    #[test]
    fn invalid_payload_keeps_source() {
        let err = HubError::InvalidPayload {
            action: Action::BulkDeleteElements,
            source: json_error(),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn service_and_timeout_kinds() {
        assert_eq!(
            HubError::Service { message: "db down".into() }.kind(),
            ErrorKind::Service
        );
        let timeout = HubError::Timeout {
            action: Action::BulkUpdateElements,
        };
        assert_eq!(timeout.code(), TIMEOUT);
        assert_eq!(timeout.kind(), ErrorKind::Service);
    }

    #[test]
    fn hub_unavailable_is_internal() {
        assert_eq!(HubError::HubUnavailable.kind(), ErrorKind::Internal);
        assert_eq!(HubError::HubUnavailable.code(), HUB_UNAVAILABLE);
    }
}
