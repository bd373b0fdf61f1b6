//! Wire envelope: `{ "action": ..., "payload": ..., "project_id": ... }`.
//!
//! The action string is modelled as the [`Action`] sum type. Unrecognised
//! strings are kept in [`Action::Unknown`] so that decoding an envelope never
//! fails on the action alone; the router decides what an unknown action
//! means.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bulk::{BulkAction, BulkOperationResult};
use crate::ids::{ProjectId, UserId};
use crate::presence::{PresenceEntry, PresenceLeave};

/// Envelope action.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Partial updates to existing records.
    BulkUpdateElements,
    /// Deletion of records by ID.
    BulkDeleteElements,
    /// Creation of new records.
    BulkCreateElements,
    /// A user's first connection joined the room.
    PresenceJoin,
    /// A user's last connection left the room.
    PresenceLeave,
    /// Full presence snapshot, sent to a connection when it joins.
    PresenceList,
    /// Error reported back to the sender of a message.
    Error,
    /// Any other action string, preserved verbatim.
    Unknown(String),
}

impl Action {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::BulkUpdateElements => "BULK_UPDATE_ELEMENTS",
            Self::BulkDeleteElements => "BULK_DELETE_ELEMENTS",
            Self::BulkCreateElements => "BULK_CREATE_ELEMENTS",
            Self::PresenceJoin => "PRESENCE_JOIN",
            Self::PresenceLeave => "PRESENCE_LEAVE",
            Self::PresenceList => "PRESENCE_LIST",
            Self::Error => "ERROR",
            Self::Unknown(s) => s,
        }
    }

    /// Parse a wire string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "BULK_UPDATE_ELEMENTS" => Self::BulkUpdateElements,
            "BULK_DELETE_ELEMENTS" => Self::BulkDeleteElements,
            "BULK_CREATE_ELEMENTS" => Self::BulkCreateElements,
            "PRESENCE_JOIN" => Self::PresenceJoin,
            "PRESENCE_LEAVE" => Self::PresenceLeave,
            "PRESENCE_LIST" => Self::PresenceList,
            "ERROR" => Self::Error,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The bulk operation this action requests, if any.
    pub fn bulk(&self) -> Option<BulkAction> {
        match self {
            Self::BulkCreateElements => Some(BulkAction::Create),
            Self::BulkUpdateElements => Some(BulkAction::Update),
            Self::BulkDeleteElements => Some(BulkAction::Delete),
            _ => None,
        }
    }
}

impl From<BulkAction> for Action {
    fn from(action: BulkAction) -> Self {
        match action {
            BulkAction::Create => Self::BulkCreateElements,
            BulkAction::Update => Self::BulkUpdateElements,
            BulkAction::Delete => Self::BulkDeleteElements,
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match Self::parse(&s) {
            Self::Unknown(_) => Self::Unknown(s),
            known => known,
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Unknown(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `ERROR` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Tagged wire message scoped to one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P = Value> {
    /// What the message is.
    pub action: Action,
    /// Action-specific payload.
    #[serde(default)]
    pub payload: P,
    /// Room the message belongs to.
    pub project_id: ProjectId,
}

/// Envelope as received from a client, payload not yet decoded.
pub type InboundEnvelope = Envelope<Value>;

impl InboundEnvelope {
    /// Decode raw frame bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

impl<P> Envelope<P> {
    /// Build an envelope.
    pub fn new(action: Action, project_id: ProjectId, payload: P) -> Self {
        Self {
            action,
            payload,
            project_id,
        }
    }
}

impl<P: Serialize> Envelope<P> {
    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Envelope<Vec<PresenceEntry>> {
    /// `PRESENCE_LIST` snapshot.
    pub fn presence_list(project_id: ProjectId, entries: Vec<PresenceEntry>) -> Self {
        Self::new(Action::PresenceList, project_id, entries)
    }
}

impl Envelope<PresenceEntry> {
    /// `PRESENCE_JOIN` notification.
    pub fn presence_join(project_id: ProjectId, entry: PresenceEntry) -> Self {
        Self::new(Action::PresenceJoin, project_id, entry)
    }
}

impl Envelope<PresenceLeave> {
    /// `PRESENCE_LEAVE` notification.
    pub fn presence_leave(project_id: ProjectId, user_id: UserId) -> Self {
        Self::new(Action::PresenceLeave, project_id, PresenceLeave { user_id })
    }
}

impl Envelope<ErrorPayload> {
    /// `ERROR` reply.
    pub fn error(project_id: ProjectId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            Action::Error,
            project_id,
            ErrorPayload {
                code: code.into(),
                message: message.into(),
            },
        )
    }
}

impl Envelope<BulkOperationResult> {
    /// Echo of a bulk action, carrying its result under the same action.
    pub fn bulk_result(action: Action, project_id: ProjectId, result: BulkOperationResult) -> Self {
        Self::new(action, project_id, result)
    }
}
