//! Per-project membership set.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sitehub_core::{ConnectionId, PresenceEntry, ProjectId, UserId, dedup_presence};

use super::connection::Connection;

/// Connections currently joined to one project.
///
/// Owned by the hub loop; the lock only guards against concurrent readers
/// such as stats queries.
pub struct Room {
    project_id: ProjectId,
    members: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Room {
    /// Create an empty room.
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Project this room serves.
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Add a member. Returns `false` if it was already present.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        let id = connection.id().clone();
        self.members.write().insert(id, connection).is_none()
    }

    /// Remove a member, returning it if it was present.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.members.write().remove(connection_id)
    }

    /// Whether any member belongs to `user_id`.
    pub fn contains_user(&self, user_id: &UserId) -> bool {
        self.members
            .read()
            .values()
            .any(|c| c.user_id() == user_id)
    }

    /// Number of member connections.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Snapshot of member connections.
    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.members.read().values().cloned().collect()
    }

    /// Presence list: one entry per distinct user, sorted by user ID.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        dedup_presence(self.members.read().values().map(|c| c.presence().clone()))
    }
}
