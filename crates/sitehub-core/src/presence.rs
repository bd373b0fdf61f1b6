//! Presence payloads: who is currently viewing a project.
//!
//! Presence is never stored on its own. It is recomputed from room
//! membership, and a user with several connections (tabs, devices) appears
//! once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// One user in a presence list or join notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// User identifier.
    pub user_id: UserId,
    /// Given name shown next to the avatar.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact address.
    pub email: String,
}

/// Payload of a `PRESENCE_LEAVE` notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceLeave {
    /// The user whose last connection left the room.
    pub user_id: UserId,
}

/// Collapse entries sharing a `user_id` into one, ordered by `user_id`.
///
/// The first entry seen for a user wins.
pub fn dedup_presence<I>(entries: I) -> Vec<PresenceEntry>
where
    I: IntoIterator<Item = PresenceEntry>,
{
    let mut by_user: BTreeMap<UserId, PresenceEntry> = BTreeMap::new();
    for entry in entries {
        let _ = by_user.entry(entry.user_id.clone()).or_insert(entry);
    }
    by_user.into_values().collect()
}
