//! Hub event loop: sole owner of the room table.
//!
//! All membership changes and fan-out run on one task fed by bounded
//! channels. Callers hold a [`HubHandle`] and never touch room state.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use sitehub_core::{ConnectionId, Envelope, PresenceEntry, ProjectId};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, Frame, SendError};
use super::room::Room;
use crate::errors::HubError;
use crate::metrics::{HUB_ROOMS_ACTIVE, WS_BROADCAST_DROPS_TOTAL};

/// A frame to fan out to one room.
#[derive(Clone, Debug)]
pub struct BroadcastRequest {
    /// Target room.
    pub project_id: ProjectId,
    /// Encoded envelope.
    pub frame: Frame,
    /// Member to skip, typically the originator.
    pub exclude: Option<ConnectionId>,
}

/// Point-in-time counters from the hub loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Member connections across all rooms.
    pub connections: usize,
}

enum Query {
    Stats(oneshot::Sender<HubStats>),
    Presence(ProjectId, oneshot::Sender<Vec<PresenceEntry>>),
    Members(ProjectId, oneshot::Sender<Vec<ConnectionId>>),
}

/// Cloneable client of the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Arc<Connection>>,
    unregister_tx: mpsc::Sender<Arc<Connection>>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    query_tx: mpsc::Sender<Query>,
}

impl HubHandle {
    /// Join `connection` to its project's room.
    ///
    /// The connection receives a `PRESENCE_LIST` before any broadcast that
    /// is submitted after this call returns.
    pub async fn register(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        self.register_tx
            .send(connection)
            .await
            .map_err(|_| HubError::HubUnavailable)
    }

    /// Remove `connection` from its room and close its outbound queue.
    /// A no-op for connections that are not members.
    pub async fn unregister(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        self.unregister_tx
            .send(connection)
            .await
            .map_err(|_| HubError::HubUnavailable)
    }

    /// Fan a frame out to every member of a room except `exclude`.
    pub async fn broadcast(
        &self,
        project_id: ProjectId,
        frame: Frame,
        exclude: Option<ConnectionId>,
    ) -> Result<(), HubError> {
        self.broadcast_tx
            .send(BroadcastRequest {
                project_id,
                frame,
                exclude,
            })
            .await
            .map_err(|_| HubError::HubUnavailable)
    }

    /// Room and connection counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.ask(Query::Stats).await
    }

    /// Deduplicated presence list of a room (empty if the room is absent).
    pub async fn presence(&self, project_id: ProjectId) -> Result<Vec<PresenceEntry>, HubError> {
        self.ask(|tx| Query::Presence(project_id, tx)).await
    }

    /// Member connection IDs of a room (empty if the room is absent).
    pub async fn room_members(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConnectionId>, HubError> {
        self.ask(|tx| Query::Members(project_id, tx)).await
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.query_tx
            .send(build(tx))
            .await
            .map_err(|_| HubError::HubUnavailable)?;
        rx.await.map_err(|_| HubError::HubUnavailable)
    }
}

/// The hub actor. Create with [`Hub::new`], drive with [`Hub::run`].
pub struct Hub {
    rooms: HashMap<ProjectId, Room>,
    register_rx: mpsc::Receiver<Arc<Connection>>,
    unregister_rx: mpsc::Receiver<Arc<Connection>>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    query_rx: mpsc::Receiver<Query>,
}

impl Hub {
    /// Create the hub and its handle. `buffer` bounds each request channel.
    pub fn new(buffer: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(buffer);
        let (unregister_tx, unregister_rx) = mpsc::channel(buffer);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(buffer);
        let (query_tx, query_rx) = mpsc::channel(buffer);
        let hub = Self {
            rooms: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            query_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
        };
        (hub, handle)
    }

    /// Process requests until `cancel` fires or every handle is dropped.
    ///
    /// Registrations are drained before unregistrations, and both before
    /// broadcasts, so a connection is a member before any frame submitted
    /// after its registration is fanned out.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("hub loop started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(conn) = self.register_rx.recv() => self.handle_register(conn),
                Some(conn) = self.unregister_rx.recv() => self.handle_unregister(&conn),
                Some(req) = self.broadcast_rx.recv() => self.handle_broadcast(&req),
                Some(query) = self.query_rx.recv() => self.handle_query(query),
                else => break,
            }
        }
        self.close_all();
        info!("hub loop stopped");
    }

    fn handle_register(&mut self, conn: Arc<Connection>) {
        let project_id = conn.project_id().clone();
        let room = self
            .rooms
            .entry(project_id.clone())
            .or_insert_with(|| {
                debug!(project_id = %project_id, "room opened");
                Room::new(project_id.clone())
            });

        let first_for_user = !room.contains_user(conn.user_id());
        if !room.add(conn.clone()) {
            warn!(connection_id = %conn.id(), "connection registered twice, ignoring");
            return;
        }
        info!(
            project_id = %project_id,
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            members = room.len(),
            "connection joined room"
        );

        let snapshot = Envelope::presence_list(room.project_id().clone(), room.presence());
        if let Some(frame) = encode(&snapshot) {
            deliver(&conn, frame);
        }
        if first_for_user {
            let join = Envelope::presence_join(project_id, conn.presence().clone());
            if let Some(frame) = encode(&join) {
                fan_out(room, &frame, Some(conn.id()));
            }
        }
        self.record_rooms();
    }

    fn handle_unregister(&mut self, conn: &Arc<Connection>) {
        let project_id = conn.project_id();
        let (now_empty, user_gone) = {
            let Some(room) = self.rooms.get(project_id) else {
                return;
            };
            if room.remove(conn.id()).is_none() {
                return;
            }
            (room.is_empty(), !room.contains_user(conn.user_id()))
        };
        let _ = conn.close();
        info!(
            project_id = %project_id,
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            dropped = conn.drop_count(),
            "connection left room"
        );

        if now_empty {
            let _ = self.rooms.remove(project_id);
            debug!(project_id = %project_id, "room closed");
        } else if user_gone {
            if let Some(room) = self.rooms.get(project_id) {
                let leave =
                    Envelope::presence_leave(room.project_id().clone(), conn.user_id().clone());
                if let Some(frame) = encode(&leave) {
                    fan_out(room, &frame, None);
                }
            }
        }
        self.record_rooms();
    }

    fn handle_broadcast(&self, req: &BroadcastRequest) {
        match self.rooms.get(&req.project_id) {
            Some(room) => fan_out(room, &req.frame, req.exclude.as_ref()),
            None => debug!(project_id = %req.project_id, "broadcast to absent room dropped"),
        }
    }

    fn handle_query(&self, query: Query) {
        // A requester that gave up waiting is not an error.
        match query {
            Query::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Query::Presence(project_id, reply) => {
                let presence = self
                    .rooms
                    .get(&project_id)
                    .map(Room::presence)
                    .unwrap_or_default();
                let _ = reply.send(presence);
            }
            Query::Members(project_id, reply) => {
                let members = self
                    .rooms
                    .get(&project_id)
                    .map(|room| room.members().iter().map(|c| c.id().clone()).collect())
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.len(),
            connections: self.rooms.values().map(Room::len).sum(),
        }
    }

    fn close_all(&mut self) {
        let mut closed = 0usize;
        for (_, room) in self.rooms.drain() {
            for conn in room.members() {
                if conn.close() {
                    closed += 1;
                }
            }
        }
        if closed > 0 {
            info!(closed, "closed outbound queues on hub shutdown");
        }
        self.record_rooms();
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_rooms(&self) {
        gauge!(HUB_ROOMS_ACTIVE).set(self.rooms.len() as f64);
    }
}

fn encode<P: Serialize>(envelope: &Envelope<P>) -> Option<Frame> {
    match envelope.encode() {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            error!(action = %envelope.action, error = %e, "failed to encode hub envelope");
            None
        }
    }
}

fn fan_out(room: &Room, frame: &Frame, exclude: Option<&ConnectionId>) {
    for member in room.members() {
        if exclude == Some(member.id()) {
            continue;
        }
        deliver(&member, frame.clone());
    }
}

fn deliver(conn: &Connection, frame: Frame) {
    match conn.send(frame) {
        Ok(()) | Err(SendError::Closed) => {}
        Err(SendError::Full) => {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                connection_id = %conn.id(),
                user_id = %conn.user_id(),
                "outbound queue full, frame dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::tests::make_connection;
    use sitehub_core::{Action, InboundEnvelope};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn spawn_hub() -> (HubHandle, CancellationToken, JoinHandle<()>) {
        let (hub, handle) = Hub::new(64);
        let token = CancellationToken::new();
        let task = tokio::spawn(hub.run(token.clone()));
        (handle, token, task)
    }

    async fn next(rx: &mut mpsc::Receiver<Frame>) -> InboundEnvelope {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("queue closed");
        InboundEnvelope::decode(frame.as_str().as_bytes()).unwrap()
    }

    fn user_ids(envelope: &InboundEnvelope) -> Vec<String> {
        envelope
            .payload
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["user_id"].as_str().unwrap().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn register_sends_snapshot_then_join_to_others() {
        let (hub, _token, _task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        let (b, mut b_rx) = make_connection("p1", "bob", 16);

        hub.register(a.clone()).await.unwrap();
        let list = next(&mut a_rx).await;
        assert_eq!(list.action, Action::PresenceList);
        assert_eq!(user_ids(&list), vec!["alice"]);

        hub.register(b.clone()).await.unwrap();
        let join = next(&mut a_rx).await;
        assert_eq!(join.action, Action::PresenceJoin);
        assert_eq!(join.payload["user_id"], "bob");

        let list = next(&mut b_rx).await;
        assert_eq!(list.action, Action::PresenceList);
        assert_eq!(user_ids(&list), vec!["alice", "bob"]);
        assert!(b_rx.try_recv().is_err(), "joiner must not see its own join");
    }

    #[tokio::test]
    async fn second_tab_does_not_announce_join_or_leave() {
        let (hub, _token, _task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        let (b1, _b1_rx) = make_connection("p1", "bob", 16);
        let (b2, mut b2_rx) = make_connection("p1", "bob", 16);

        hub.register(a.clone()).await.unwrap();
        hub.register(b1.clone()).await.unwrap();
        hub.register(b2.clone()).await.unwrap();
        let _ = next(&mut a_rx).await; // own list
        let _ = next(&mut a_rx).await; // bob joined
        let list = next(&mut b2_rx).await;
        assert_eq!(user_ids(&list), vec!["alice", "bob"]);

        hub.unregister(b1.clone()).await.unwrap();
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 2);
        assert!(a_rx.try_recv().is_err(), "bob still has a tab open");

        hub.unregister(b2.clone()).await.unwrap();
        let leave = next(&mut a_rx).await;
        assert_eq!(leave.action, Action::PresenceLeave);
        assert_eq!(leave.payload, serde_json::json!({"user_id": "bob"}));
    }

    #[tokio::test]
    async fn room_exists_iff_it_has_members() {
        let (hub, _token, _task) = spawn_hub();
        let (a, _a_rx) = make_connection("p1", "alice", 16);
        let (b, _b_rx) = make_connection("p2", "bob", 16);

        hub.register(a.clone()).await.unwrap();
        hub.register(b.clone()).await.unwrap();
        assert_eq!(
            hub.stats().await.unwrap(),
            HubStats {
                rooms: 2,
                connections: 2
            }
        );

        hub.unregister(a.clone()).await.unwrap();
        assert_eq!(hub.stats().await.unwrap().rooms, 1);
        assert!(hub.room_members(ProjectId::from("p1")).await.unwrap().is_empty());
        assert_eq!(
            hub.room_members(ProjectId::from("p2")).await.unwrap(),
            vec![b.id().clone()]
        );
    }

    #[tokio::test]
    async fn double_unregister_is_noop() {
        let (hub, _token, _task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        let (b, _b_rx) = make_connection("p1", "bob", 16);
        hub.register(a.clone()).await.unwrap();
        hub.register(b.clone()).await.unwrap();
        let _ = next(&mut a_rx).await;
        let _ = next(&mut a_rx).await;

        hub.unregister(b.clone()).await.unwrap();
        hub.unregister(b.clone()).await.unwrap();
        let _ = hub.stats().await.unwrap();

        assert_eq!(next(&mut a_rx).await.action, Action::PresenceLeave);
        assert!(a_rx.try_recv().is_err(), "leave must be sent once");
        assert!(b.is_closed());
    }

    #[tokio::test]
    async fn unregister_closes_queue_after_pending_frames() {
        let (hub, _token, _task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        hub.register(a.clone()).await.unwrap();
        hub.unregister(a.clone()).await.unwrap();

        assert_eq!(next(&mut a_rx).await.action, Action::PresenceList);
        assert!(a_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn broadcast_respects_exclude_and_room_scope() {
        let (hub, _token, _task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        let (b, mut b_rx) = make_connection("p1", "bob", 16);
        let (c, mut c_rx) = make_connection("p2", "carol", 16);
        for conn in [&a, &b, &c] {
            hub.register(conn.clone()).await.unwrap();
        }
        let _ = next(&mut a_rx).await;
        let _ = next(&mut a_rx).await;
        let _ = next(&mut b_rx).await;
        let _ = next(&mut c_rx).await;

        hub.broadcast(ProjectId::from("p1"), Frame::from("{\"x\":1}"), Some(a.id().clone()))
            .await
            .unwrap();
        let _ = hub.stats().await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap().as_str(), "{\"x\":1}");
        assert!(a_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_absent_room_is_noop() {
        let (hub, _token, _task) = spawn_hub();
        hub.broadcast(ProjectId::from("ghost"), Frame::from("x"), None)
            .await
            .unwrap();
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn full_member_is_skipped_without_blocking() {
        let (hub, _token, _task) = spawn_hub();
        let (slow, _slow_rx) = make_connection("p1", "slow", 1);
        let (fast, mut fast_rx) = make_connection("p1", "fast", 16);
        hub.register(slow.clone()).await.unwrap(); // fills slow's queue
        hub.register(fast.clone()).await.unwrap();
        let _ = next(&mut fast_rx).await;

        hub.broadcast(ProjectId::from("p1"), Frame::from("payload"), None)
            .await
            .unwrap();
        let _ = hub.stats().await.unwrap();

        assert_eq!(fast_rx.recv().await.unwrap().as_str(), "payload");
        assert!(slow.drop_count() >= 2);
    }

    #[tokio::test]
    async fn presence_query_is_deduplicated() {
        let (hub, _token, _task) = spawn_hub();
        let mut queues = Vec::new();
        for user in ["bob", "alice", "bob"] {
            let (conn, rx) = make_connection("p1", user, 16);
            queues.push(rx);
            hub.register(conn).await.unwrap();
        }
        let presence = hub.presence(ProjectId::from("p1")).await.unwrap();
        let ids: Vec<_> = presence.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn cancel_closes_every_queue() {
        let (hub, token, task) = spawn_hub();
        let (a, mut a_rx) = make_connection("p1", "alice", 16);
        hub.register(a.clone()).await.unwrap();
        let _ = next(&mut a_rx).await;

        token.cancel();
        task.await.unwrap();
        assert!(a.is_closed());
        assert!(a_rx.recv().await.is_none());
        assert!(matches!(hub.stats().await, Err(HubError::HubUnavailable)));
    }
}
