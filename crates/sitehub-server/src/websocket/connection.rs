//! One live client connection: identity, room binding and outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use sitehub_core::{ConnectionId, PresenceEntry, ProjectId, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

/// An encoded outbound text frame. Clones share one buffer, so a fan-out
/// serializes once.
pub type Frame = Utf8Bytes;

/// Why a frame was not enqueued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is at capacity; the frame was dropped.
    #[error("outbound queue full")]
    Full,
    /// The outbound queue has been closed.
    #[error("outbound queue closed")]
    Closed,
}

/// A connected client bound to one project for its whole lifetime.
///
/// The outbound queue is multi-producer: the hub and the connection's own
/// read loop enqueue, the write loop drains. Enqueueing never waits.
pub struct Connection {
    id: ConnectionId,
    project_id: ProjectId,
    user: PresenceEntry,
    /// `None` once closed. Dropping the sender ends the write loop.
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    connected_at: Instant,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a connection around an existing queue sender.
    pub fn new(project_id: ProjectId, user: PresenceEntry, tx: mpsc::Sender<Frame>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            project_id,
            user,
            tx: Mutex::new(Some(tx)),
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a connection together with its bounded outbound queue.
    pub fn channel(
        project_id: ProjectId,
        user: PresenceEntry,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(project_id, user, tx)), rx)
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Project (room) this connection is bound to.
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Owning user.
    pub fn user_id(&self) -> &UserId {
        &self.user.user_id
    }

    /// Presence entry advertised for this connection's user.
    pub fn presence(&self) -> &PresenceEntry {
        &self.user
    }

    /// Enqueue a frame without waiting.
    ///
    /// A full queue drops the frame and bumps the drop counter.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SendError::Closed);
        };
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Close the outbound queue. Returns `true` only for the call that
    /// actually closed it.
    ///
    /// Frames already queued are still delivered by the write loop.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Total frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a keepalive acknowledgement.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last pong (or since the connection was established).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("user_id", &self.user.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
