//! Connections, rooms, the hub loop, message routing and session lifecycle.

pub mod connection;
pub mod hub;
pub mod room;
pub mod router;
pub mod session;

pub use connection::{Connection, Frame, SendError};
pub use hub::{BroadcastRequest, Hub, HubHandle, HubStats};
pub use router::{MessageHandler, MessageRouter};
pub use session::run_session;
