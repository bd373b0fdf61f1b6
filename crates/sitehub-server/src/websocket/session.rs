//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! Each session runs a read loop on the upgrade task and a write loop on
//! its own task. The write loop drains the connection's outbound queue and
//! sends keepalive pings; the read loop hands frames to the message
//! handler and enforces the pong deadline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::connection::{Connection, Frame};
use super::hub::HubHandle;
use super::router::MessageHandler;
use crate::config::ConnectionConfig;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Run a session for an admitted connection.
///
/// 1. Registers the connection with the hub
/// 2. Spawns the write loop over `outbound`
/// 3. Dispatches inbound frames to `handler` until the peer goes away
/// 4. Unregisters, which closes the queue and lets the writer finish
#[instrument(skip_all, fields(
    connection_id = %connection.id(),
    project_id = %connection.project_id(),
    user_id = %connection.user_id(),
))]
pub async fn run_session(
    socket: WebSocket,
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Frame>,
    hub: HubHandle,
    handler: Arc<dyn MessageHandler>,
    config: ConnectionConfig,
) {
    if let Err(e) = hub.register(connection.clone()).await {
        warn!("dropping connection: {e}");
        return;
    }

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (ws_tx, ws_rx) = socket.split();
    let cancel = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        outbound,
        config.clone(),
        cancel.clone(),
    ));

    read_loop(ws_rx, &connection, handler.as_ref(), &config, &cancel).await;

    if hub.unregister(connection.clone()).await.is_err() {
        let _ = connection.close();
    }
    if tokio::time::timeout(config.write_timeout, &mut writer).await.is_err() {
        debug!("write loop did not finish in time, aborting");
        writer.abort();
    }

    info!(
        duration_secs = connection.age().as_secs_f64(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

async fn read_loop<S>(
    mut ws_rx: S,
    conn: &Arc<Connection>,
    handler: &dyn MessageHandler,
    config: &ConnectionConfig,
    cancel: &CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let deadline = config.pong_timeout.saturating_sub(conn.last_pong_elapsed());
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = tokio::time::timeout(deadline, ws_rx.next()) => next,
        };
        let msg = match next {
            Err(_elapsed) => {
                warn!("client unresponsive for {:?}, disconnecting", config.pong_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "read failed");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => dispatch(conn, handler, text.as_str().as_bytes()).await,
            Message::Binary(data) => dispatch(conn, handler, &data).await,
            Message::Ping(_) | Message::Pong(_) => conn.mark_alive(),
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
        }
    }
}

async fn dispatch(conn: &Arc<Connection>, handler: &dyn MessageHandler, raw: &[u8]) {
    let Err(err) = handler.handle_message(conn, raw).await else {
        return;
    };
    match err.reply(conn.project_id().clone()).encode() {
        Ok(json) => {
            if let Err(e) = conn.send(Frame::from(json)) {
                debug!(code = err.code(), "error reply not enqueued: {e}");
            }
        }
        Err(e) => error!(error = %e, "failed to encode error reply"),
    }
}

async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<Frame>,
    config: ConnectionConfig,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ping = tokio::time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = outbound.recv() => {
                let Some(frame) = next else {
                    debug!("outbound queue closed");
                    break;
                };
                let batch = write_batch(&mut ws_tx, &mut outbound, frame, config.max_coalesce);
                match tokio::time::timeout(config.write_timeout, batch).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "write failed");
                        break;
                    }
                    Err(_elapsed) => {
                        warn!("write stalled for {:?}, disconnecting", config.write_timeout);
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                let sent = tokio::time::timeout(
                    config.write_timeout,
                    ws_tx.send(Message::Ping(Bytes::new())),
                )
                .await;
                if !matches!(sent, Ok(Ok(()))) {
                    debug!("ping failed");
                    break;
                }
            }
        }
    }

    // Stop the read loop too, whichever side failed first.
    cancel.cancel();
    let _ = tokio::time::timeout(config.write_timeout, ws_tx.close()).await;
}

/// Write `first` plus up to `max_coalesce` already-queued frames, then flush.
async fn write_batch<S>(
    ws_tx: &mut S,
    outbound: &mut mpsc::Receiver<Frame>,
    first: Frame,
    max_coalesce: usize,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    ws_tx.feed(Message::Text(first)).await?;
    for _ in 0..max_coalesce {
        let Ok(frame) = outbound.try_recv() else {
            break;
        };
        ws_tx.feed(Message::Text(frame)).await?;
    }
    ws_tx.flush().await
}
