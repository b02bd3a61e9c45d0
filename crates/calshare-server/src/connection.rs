//! WebSocket accept loop and per-connection plumbing.
//!
//! Each accepted socket gets two tasks: the reader (this function's own
//! loop) feeding the dispatcher, and a spawned writer draining the
//! session's outbound queue into the sink. Either side ending tears the
//! whole connection down and deregisters the session.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch;
use crate::registry::{SessionHandle, OUTBOUND_QUEUE};
use crate::state::ServerState;

/// Accept connections until `shutdown` is cancelled. Each connection runs
/// in its own task; in-flight connections are closed separately via
/// `SessionRegistry::close_all`.
pub async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        debug!(%peer, "incoming connection");
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, state).await {
                                debug!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.cancelled() => {
                info!("accept loop stopped");
                return;
            }
        }
    }
}

/// Drive one client connection from handshake to teardown.
async fn handle_connection(
    socket: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), crate::error::ServerError> {
    let ws = tokio_tungstenite::accept_async(socket).await?;
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_QUEUE);
    let session = Arc::new(SessionHandle::new(Uuid::new_v4(), tx));
    let session_id = session.id;
    state.registry.add(session.clone()).await;
    info!(session = %session_id, "client connected");

    // Writer: drains the outbound queue. Exits when the queue closes or
    // the session is asked to shut down, sending a close frame on the way
    // out.
    let closed = session.closed_token();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if sink.send(Message::text(text.as_str())).await.is_err() {
                        break;
                    }
                }
                _ = closed.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: everything the client sends funnels through the dispatcher.
    let closed = session.closed_token();
    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch::handle_message(&state, &session, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session = %session_id, error = %e, "read error");
                        break;
                    }
                }
            }
            _ = closed.cancelled() => break,
        }
    }

    state.registry.remove(session_id).await;
    session.close();
    let _ = writer.await;
    info!(session = %session_id, "client disconnected");
    Ok(())
}
