//! Registration listener.
//!
//! Accepts file server connections, reads the `register` frame (the
//! entry's `Pending` phase) and hands the connection to
//! [`Controller::register`], which answers and spawns the watcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::types::Address;
use super::wire::{ControllerFrame, FrameReader, NodeConnection, NodeFrame};
use crate::controller::Controller;

/// Accept registration connections on `listener` forever.
///
/// Each connection is handled on its own task so a slow handshake never
/// blocks other nodes.
pub async fn serve_registrations(
    listener: TcpListener,
    controller: Arc<Controller>,
    handshake_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "registration connection accepted");
                let controller = controller.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer.to_string(), controller, handshake_timeout)
                        .await;
                });
            }
            Err(e) => {
                warn!("Failed to accept registration connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: String,
    controller: Arc<Controller>,
    handshake_timeout: Duration,
) {
    let (read, write) = stream.into_split();
    let mut conn = NodeConnection::new(peer, FrameReader::new(read), write);

    let frame = tokio::time::timeout(handshake_timeout, conn.frames.next_frame::<NodeFrame>()).await;
    let raw_addr = match frame {
        Ok(Ok(Some(NodeFrame::Register { addr }))) => addr,
        Ok(Ok(Some(other))) => {
            warn!(peer = %conn.peer, ?other, "expected register frame");
            return;
        }
        Ok(Ok(None)) => {
            debug!(peer = %conn.peer, "connection closed before registering");
            return;
        }
        Ok(Err(e)) => {
            warn!(peer = %conn.peer, "Failed to read register frame: {}", e);
            return;
        }
        Err(_) => {
            warn!(peer = %conn.peer, "registration handshake timed out");
            return;
        }
    };

    let addr = match Address::parse(raw_addr) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(peer = %conn.peer, "Rejecting registration: {}", e);
            if let Err(io) = conn.reply(&ControllerFrame::from(&e)).await {
                debug!(peer = %conn.peer, "Failed to send rejection: {}", io);
            }
            return;
        }
    };

    let peer = conn.peer.clone();
    match controller.register(addr.clone(), conn).await {
        Ok(conn_id) => info!(%addr, %peer, %conn_id, "file server registered"),
        Err(e) => warn!(%addr, %peer, "Registration rejected: {}", e),
    }
}
