//! Per-connection liveness watcher.
//!
//! There is no heartbeat: a file server is alive for as long as its
//! registration connection is open.  Each accepted registration gets one
//! watcher task that owns the connection and blocks on reading it.  When
//! the read reports end-of-stream, an error, or an explicit `unregister`
//! frame, the watcher sends a single [`DeregistrationEvent`] and exits.
//!
//! Half-open connections (peer vanished without a FIN or RST) are only
//! noticed once the transport itself gives up; detection latency is bounded
//! by the OS TCP timeouts, not by this crate.

use std::fmt;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::types::{Address, ConnectionId};
use super::wire::{NodeConnection, NodeFrame};

/// Why a watcher gave up on its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection cleanly.
    Closed,
    /// Peer sent an explicit `unregister` frame.
    Unregistered,
    /// Reading the connection failed.
    Error(String),
}

impl DisconnectReason {
    /// Short label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::Unregistered => "unregistered",
            DisconnectReason::Error(_) => "error",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Error(e) => write!(f, "error: {e}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Emitted once per watcher when its connection goes away.
#[derive(Debug, Clone)]
pub struct DeregistrationEvent {
    pub addr: Address,
    pub conn: ConnectionId,
    pub reason: DisconnectReason,
}

/// Watch `conn` until it closes, then report on `events`.
///
/// If `stop` resolves first (its sender was dropped because the entry was
/// already removed), the watcher exits without reporting and the connection
/// is closed when it goes out of scope.
pub async fn watch<R, W>(
    addr: Address,
    conn_id: ConnectionId,
    mut conn: NodeConnection<R, W>,
    mut stop: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<DeregistrationEvent>,
) where
    R: AsyncRead + Unpin,
{
    debug!(%addr, %conn_id, peer = %conn.peer, "liveness watcher started");

    let reason = loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(%addr, %conn_id, "entry removed elsewhere, releasing connection");
                return;
            }
            frame = conn.frames.next_frame::<NodeFrame>() => match frame {
                Ok(None) => break DisconnectReason::Closed,
                Ok(Some(NodeFrame::Unregister)) => break DisconnectReason::Unregistered,
                Ok(Some(NodeFrame::Register { addr: again })) => {
                    warn!(%addr, %conn_id, %again, "ignoring repeated register frame");
                }
                Err(e) => break DisconnectReason::Error(e.to_string()),
            },
        }
    };

    debug!(%addr, %conn_id, %reason, "connection lost");
    if events
        .send(DeregistrationEvent {
            addr: addr.clone(),
            conn: conn_id,
            reason,
        })
        .is_err()
    {
        debug!(%addr, %conn_id, "controller gone, dropping deregistration event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::wire::{write_frame, FrameReader};
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    type Conn = NodeConnection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair() -> (Conn, DuplexStream) {
        let (controller_side, node_side) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(controller_side);
        (NodeConnection::new("test-peer", FrameReader::new(r), w), node_side)
    }

    fn addr() -> Address {
        Address::parse("node-a:2126").unwrap()
    }

    #[tokio::test]
    async fn test_close_emits_one_event() {
        let (conn, node) = pair();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(addr(), ConnectionId(7), conn, stop_rx, tx));

        drop(node);
        task.await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.addr, addr());
        assert_eq!(event.conn, ConnectionId(7));
        assert_eq!(event.reason, DisconnectReason::Closed);
        assert!(rx.recv().await.is_none(), "exactly one event");
    }

    #[tokio::test]
    async fn test_unregister_frame_emits_one_event() {
        let (conn, mut node) = pair();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(addr(), ConnectionId(1), conn, stop_rx, tx));

        write_frame(&mut node, &NodeFrame::Unregister).await.unwrap();
        task.await.unwrap();
        // The close that follows must not produce a second event.
        drop(node);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.reason, DisconnectReason::Unregistered);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_exits_silently() {
        let (conn, _node) = pair();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(addr(), ConnectionId(1), conn, stop_rx, tx));

        drop(stop_tx);
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_reports_error() {
        let (conn, mut node) = pair();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(addr(), ConnectionId(1), conn, stop_rx, tx));

        node.write_all(b"not json\n").await.unwrap();
        task.await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.reason, DisconnectReason::Error(_)));
        assert_eq!(event.reason.as_str(), "error");
    }

    #[tokio::test]
    async fn test_repeated_register_is_ignored() {
        let (conn, mut node) = pair();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(addr(), ConnectionId(1), conn, stop_rx, tx));

        write_frame(
            &mut node,
            &NodeFrame::Register {
                addr: "node-a:2126".to_string(),
            },
        )
        .await
        .unwrap();
        drop(node);
        task.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().reason, DisconnectReason::Closed);
    }
}
