//! Registration connection framing.
//!
//! A file server registers by opening a TCP connection to the controller
//! and keeping it open.  Both directions carry newline-delimited JSON
//! frames:
//!
//! ```text
//! node -> controller   {"type":"register","addr":"10.0.0.7:2126"}
//! controller -> node   {"type":"accepted"}
//!                      {"type":"rejected","code":"DuplicateAddress","message":"..."}
//! node -> controller   {"type":"unregister"}            (optional, before closing)
//! ```
//!
//! After the handshake the connection carries no further traffic; its
//! lifetime is the node's liveness signal.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::errors::ControllerError;

/// Upper bound on a single frame, newline included.
pub const MAX_FRAME_LEN: u64 = 16 * 1024;

/// Frames sent by a file server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeFrame {
    Register { addr: String },
    Unregister,
}

/// Frames sent by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerFrame {
    Accepted,
    Rejected { code: String, message: String },
}

impl From<&ControllerError> for ControllerFrame {
    fn from(err: &ControllerError) -> Self {
        ControllerFrame::Rejected {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Reads newline-delimited JSON frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            line: String::new(),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream.  Blank lines are
    /// skipped.  Oversized or malformed frames yield
    /// [`io::ErrorKind::InvalidData`].
    pub async fn next_frame<T: DeserializeOwned>(&mut self) -> io::Result<Option<T>> {
        loop {
            self.line.clear();
            let n = (&mut self.inner)
                .take(MAX_FRAME_LEN)
                .read_line(&mut self.line)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if !self.line.ends_with('\n') {
                if n as u64 >= MAX_FRAME_LEN {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
                }
                // Peer closed mid-frame.
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside a frame",
                ));
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        }
    }
}

/// Serialize `frame` as one line and flush it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(frame).map_err(io::Error::from)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// A registration connection after its `register` frame has been read.
///
/// Owned 1:1 by the liveness watcher once the registration is accepted;
/// dropping it closes the connection.
#[derive(Debug)]
pub struct NodeConnection<R, W> {
    /// Remote socket address, for logging.
    pub peer: String,
    pub frames: FrameReader<R>,
    pub writer: W,
}

impl<R, W> NodeConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(peer: impl Into<String>, frames: FrameReader<R>, writer: W) -> Self {
        Self {
            peer: peer.into(),
            frames,
            writer,
        }
    }

    pub async fn reply(&mut self, frame: &ControllerFrame) -> io::Result<()> {
        write_frame(&mut self.writer, frame).await
    }
}
