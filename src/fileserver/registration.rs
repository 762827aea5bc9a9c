//! The file server's side of the registration connection.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::errors::FileServerError;
use crate::membership::wire::{write_frame, ControllerFrame, FrameReader, NodeFrame};

/// An accepted registration.  Membership lasts as long as this link is
/// open; dropping it also ends the membership, just without the explicit
/// `unregister` frame.
#[derive(Debug)]
pub struct ControllerLink {
    controller: String,
    advertise: String,
    // Kept open for the lifetime of the membership.
    _frames: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControllerLink {
    /// Dial `controller`, register as `advertise`, and wait for the answer.
    ///
    /// The whole exchange is bounded by `timeout`.
    pub async fn register(
        controller: &str,
        advertise: &str,
        timeout: Duration,
    ) -> Result<Self, FileServerError> {
        match tokio::time::timeout(timeout, Self::handshake(controller, advertise)).await {
            Ok(result) => result,
            Err(_) => Err(FileServerError::Transport {
                message: format!(
                    "no registration reply from {} within {:?}",
                    controller, timeout
                ),
            }),
        }
    }

    async fn handshake(controller: &str, advertise: &str) -> Result<Self, FileServerError> {
        let transport = |e: std::io::Error| FileServerError::Transport {
            message: format!("{}: {}", controller, e),
        };

        let stream = TcpStream::connect(controller).await.map_err(transport)?;
        let _ = stream.set_nodelay(true);
        let (read, mut writer) = stream.into_split();
        let mut frames = FrameReader::new(read);

        write_frame(
            &mut writer,
            &NodeFrame::Register {
                addr: advertise.to_string(),
            },
        )
        .await
        .map_err(transport)?;
        debug!(controller, advertise, "register frame sent");

        match frames.next_frame::<ControllerFrame>().await {
            Ok(Some(ControllerFrame::Accepted)) => {
                info!(controller, advertise, "registered with controller");
                Ok(Self {
                    controller: controller.to_string(),
                    advertise: advertise.to_string(),
                    _frames: frames,
                    writer,
                })
            }
            Ok(Some(ControllerFrame::Rejected { code, message })) => {
                Err(FileServerError::RegistrationRejected { code, message })
            }
            Ok(None) => Err(FileServerError::Transport {
                message: format!("{} closed the connection during registration", controller),
            }),
            Err(e) => Err(malformed_reply(e).unwrap_or_else(transport)),
        }
    }

    pub fn advertise(&self) -> &str {
        &self.advertise
    }

    /// Leave the membership: send `unregister`, then close the connection.
    ///
    /// Errors are only logged; the controller also treats the close itself
    /// as a departure.
    pub async fn close(mut self) {
        if let Err(e) = write_frame(&mut self.writer, &NodeFrame::Unregister).await {
            debug!(controller = %self.controller, "Failed to send unregister: {}", e);
        }
        if let Err(e) = self.writer.shutdown().await {
            debug!(controller = %self.controller, "Failed to close registration link: {}", e);
        }
        info!(controller = %self.controller, advertise = %self.advertise, "unregistered from controller");
    }
}

/// A reply that arrived but did not decode as a frame.
fn malformed_reply(e: std::io::Error) -> Result<FileServerError, std::io::Error> {
    if e.kind() != std::io::ErrorKind::InvalidData {
        return Err(e);
    }
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<serde_json::Error>()) {
        Some(Ok(json)) => Ok(FileServerError::Protocol(*json)),
        Some(Err(other)) => Err(std::io::Error::new(kind, other)),
        None => Err(std::io::Error::from(kind)),
    }
}
