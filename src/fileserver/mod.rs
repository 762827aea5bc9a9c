//! The file server process: a local directory exposed over RPC, present in
//! the controller's membership for as long as it runs.
//!
//! [`start`] binds the listener first (so an ephemeral port is known before
//! registering), registers with the controller, and only then starts
//! serving.  A failed registration drops the listener unused.

pub mod local;
pub mod registration;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use local::LocalDirectory;
pub use registration::ControllerLink;

use crate::config::FileServerConfig;
use crate::errors::FileServerError;
use crate::server::fileserver_app;
use crate::FileServerState;

/// A running, registered file server.
pub struct FileServerHandle {
    addr: SocketAddr,
    link: ControllerLink,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl FileServerHandle {
    /// Bound address of the RPC listener.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address this server registered under.
    pub fn advertise(&self) -> &str {
        self.link.advertise()
    }

    /// Leave the membership, then drain and close the listener.
    pub async fn stop(self) -> Result<(), FileServerError> {
        let advertise = self.link.advertise().to_string();
        self.link.close().await;
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(result) => result?,
            Err(e) => return Err(FileServerError::Io(std::io::Error::other(e))),
        }
        info!(%advertise, "file server stopped");
        Ok(())
    }
}

/// Start a file server described by `config`.
///
/// Must be called from inside a tokio runtime.
pub async fn start(config: &FileServerConfig) -> Result<FileServerHandle, FileServerError> {
    let directory = LocalDirectory::new(&config.root_dir)?;
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    let advertise = advertise_addr(config, addr);

    let link = ControllerLink::register(&config.controller, &advertise, config.register_timeout())
        .await
        .inspect_err(|e| warn!(controller = %config.controller, %advertise, "Registration failed: {}", e))?;

    let state = Arc::new(FileServerState { directory });
    let app = fileserver_app(state);
    let (shutdown, stop) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop.await;
            })
            .await
    });

    info!(%addr, %advertise, root = %config.root_dir, "file server listening");
    Ok(FileServerHandle {
        addr,
        link,
        shutdown,
        task,
    })
}

/// Address announced to the controller.
///
/// An explicit `advertise` wins; otherwise the bound address is used, with
/// an unspecified host replaced by loopback.
fn advertise_addr(config: &FileServerConfig, bound: SocketAddr) -> String {
    if let Some(advertise) = &config.advertise {
        return advertise.clone();
    }
    if bound.ip().is_unspecified() {
        format!("127.0.0.1:{}", bound.port())
    } else {
        bound.to_string()
    }
}
