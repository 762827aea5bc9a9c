//! fileherd library -- controller and file servers for a small distributed
//! storage testbed.
//!
//! A single controller tracks which file servers are alive and which server
//! holds each named file.  File servers register over a long-lived TCP
//! connection whose lifetime is their liveness signal, and serve directory
//! and file operations on a local root directory.

use std::sync::Arc;

pub mod client;
pub mod config;
pub mod controller;
pub mod errors;
pub mod fileserver;
pub mod handlers;
pub mod logging;
pub mod membership;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod server;

use crate::config::Config;
use crate::controller::Controller;
use crate::fileserver::LocalDirectory;

/// Shared controller state passed to handlers via `axum::extract::State`.
pub struct ControllerState {
    /// Process configuration.
    pub config: Config,
    /// Membership and file registry.
    pub controller: Arc<Controller>,
}

/// Shared file server state.
pub struct FileServerState {
    /// Root every request path is resolved against.
    pub directory: LocalDirectory,
}
