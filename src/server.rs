//! Axum router construction and listener lifecycle.
//!
//! [`controller_app`] and [`fileserver_app`] wire the RPC endpoints of each
//! process to their handlers.  [`start_controller`] binds both controller
//! listeners (client RPC and node registration) and serves them until
//! [`ControllerServer::shutdown`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::config::Config;
use crate::controller::Controller;
use crate::handlers;
use crate::membership::acceptor::serve_registrations;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::{ControllerState, FileServerState};

// -- OpenAPI document ---------------------------------------------------------

/// OpenAPI documentation for the controller RPC surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fileherd controller",
        version = "0.1.0",
        description = "File server membership and file placement"
    ),
    paths(
        health_check,
        handlers::controller::get_file_servers,
        handlers::controller::add_file,
        handlers::controller::list_files,
        handlers::controller::find_file,
        handlers::controller::remove_file,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Membership", description = "Registered file servers"),
        (name = "Files", description = "File placement and lookup"),
    )
)]
pub struct ControllerApiDoc;

/// OpenAPI documentation for the file server RPC surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fileherd file server",
        version = "0.1.0",
        description = "Directory and file operations under a root directory"
    ),
    paths(
        health_check,
        handlers::fileserver::make_directory,
        handlers::fileserver::remove_directory,
        handlers::fileserver::write_file,
        handlers::fileserver::remove_file,
        handlers::fileserver::list_dir,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "FileServer", description = "Local filesystem operations"),
    )
)]
pub struct FileServerApiDoc;

/// Build the controller [`Router`].
pub fn controller_app(state: Arc<ControllerState>) -> Router {
    let observability = state.config.observability.clone();

    let mut router = Router::new()
        .route("/fileservers", get(handlers::controller::get_file_servers))
        .route(
            "/files",
            get(handlers::controller::list_files).post(handlers::controller::add_file),
        )
        // Wildcard so names may contain slashes.
        .route(
            "/files/*name",
            get(handlers::controller::find_file).delete(handlers::controller::remove_file),
        )
        .route(
            "/openapi.json",
            get(|| async { Json(ControllerApiDoc::openapi()) }),
        );
    if observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Build the file server [`Router`].
pub fn fileserver_app(state: Arc<FileServerState>) -> Router {
    Router::new()
        .route("/dir/make", post(handlers::fileserver::make_directory))
        .route("/dir/remove", post(handlers::fileserver::remove_directory))
        .route("/dir/list", post(handlers::fileserver::list_dir))
        .route("/file/write", post(handlers::fileserver::write_file))
        .route("/file/remove", post(handlers::fileserver::remove_file))
        .route("/health", get(health_check))
        .route(
            "/openapi.json",
            get(|| async { Json(FileServerApiDoc::openapi()) }),
        )
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Controller lifecycle ----------------------------------------------------

/// A running controller: the RPC listener plus the registration listener.
pub struct ControllerServer {
    rpc_addr: SocketAddr,
    register_addr: SocketAddr,
    controller: Arc<Controller>,
    shutdown: oneshot::Sender<()>,
    rpc: JoinHandle<std::io::Result<()>>,
    registrations: JoinHandle<()>,
}

impl ControllerServer {
    /// Bound address of the client RPC listener.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Bound address file servers register on.
    pub fn register_addr(&self) -> SocketAddr {
        self.register_addr
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Stop accepting registrations, release every registered file server
    /// and drain the RPC listener.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.registrations.abort();
        self.controller.deregister_all();
        let _ = self.shutdown.send(());
        self.rpc
            .await
            .context("controller RPC task panicked")?
            .context("controller RPC server failed")?;
        info!("controller stopped");
        Ok(())
    }
}

/// Bind both controller listeners and start serving.
///
/// Port `0` in either address picks an ephemeral port; the bound addresses
/// are available on the returned [`ControllerServer`].  Must be called from
/// inside a tokio runtime.
pub async fn start_controller(config: &Config) -> anyhow::Result<ControllerServer> {
    let rpc_listener = TcpListener::bind(config.controller.rpc_addr())
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", config.controller.rpc_addr()))?;
    let register_listener = TcpListener::bind(config.controller.register_addr())
        .await
        .with_context(|| {
            format!(
                "failed to bind registration listener on {}",
                config.controller.register_addr()
            )
        })?;
    let rpc_addr = rpc_listener.local_addr()?;
    let register_addr = register_listener.local_addr()?;

    let controller = Controller::from_config(&config.controller);
    let state = Arc::new(ControllerState {
        config: config.clone(),
        controller: controller.clone(),
    });

    let registrations = tokio::spawn(serve_registrations(
        register_listener,
        controller.clone(),
        config.controller.handshake_timeout(),
    ));

    let (shutdown, stop) = oneshot::channel::<()>();
    let app = controller_app(state);
    let rpc = tokio::spawn(async move {
        axum::serve(rpc_listener, app)
            .with_graceful_shutdown(async {
                if stop.await.is_err() {
                    warn!("controller shutdown handle dropped");
                }
            })
            .await
    });

    info!(%rpc_addr, %register_addr, "controller listening");
    Ok(ControllerServer {
        rpc_addr,
        register_addr,
        controller,
        shutdown,
        rpc,
        registrations,
    })
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
