//! Error types for the controller and the file server.
//!
//! Every variant carries a stable string code.  Both enums implement
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ControllerError::InvalidArgument { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// JSON body rendered for every error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

fn render(status: StatusCode, code: &str, message: String) -> Response {
    (status, axum::Json(ErrorBody { code, message })).into_response()
}

/// Controller-side failures.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No file record exists under the requested name.
    ///
    /// Lookups report this as `found: false` rather than an error; the
    /// variant names the code for callers that need one.
    #[error("file not found: {name}")]
    NotFound { name: String },

    /// A file was added while no file server is registered.
    #[error("no file servers available")]
    NoServersAvailable,

    /// A file server tried to register an address that is already active.
    #[error("address already registered: {addr}")]
    DuplicateAddress { addr: String },

    /// A file was added under a name that is already tracked.
    #[error("file already exists: {name}")]
    DuplicateName { name: String },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ControllerError {
    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::NotFound { .. } => "NotFound",
            ControllerError::NoServersAvailable => "NoServersAvailable",
            ControllerError::DuplicateAddress { .. } => "DuplicateAddress",
            ControllerError::DuplicateName { .. } => "DuplicateName",
            ControllerError::InvalidArgument { .. } => "InvalidArgument",
            ControllerError::Internal(_) => "InternalError",
        }
    }

    /// Return the HTTP status code used when this error escapes a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControllerError::NotFound { .. } => StatusCode::NOT_FOUND,
            ControllerError::NoServersAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::DuplicateAddress { .. } => StatusCode::CONFLICT,
            ControllerError::DuplicateName { .. } => StatusCode::CONFLICT,
            ControllerError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ControllerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        render(self.status_code(), self.code(), self.to_string())
    }
}

/// File server failures, including its registration with the controller.
#[derive(Debug, Error)]
pub enum FileServerError {
    /// The request path escapes the root directory or is otherwise unusable.
    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    /// Local filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Dialing or talking to the controller failed.
    #[error("controller transport error: {message}")]
    Transport { message: String },

    /// The controller refused the registration.
    #[error("registration rejected ({code}): {message}")]
    RegistrationRejected { code: String, message: String },

    /// A registration frame could not be encoded or decoded.
    #[error("malformed registration frame: {0}")]
    Protocol(#[from] serde_json::Error),
}

impl FileServerError {
    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            FileServerError::InvalidPath { .. } => "InvalidPath",
            FileServerError::Io(_) => "IoError",
            FileServerError::Transport { .. } => "TransportError",
            FileServerError::RegistrationRejected { .. } => "RegistrationRejected",
            FileServerError::Protocol(_) => "ProtocolError",
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileServerError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            FileServerError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            FileServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FileServerError::Transport { .. } => StatusCode::BAD_GATEWAY,
            FileServerError::RegistrationRejected { .. } => StatusCode::CONFLICT,
            FileServerError::Protocol(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for FileServerError {
    fn into_response(self) -> Response {
        render(self.status_code(), self.code(), self.to_string())
    }
}
