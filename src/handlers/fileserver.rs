//! File server RPC handlers.
//!
//! Filesystem calls are blocking, so each one runs on the blocking pool.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::errors::FileServerError;
use crate::fileserver::LocalDirectory;
use crate::protocol::{DirEntry, PathRequest, WriteFileRequest};
use crate::FileServerState;

async fn blocking<T, F>(directory: &LocalDirectory, f: F) -> Result<T, FileServerError>
where
    T: Send + 'static,
    F: FnOnce(&LocalDirectory) -> Result<T, FileServerError> + Send + 'static,
{
    let directory = directory.clone();
    tokio::task::spawn_blocking(move || f(&directory))
        .await
        .map_err(|e| FileServerError::Io(std::io::Error::other(e)))?
}

/// `POST /dir/make`
#[utoipa::path(
    post,
    path = "/dir/make",
    tag = "FileServer",
    operation_id = "MakeDirectory",
    request_body = PathRequest,
    responses(
        (status = 200, description = "Directory exists", body = bool),
        (status = 400, description = "Invalid path")
    )
)]
pub async fn make_directory(
    State(state): State<Arc<FileServerState>>,
    Json(req): Json<PathRequest>,
) -> Result<Json<bool>, FileServerError> {
    debug!(path = %req.path, mode = req.mode, "MakeDirectory");
    blocking(&state.directory, move |d| d.make_directory(&req.path, req.mode)).await?;
    Ok(Json(true))
}

/// `POST /dir/remove` -- succeeds when the directory is already gone.
#[utoipa::path(
    post,
    path = "/dir/remove",
    tag = "FileServer",
    operation_id = "RemoveDirectory",
    request_body = PathRequest,
    responses(
        (status = 200, description = "Directory absent", body = bool),
        (status = 400, description = "Invalid path")
    )
)]
pub async fn remove_directory(
    State(state): State<Arc<FileServerState>>,
    Json(req): Json<PathRequest>,
) -> Result<Json<bool>, FileServerError> {
    debug!(path = %req.path, "RemoveDirectory");
    blocking(&state.directory, move |d| d.remove_directory(&req.path)).await?;
    Ok(Json(true))
}

/// `POST /file/write`
#[utoipa::path(
    post,
    path = "/file/write",
    tag = "FileServer",
    operation_id = "WriteFile",
    request_body = WriteFileRequest,
    responses(
        (status = 200, description = "File written", body = bool),
        (status = 400, description = "Invalid path")
    )
)]
pub async fn write_file(
    State(state): State<Arc<FileServerState>>,
    Json(req): Json<WriteFileRequest>,
) -> Result<Json<bool>, FileServerError> {
    debug!(path = %req.path, len = req.data.len(), "WriteFile");
    blocking(&state.directory, move |d| {
        d.write_file(&req.path, &req.data, req.mode)
    })
    .await?;
    Ok(Json(true))
}

/// `POST /file/remove` -- succeeds when the file is already gone.
#[utoipa::path(
    post,
    path = "/file/remove",
    tag = "FileServer",
    operation_id = "RemoveFile",
    request_body = PathRequest,
    responses(
        (status = 200, description = "File absent", body = bool),
        (status = 400, description = "Invalid path")
    )
)]
pub async fn remove_file(
    State(state): State<Arc<FileServerState>>,
    Json(req): Json<PathRequest>,
) -> Result<Json<bool>, FileServerError> {
    debug!(path = %req.path, "RemoveFile");
    blocking(&state.directory, move |d| d.remove_file(&req.path)).await?;
    Ok(Json(true))
}

/// `POST /dir/list`
#[utoipa::path(
    post,
    path = "/dir/list",
    tag = "FileServer",
    operation_id = "ListDir",
    request_body = PathRequest,
    responses(
        (status = 200, description = "Directory entries", body = [DirEntry]),
        (status = 404, description = "No such directory")
    )
)]
pub async fn list_dir(
    State(state): State<Arc<FileServerState>>,
    Json(req): Json<PathRequest>,
) -> Result<Json<Vec<DirEntry>>, FileServerError> {
    let entries = blocking(&state.directory, move |d| d.list_dir(&req.path)).await?;
    Ok(Json(entries))
}
