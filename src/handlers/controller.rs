//! Controller RPC handlers.
//!
//! Expected refusals are part of the reply body rather than HTTP errors:
//! `AddFile` answers `success: false` with the error code, and lookups of
//! unknown names answer `found: false`.  Only malformed arguments and
//! internal failures escape as [`ControllerError`] responses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::debug;

use crate::errors::ControllerError;
use crate::membership::FileServerEntry;
use crate::metrics::record_operation;
use crate::protocol::{AddFileReply, AddFileRequest, FindFileReply, RemoveFileReply};
use crate::registry::FileRecord;
use crate::ControllerState;

/// `GET /fileservers` -- currently registered file servers.
#[utoipa::path(
    get,
    path = "/fileservers",
    tag = "Membership",
    operation_id = "GetFileServers",
    responses(
        (status = 200, description = "Registered file servers", body = [FileServerEntry])
    )
)]
pub async fn get_file_servers(
    State(state): State<Arc<ControllerState>>,
) -> Json<Vec<FileServerEntry>> {
    record_operation("get_file_servers", "ok");
    Json(state.controller.get_file_servers())
}

/// `POST /files` -- place a new file on a file server.
#[utoipa::path(
    post,
    path = "/files",
    tag = "Files",
    operation_id = "AddFile",
    request_body = AddFileRequest,
    responses(
        (status = 200, description = "Placement outcome", body = AddFileReply),
        (status = 400, description = "Invalid name or size")
    )
)]
pub async fn add_file(
    State(state): State<Arc<ControllerState>>,
    Json(req): Json<AddFileRequest>,
) -> Result<Json<AddFileReply>, ControllerError> {
    match state.controller.add_file(&req.name, req.size) {
        Ok(owner) => {
            record_operation("add_file", "ok");
            Ok(Json(AddFileReply {
                success: true,
                address: owner.to_string(),
                error: None,
            }))
        }
        Err(e @ (ControllerError::NoServersAvailable | ControllerError::DuplicateName { .. })) => {
            record_operation("add_file", "refused");
            debug!(name = %req.name, "AddFile refused: {}", e);
            Ok(Json(AddFileReply {
                success: false,
                address: String::new(),
                error: Some(e.code().to_string()),
            }))
        }
        Err(e) => {
            record_operation("add_file", "error");
            Err(e)
        }
    }
}

/// `GET /files` -- every tracked file.
#[utoipa::path(
    get,
    path = "/files",
    tag = "Files",
    operation_id = "ListFiles",
    responses(
        (status = 200, description = "Tracked files ordered by name", body = [FileRecord])
    )
)]
pub async fn list_files(State(state): State<Arc<ControllerState>>) -> Json<Vec<FileRecord>> {
    record_operation("list_files", "ok");
    Json(state.controller.list_files())
}

/// `GET /files/{name}` -- owner of a file.
#[utoipa::path(
    get,
    path = "/files/{name}",
    tag = "Files",
    operation_id = "FindFile",
    params(("name" = String, Path, description = "File name")),
    responses(
        (status = 200, description = "Lookup outcome", body = FindFileReply)
    )
)]
pub async fn find_file(
    State(state): State<Arc<ControllerState>>,
    Path(name): Path<String>,
) -> Json<FindFileReply> {
    let owner = state.controller.find_file(&name);
    record_operation("find_file", if owner.is_some() { "ok" } else { "not_found" });
    Json(FindFileReply::from_owner(owner))
}

/// `DELETE /files/{name}` -- forget a file and report its owner.
#[utoipa::path(
    delete,
    path = "/files/{name}",
    tag = "Files",
    operation_id = "RemoveFile",
    params(("name" = String, Path, description = "File name")),
    responses(
        (status = 200, description = "Removal outcome", body = RemoveFileReply)
    )
)]
pub async fn remove_file(
    State(state): State<Arc<ControllerState>>,
    Path(name): Path<String>,
) -> Json<RemoveFileReply> {
    let owner = state.controller.remove_file(&name);
    record_operation("remove_file", if owner.is_some() { "ok" } else { "not_found" });
    Json(RemoveFileReply::from_owner(owner))
}
