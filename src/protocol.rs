//! Request and reply bodies for the controller and file server RPC surfaces.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// -- Controller ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddFileRequest {
    pub name: String,
    pub size: i64,
}

/// Outcome of `AddFile`.
///
/// Refusals that are part of normal operation (`NoServersAvailable`,
/// `DuplicateName`) come back as `success: false` with the code in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddFileReply {
    pub success: bool,
    /// Chosen file server; empty on failure.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of `FindFile` and `RemoveFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LocateReply {
    pub found: bool,
    /// Owning file server; empty when not found.
    pub address: String,
}

pub type FindFileReply = LocateReply;
pub type RemoveFileReply = LocateReply;

impl LocateReply {
    pub fn from_owner(owner: Option<crate::membership::Address>) -> Self {
        match owner {
            Some(addr) => Self {
                found: true,
                address: addr.to_string(),
            },
            None => Self {
                found: false,
                address: String::new(),
            },
        }
    }
}

// -- File server --------------------------------------------------------------

/// Directory or file target.  `mode` holds Unix permission bits; `0` keeps
/// the platform default.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PathRequest {
    pub path: String,
    #[serde(default)]
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WriteFileRequest {
    pub path: String,
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    /// File length in bytes; `0` for directories.
    pub size: u64,
}

/// Standard base64 for binary payloads in JSON bodies.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
