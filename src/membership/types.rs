//! Identity types shared by the membership table and the file registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::errors::ControllerError;

/// Network identity of a file server (`host:port`).
///
/// Opaque to the controller beyond a syntactic check: the host part must be
/// non-empty and the suffix after the last `:` must be a valid port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validate and wrap a `host:port` string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ControllerError> {
        let raw = raw.into();
        let invalid = |raw: &str| ControllerError::InvalidArgument {
            message: format!("invalid file server address: {raw:?}"),
        };
        let (host, port) = raw.rsplit_once(':').ok_or_else(|| invalid(&raw))?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid(&raw));
        }
        port.parse::<u16>().map_err(|_| invalid(&raw))?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public view of one registered file server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileServerEntry {
    /// Address the file server accepts client connections on.
    pub addr: Address,
}

/// Identifies one registration connection.
///
/// Two registrations of the same address over time get different ids, so an
/// event from an old connection can never remove a newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
