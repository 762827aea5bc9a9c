//! The authoritative set of registered file servers.
//!
//! [`MembershipTable`] is a plain data structure; the controller wraps it
//! in its lock.  Every entry owns the stop handle of its liveness watcher:
//! removing the entry drops the handle, which tells the watcher to release
//! the connection.

use std::collections::BTreeMap;

use tokio::sync::oneshot;

use super::types::{Address, ConnectionId, FileServerEntry};
use crate::errors::ControllerError;

/// Dropping this tells the entry's watcher to exit and close the connection.
pub type WatcherStop = oneshot::Sender<()>;

#[derive(Debug)]
struct Member {
    conn: ConnectionId,
    _stop: WatcherStop,
}

/// Registered file servers keyed by address.
///
/// Enumeration is in lexical address order, so two snapshots of the same
/// state are identical.
#[derive(Debug, Default)]
pub struct MembershipTable {
    members: BTreeMap<Address, Member>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `addr` bound to connection `conn`.
    ///
    /// Fails with [`ControllerError::DuplicateAddress`] if the address is
    /// already active; the existing entry is left untouched and `stop` is
    /// dropped.
    pub fn insert(
        &mut self,
        addr: Address,
        conn: ConnectionId,
        stop: WatcherStop,
    ) -> Result<(), ControllerError> {
        if self.members.contains_key(&addr) {
            return Err(ControllerError::DuplicateAddress {
                addr: addr.to_string(),
            });
        }
        self.members.insert(
            addr,
            Member {
                conn,
                _stop: stop,
            },
        );
        Ok(())
    }

    /// Remove `addr` if present.
    ///
    /// With `Some(conn)`, the entry is only removed when it still belongs to
    /// that connection.  Returns `true` if an entry was removed; a missing
    /// entry is not an error.
    pub fn remove(&mut self, addr: &Address, conn: Option<ConnectionId>) -> bool {
        match (self.members.get(addr), conn) {
            (None, _) => false,
            (Some(member), Some(conn)) if member.conn != conn => false,
            (Some(_), _) => self.members.remove(addr).is_some(),
        }
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.members.contains_key(addr)
    }

    /// Connection currently bound to `addr`.
    pub fn connection_of(&self, addr: &Address) -> Option<ConnectionId> {
        self.members.get(addr).map(|m| m.conn)
    }

    /// Remove every entry, releasing all watchers.
    pub fn clear(&mut self) -> Vec<Address> {
        std::mem::take(&mut self.members).into_keys().collect()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.members.keys()
    }

    /// Consistent copy of every entry, in address order.
    pub fn snapshot(&self) -> Vec<FileServerEntry> {
        self.members
            .keys()
            .map(|addr| FileServerEntry { addr: addr.clone() })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
