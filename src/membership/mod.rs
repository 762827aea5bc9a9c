//! Membership of file servers.
//!
//! A file server is a member for exactly as long as its registration
//! connection to the controller stays open.
//!
//! - **`types`**: addresses, public entries and connection ids.
//! - **`table`**: the membership table itself (no locking; the controller
//!   owns the lock).
//! - **`wire`**: newline-delimited JSON frames on the registration connection.
//! - **`watcher`**: the per-connection liveness task that reports departures.
//! - **`acceptor`**: the TCP listener that turns connections into
//!   registrations.

pub mod acceptor;
pub mod table;
pub mod types;
pub mod watcher;
pub mod wire;

pub use table::MembershipTable;
pub use types::{Address, ConnectionId, FileServerEntry};
pub use watcher::{DeregistrationEvent, DisconnectReason};
