//! The controller: membership plus file placement behind one lock.
//!
//! Both tables live in a single [`Controller`] guarded by one `RwLock`.
//! Readers (`get_file_servers`, `find_file`, `list_files`) share the lock;
//! every mutation holds the write guard for its whole read-modify-write, so
//! `add_file` can never pick a node that is concurrently leaving.  No I/O
//! happens while the guard is held.
//!
//! Departures arrive as [`DeregistrationEvent`]s from the liveness watchers
//! over an unbounded channel, and a single consumer task applies them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use metrics::{counter, gauge};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, OrphanPolicy};
use crate::errors::ControllerError;
use crate::membership::watcher::{self, DeregistrationEvent};
use crate::membership::wire::{ControllerFrame, NodeConnection};
use crate::membership::{Address, ConnectionId, FileServerEntry, MembershipTable};
use crate::metrics::{
    DEREGISTRATIONS_TOTAL, FILES_TOTAL, FILE_SERVERS, ORPHANS_PURGED_TOTAL, REGISTRATIONS_TOTAL,
};
use crate::registry::placement::{self, Candidate, PlacementPolicy};
use crate::registry::{FileRecord, FileRegistry};

#[derive(Debug, Default)]
struct Tables {
    members: MembershipTable,
    files: FileRegistry,
}

impl Tables {
    fn publish_gauges(&self) {
        gauge!(FILE_SERVERS).set(self.members.len() as f64);
        gauge!(FILES_TOTAL).set(self.files.len() as f64);
    }
}

pub struct Controller {
    tables: RwLock<Tables>,
    placement: Box<dyn PlacementPolicy>,
    orphan_policy: OrphanPolicy,
    events: mpsc::UnboundedSender<DeregistrationEvent>,
    next_conn: AtomicU64,
}

impl Controller {
    /// Create a controller and spawn its departure consumer.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(placement: Box<dyn PlacementPolicy>, orphan_policy: OrphanPolicy) -> Arc<Self> {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            tables: RwLock::new(Tables::default()),
            placement,
            orphan_policy,
            events,
            next_conn: AtomicU64::new(1),
        });
        tokio::spawn(apply_departures(Arc::downgrade(&controller), rx));
        info!(
            placement = controller.placement.name(),
            orphan_policy = ?orphan_policy,
            "controller started"
        );
        controller
    }

    pub fn from_config(config: &ControllerConfig) -> Arc<Self> {
        Self::start(placement::from_kind(config.placement), config.orphan_policy)
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("rwlock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("rwlock poisoned")
    }

    // -- Membership -----------------------------------------------------------

    /// Make `addr` a member for as long as `conn` stays open.
    ///
    /// Answers the node with `accepted` or `rejected` and, on success, hands
    /// the connection to a new liveness watcher.  An address that is already
    /// active is rejected with [`ControllerError::DuplicateAddress`]; the
    /// existing registration is not disturbed.
    pub async fn register<R, W>(
        &self,
        addr: Address,
        mut conn: NodeConnection<R, W>,
    ) -> Result<ConnectionId, ControllerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let conn_id = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (stop_tx, stop_rx) = oneshot::channel();

        let inserted = {
            let mut tables = self.write();
            let result = tables.members.insert(addr.clone(), conn_id, stop_tx);
            tables.publish_gauges();
            result
        };

        if let Err(e) = inserted {
            counter!(REGISTRATIONS_TOTAL, "outcome" => "rejected").increment(1);
            if let Err(io) = conn.reply(&ControllerFrame::from(&e)).await {
                debug!(%addr, "Failed to send rejection: {}", io);
            }
            return Err(e);
        }
        counter!(REGISTRATIONS_TOTAL, "outcome" => "accepted").increment(1);

        // A failed reply means the connection is already broken; the watcher
        // will observe that and deregister.
        if let Err(e) = conn.reply(&ControllerFrame::Accepted).await {
            warn!(%addr, %conn_id, "Failed to acknowledge registration: {}", e);
        }

        tokio::spawn(watcher::watch(
            addr,
            conn_id,
            conn,
            stop_rx,
            self.events.clone(),
        ));
        Ok(conn_id)
    }

    /// Remove `addr` from the membership if present.
    ///
    /// Returns `false` when there was nothing to remove.  Dropping the entry
    /// makes its watcher close the connection.
    pub fn deregister(&self, addr: &Address) -> bool {
        self.remove_member(addr, None, "explicit")
    }

    /// Apply a watcher's departure report.
    ///
    /// Only removes the entry if it still belongs to the reporting
    /// connection.
    pub(crate) fn handle_departure(&self, event: DeregistrationEvent) -> bool {
        self.remove_member(&event.addr, Some(event.conn), event.reason.as_str())
    }

    fn remove_member(
        &self,
        addr: &Address,
        conn: Option<ConnectionId>,
        reason: &'static str,
    ) -> bool {
        let purged = {
            let mut tables = self.write();
            if !tables.members.remove(addr, conn) {
                None
            } else {
                let purged = match self.orphan_policy {
                    OrphanPolicy::Keep => Vec::new(),
                    OrphanPolicy::Purge => tables.files.remove_owned_by(addr),
                };
                tables.publish_gauges();
                Some(purged)
            }
        };

        match purged {
            None => {
                debug!(%addr, reason, "deregistration was a no-op");
                false
            }
            Some(purged) => {
                counter!(DEREGISTRATIONS_TOTAL, "reason" => reason).increment(1);
                if !purged.is_empty() {
                    counter!(ORPHANS_PURGED_TOTAL).increment(purged.len() as u64);
                }
                info!(%addr, reason, purged = purged.len(), "file server deregistered");
                true
            }
        }
    }

    /// Drop every membership, closing all registration connections.
    ///
    /// Watchers exit without reporting.  File records are left alone.
    pub fn deregister_all(&self) -> usize {
        let removed = {
            let mut tables = self.write();
            let removed = tables.members.clear();
            tables.publish_gauges();
            removed
        };
        if !removed.is_empty() {
            counter!(DEREGISTRATIONS_TOTAL, "reason" => "shutdown").increment(removed.len() as u64);
            info!(count = removed.len(), "released all file servers");
        }
        removed.len()
    }

    /// Registered file servers, in address order.
    pub fn get_file_servers(&self) -> Vec<FileServerEntry> {
        self.read().members.snapshot()
    }

    pub fn file_server_count(&self) -> usize {
        self.read().members.len()
    }

    // -- Files ----------------------------------------------------------------

    /// Place a new file and return the chosen owner.
    pub fn add_file(&self, name: &str, size: i64) -> Result<Address, ControllerError> {
        if name.is_empty() {
            return Err(ControllerError::InvalidArgument {
                message: "file name must not be empty".to_string(),
            });
        }
        if size < 0 {
            return Err(ControllerError::InvalidArgument {
                message: format!("file size must not be negative, got {size}"),
            });
        }

        let mut tables = self.write();
        if tables.members.is_empty() {
            return Err(ControllerError::NoServersAvailable);
        }
        if tables.files.contains(name) {
            return Err(ControllerError::DuplicateName {
                name: name.to_string(),
            });
        }

        let candidates: Vec<Candidate> = tables
            .members
            .addresses()
            .map(|addr| {
                let load = tables.files.load_of(addr);
                Candidate {
                    addr: addr.clone(),
                    file_count: load.files,
                    assigned_bytes: load.bytes,
                }
            })
            .collect();

        let owner = self
            .placement
            .choose(name, &candidates)
            .ok_or(ControllerError::NoServersAvailable)?;
        if !tables.members.contains(&owner) {
            return Err(ControllerError::Internal(anyhow::anyhow!(
                "placement policy {} chose unknown node {}",
                self.placement.name(),
                owner
            )));
        }

        tables.files.insert(FileRecord {
            name: name.to_string(),
            size,
            owner: owner.clone(),
        })?;
        tables.publish_gauges();
        drop(tables);

        debug!(name, size, %owner, "file placed");
        Ok(owner)
    }

    /// Owner of `name`, which may be a node that has since left.
    pub fn find_file(&self, name: &str) -> Option<Address> {
        self.read().files.get(name).map(|r| r.owner.clone())
    }

    /// Forget `name` and return its owner.
    pub fn remove_file(&self, name: &str) -> Option<Address> {
        let mut tables = self.write();
        let removed = tables.files.remove(name);
        if removed.is_some() {
            tables.publish_gauges();
        }
        removed.map(|r| r.owner)
    }

    /// Every tracked file, ordered by name.
    pub fn list_files(&self) -> Vec<FileRecord> {
        self.read().files.records()
    }

    pub fn file_count(&self) -> usize {
        self.read().files.len()
    }
}

/// Single consumer of watcher departures.
///
/// Holds only a weak reference so the controller can be dropped; exits when
/// it is.
async fn apply_departures(
    controller: Weak<Controller>,
    mut rx: mpsc::UnboundedReceiver<DeregistrationEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        debug!(addr = %event.addr, conn = %event.conn, reason = %event.reason, "departure reported");
        controller.handle_departure(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::watcher::DisconnectReason;
    use crate::membership::wire::{write_frame, FrameReader, NodeFrame};
    use crate::registry::placement::LeastLoaded;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};

    type Conn = NodeConnection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn controller(orphans: OrphanPolicy) -> Arc<Controller> {
        Controller::start(Box::new(LeastLoaded), orphans)
    }

    fn pair() -> (Conn, DuplexStream) {
        let (controller_side, node_side) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(controller_side);
        (NodeConnection::new("test", FrameReader::new(r), w), node_side)
    }

    /// Register `a` and return the node's end of the connection.
    async fn join(c: &Controller, a: &str) -> (ConnectionId, DuplexStream) {
        let (conn, mut node) = pair();
        let id = c.register(addr(a), conn).await.unwrap();
        let reply: Option<ControllerFrame> = FrameReader::new(&mut node).next_frame().await.unwrap();
        assert_eq!(reply, Some(ControllerFrame::Accepted));
        (id, node)
    }

    async fn wait_for_count(c: &Controller, expected: usize) {
        for _ in 0..200 {
            if c.file_server_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {} file servers, still have {}",
            expected,
            c.file_server_count()
        );
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_sequence() {
        let c = controller(OrphanPolicy::Keep);
        let (_base_id, _base) = join(&c, "localhost:2125").await;
        assert_eq!(c.get_file_servers().len(), 1);

        let (_id, node) = join(&c, "localhost:2126").await;
        assert_eq!(c.get_file_servers().len(), 2);

        drop(node);
        wait_for_count(&c, 1).await;
        assert_eq!(c.get_file_servers()[0].addr.as_str(), "localhost:2125");
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let c = controller(OrphanPolicy::Keep);
        let (first_id, _first) = join(&c, "node-a:1").await;

        let (conn, mut node) = pair();
        let err = c.register(addr("node-a:1"), conn).await.unwrap_err();
        assert!(matches!(err, ControllerError::DuplicateAddress { .. }));

        let reply: Option<ControllerFrame> = FrameReader::new(&mut node).next_frame().await.unwrap();
        assert!(matches!(reply, Some(ControllerFrame::Rejected { ref code, .. }) if code == "DuplicateAddress"));

        // The rejected connection closing must not remove the original.
        drop(node);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(c.file_server_count(), 1);
        assert_eq!(c.read().members.connection_of(&addr("node-a:1")), Some(first_id));
    }

    #[tokio::test]
    async fn test_unregister_frame_deregisters() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, mut node) = join(&c, "node-a:1").await;
        write_frame(&mut node, &NodeFrame::Unregister).await.unwrap();
        wait_for_count(&c, 0).await;
    }

    #[tokio::test]
    async fn test_explicit_deregister_closes_connection() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, mut node) = join(&c, "node-a:1").await;

        assert!(c.deregister(&addr("node-a:1")));
        assert_eq!(c.file_server_count(), 0);

        // The watcher releases the connection, so the node sees EOF.
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), node.read(&mut buf))
            .await
            .expect("connection should close")
            .unwrap();
        assert_eq!(n, 0);
        assert!(!c.deregister(&addr("node-a:1")));
    }

    #[tokio::test]
    async fn test_close_and_explicit_deregister_race_removes_once() {
        let c = controller(OrphanPolicy::Keep);
        let (id, node) = join(&c, "node-a:1").await;

        let explicit = {
            let c = c.clone();
            tokio::spawn(async move { c.deregister(&addr("node-a:1")) })
        };
        let from_watcher = {
            let c = c.clone();
            tokio::spawn(async move {
                c.handle_departure(DeregistrationEvent {
                    addr: addr("node-a:1"),
                    conn: id,
                    reason: DisconnectReason::Closed,
                })
            })
        };
        let (explicit, from_watcher) = (explicit.await.unwrap(), from_watcher.await.unwrap());
        assert!(explicit ^ from_watcher, "exactly one trigger removes the entry");

        // The real close arriving afterwards is a no-op as well.
        drop(node);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(c.file_server_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_departure_ignored_after_reregistration() {
        let c = controller(OrphanPolicy::Keep);
        let (old_id, _old) = join(&c, "node-a:1").await;
        assert!(c.deregister(&addr("node-a:1")));

        let (new_id, _new) = join(&c, "node-a:1").await;
        assert_ne!(old_id, new_id);

        assert!(!c.handle_departure(DeregistrationEvent {
            addr: addr("node-a:1"),
            conn: old_id,
            reason: DisconnectReason::Closed,
        }));
        assert_eq!(c.file_server_count(), 1);
    }

    #[tokio::test]
    async fn test_deregister_all_closes_every_connection() {
        let c = controller(OrphanPolicy::Keep);
        let (_a, mut node_a) = join(&c, "node-a:1").await;
        let (_b, mut node_b) = join(&c, "node-b:1").await;
        c.add_file("kept", 1).unwrap();

        assert_eq!(c.deregister_all(), 2);
        assert_eq!(c.file_server_count(), 0);
        assert_eq!(c.file_count(), 1);

        for node in [&mut node_a, &mut node_b] {
            let mut buf = [0u8; 16];
            let n = tokio::time::timeout(Duration::from_secs(2), node.read(&mut buf))
                .await
                .expect("connection should close")
                .unwrap();
            assert_eq!(n, 0);
        }
        assert_eq!(c.deregister_all(), 0);
    }

    #[tokio::test]
    async fn test_huge_sizes_do_not_break_the_controller() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, _node) = join(&c, "node-a:1").await;

        c.add_file("a", i64::MAX).unwrap();
        c.add_file("b", i64::MAX).unwrap();
        c.add_file("c", 2).unwrap();
        c.add_file("d", i64::MAX).unwrap();

        assert_eq!(c.get_file_servers().len(), 1);
        assert_eq!(c.file_count(), 4);
        assert!(c.deregister(&addr("node-a:1")));
    }

    #[tokio::test]
    async fn test_least_loaded_spreads_empty_files() {
        let c = controller(OrphanPolicy::Keep);
        let (_a, _na) = join(&c, "node-a:1").await;
        let (_b, _nb) = join(&c, "node-b:1").await;

        let owners: Vec<String> = (0..4)
            .map(|i| c.add_file(&format!("empty-{i}"), 0).unwrap().to_string())
            .collect();
        assert_eq!(owners, vec!["node-a:1", "node-b:1", "node-a:1", "node-b:1"]);
    }

    #[tokio::test]
    async fn test_add_file_without_servers() {
        let c = controller(OrphanPolicy::Keep);
        let err = c.add_file("testfile", 1024).unwrap_err();
        assert!(matches!(err, ControllerError::NoServersAvailable));
        assert_eq!(c.file_count(), 0);
    }

    #[tokio::test]
    async fn test_add_find_remove() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, _node) = join(&c, "localhost:2125").await;

        let owner = c.add_file("testfile", 1024).unwrap();
        assert_eq!(owner.as_str(), "localhost:2125");
        assert_eq!(c.find_file("testfile"), Some(owner.clone()));

        assert_eq!(c.remove_file("testfile"), Some(owner));
        assert_eq!(c.find_file("testfile"), None);
        assert_eq!(c.remove_file("testfile"), None);
        assert_eq!(c.remove_file("never-added"), None);
    }

    #[tokio::test]
    async fn test_add_file_rejects_duplicates_and_bad_arguments() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, _node) = join(&c, "node-a:1").await;

        c.add_file("f", 1).unwrap();
        assert!(matches!(
            c.add_file("f", 2),
            Err(ControllerError::DuplicateName { .. })
        ));
        assert!(matches!(
            c.add_file("", 2),
            Err(ControllerError::InvalidArgument { .. })
        ));
        assert!(matches!(
            c.add_file("g", -1),
            Err(ControllerError::InvalidArgument { .. })
        ));
        assert_eq!(c.list_files().len(), 1);
    }

    #[tokio::test]
    async fn test_least_loaded_spreads_files() {
        let c = controller(OrphanPolicy::Keep);
        let (_a, _na) = join(&c, "node-a:1").await;
        let (_b, _nb) = join(&c, "node-b:1").await;

        assert_eq!(c.add_file("big", 100).unwrap().as_str(), "node-a:1");
        assert_eq!(c.add_file("small", 10).unwrap().as_str(), "node-b:1");
        assert_eq!(c.add_file("tiny", 5).unwrap().as_str(), "node-b:1");
        assert_eq!(c.add_file("more", 200).unwrap().as_str(), "node-b:1");
        assert_eq!(c.add_file("last", 1).unwrap().as_str(), "node-a:1");
    }

    #[tokio::test]
    async fn test_orphans_kept_by_default() {
        let c = controller(OrphanPolicy::Keep);
        let (_id, node) = join(&c, "node-a:1").await;
        c.add_file("f", 1).unwrap();

        drop(node);
        wait_for_count(&c, 0).await;
        assert_eq!(c.find_file("f").unwrap().as_str(), "node-a:1");
        assert_eq!(c.remove_file("f").unwrap().as_str(), "node-a:1");
    }

    #[tokio::test]
    async fn test_orphans_purged_when_configured() {
        let c = controller(OrphanPolicy::Purge);
        let (_a, node_a) = join(&c, "node-a:1").await;
        let (_b, _node_b) = join(&c, "node-b:1").await;
        c.add_file("on-a", 1).unwrap();
        c.add_file("on-b", 2).unwrap();
        assert_eq!(c.find_file("on-b").unwrap().as_str(), "node-b:1");

        drop(node_a);
        wait_for_count(&c, 1).await;
        assert_eq!(c.find_file("on-a"), None);
        assert_eq!(c.find_file("on-b").unwrap().as_str(), "node-b:1");
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_atomic() {
        let c = controller(OrphanPolicy::Keep);
        let (_a, _na) = join(&c, "node-a:1").await;
        let (_b, _nb) = join(&c, "node-b:1").await;

        let mut tasks = Vec::new();
        for i in 0..50 {
            let c = c.clone();
            tasks.push(tokio::spawn(async move { c.add_file(&format!("f{i}"), 10) }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(c.file_count(), 50);

        let on_a = c
            .list_files()
            .iter()
            .filter(|r| r.owner.as_str() == "node-a:1")
            .count();
        assert_eq!(on_a, 25, "least-loaded keeps equal-size files balanced");
    }
}
