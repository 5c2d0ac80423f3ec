//! Shared balancer state.
//!
//! Everything the dispatcher and the lifecycle tasks touch (the RAN
//! registry, the accept-time peer map, the backend pool and its
//! round-robin cursor) lives behind one coarse lock inside a context
//! object constructed at startup and passed by reference to every
//! component. Per-message work is dominated by network I/O, so the
//! single lock is not a contention concern at these pool sizes.


use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info_span;

use crate::backend::Backend;
use crate::sctp::SctpAssociation;

/// Handle identifying one live SCTP association.
pub type AssociationHandle = RawFd;

/// One gNB peer record. Created when the first NGAP-bearing packet
/// arrives from an association, destroyed when the association goes
/// away or a disconnect is broadcast.
#[derive(Debug)]
pub struct Ran {
    /// gNB identifier, learned from the AMF's NGSetup response.
    pub ran_id: Option<String>,
    pub name: String,
    /// Remote address of the association.
    pub gnb_ip: String,
    pub conn: Arc<SctpAssociation>,
    /// Structured log target tagged with the remote address.
    pub log: tracing::Span,
}

impl Ran {
    fn new(conn: Arc<SctpAssociation>) -> Ran {
        let gnb_ip = conn.remote_addr().to_string();
        let log = info_span!("ran", ran_addr = %gnb_ip);
        Ran {
            ran_id: None,
            name: String::new(),
            gnb_ip,
            conn,
            log,
        }
    }

    pub fn set_ran_id(&mut self, gnb_id: &str) {
        self.ran_id = Some(gnb_id.to_string());
    }

    /// Display form of the identifier, empty until it is learned.
    pub fn ran_id_display(&self) -> String {
        match &self.ran_id {
            Some(id) => format!("<Mcc:Mnc:GNbID {id}>"),
            None => String::new(),
        }
    }
}

/// Accept-time connection record, present from accept until the
/// connection handler exits, whether or not NGAP traffic ever flowed.
#[derive(Debug)]
pub struct Peer {
    pub address: String,
    pub conn: Arc<SctpAssociation>,
}

/// The state proper, only reachable through [`LbContext::lock`].
#[derive(Default)]
pub struct State {
    peers: HashMap<AssociationHandle, Peer>,
    ran_pool: HashMap<AssociationHandle, Ran>,
    backends: Vec<Backend>,
    next: usize,
}

impl State {
    pub fn add_peer(&mut self, handle: AssociationHandle, peer: Peer) {
        self.peers.insert(handle, peer);
    }

    pub fn remove_peer(&mut self, handle: AssociationHandle) -> Option<Peer> {
        self.peers.remove(&handle)
    }

    pub fn peer(&self, handle: AssociationHandle) -> Option<&Peer> {
        self.peers.get(&handle)
    }

    /// Snapshot of every live association, for shutdown teardown.
    pub fn associations(&self) -> Vec<Arc<SctpAssociation>> {
        self.peers.values().map(|p| p.conn.clone()).collect()
    }

    /// Creates the RAN record for an association, or returns the
    /// existing one: at most one record per handle.
    pub fn new_ran(&mut self, conn: &Arc<SctpAssociation>) -> &mut Ran {
        self.ran_pool
            .entry(conn.handle())
            .or_insert_with(|| Ran::new(conn.clone()))
    }

    pub fn ran_by_conn(&self, handle: AssociationHandle) -> Option<&Ran> {
        self.ran_pool.get(&handle)
    }

    pub fn ran_by_conn_mut(&mut self, handle: AssociationHandle) -> Option<&mut Ran> {
        self.ran_pool.get_mut(&handle)
    }

    // The pool is small (tens, not thousands), so the secondary
    // lookups are linear scans.
    pub fn ran_by_gnb_id_mut(&mut self, gnb_id: &str) -> Option<&mut Ran> {
        self.ran_pool
            .values_mut()
            .find(|ran| ran.ran_id.as_deref() == Some(gnb_id))
    }

    pub fn ran_by_gnb_ip_mut(&mut self, gnb_ip: &str) -> Option<&mut Ran> {
        self.ran_pool
            .values_mut()
            .find(|ran| ran.gnb_ip == gnb_ip)
    }

    pub fn delete_ran(&mut self, handle: AssociationHandle) -> Option<Ran> {
        self.ran_pool.remove(&handle)
    }

    /// Drops every RAN record whose association is already closed.
    pub fn purge_closed_rans(&mut self) -> usize {
        let before = self.ran_pool.len();
        self.ran_pool.retain(|_, ran| !ran.conn.is_closed());
        before - self.ran_pool.len()
    }

    pub fn rans(&self) -> impl Iterator<Item = &Ran> {
        self.ran_pool.values()
    }

    pub fn ran_len(&self) -> usize {
        self.ran_pool.len()
    }

    pub fn add_backend(&mut self, backend: Backend) {
        self.backends.push(backend);
    }

    pub fn has_backend(&self, address: &str) -> bool {
        self.backends.iter().any(|b| b.address() == address)
    }

    pub fn backend_mut(&mut self, address: &str) -> Option<&mut Backend> {
        self.backends.iter_mut().find(|b| b.address() == address)
    }

    /// Removes the pool entry for `address`; order is not preserved,
    /// matching the swap-with-last eviction of the scheduler.
    pub fn delete_backend(&mut self, address: &str) -> bool {
        match self.backends.iter().position(|b| b.address() == address) {
            Some(idx) => {
                self.backends.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn backend_len(&self) -> usize {
        self.backends.len()
    }

    /// Round-robin pick: returns the next pool index and advances the
    /// cursor, wrapping at pool length. Health is the caller's
    /// concern; the cursor never skips entries.
    pub fn round_robin(&mut self) -> Option<usize> {
        if self.backends.is_empty() {
            return None;
        }
        if self.next >= self.backends.len() {
            self.next = 0;
        }
        let idx = self.next;
        self.next += 1;
        Some(idx)
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.next
    }
}

/// Process-wide context handed to every component at startup; replaces
/// any notion of module-level mutable state.
pub struct LbContext {
    /// Balancer identity stamped into every outbound frame (the
    /// process hostname).
    pub lb_id: String,
    /// Process-wide shutdown signal.
    pub shutdown: CancellationToken,
    state: Mutex<State>,
}

impl LbContext {
    pub fn new(lb_id: String) -> LbContext {
        LbContext {
            lb_id,
            shutdown: CancellationToken::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().await
    }
}
