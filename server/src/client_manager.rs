//! Fixed-capacity peer slot table for the host
//!
//! Every connected client occupies one slot for the lifetime of its connection.
//! Slot ids are stable array indices, so they double as the peer id sent in the
//! handshake. A slot freed by disconnect or timeout is handed out again, lowest
//! index first.

use log::info;
use shared::{FrameBuffer, Liveness, LivenessPolicy};
use std::net::SocketAddr;
use std::time::Instant;

/// A connected peer and its per-connection state
///
/// `S` is the connection handle; the host stores a `TcpStream` here.
#[derive(Debug)]
pub struct Client<S> {
    /// Slot index assigned on accept
    pub slot: usize,
    /// Remote address, for logging
    pub addr: SocketAddr,
    pub stream: S,
    /// Bytes received but not yet cut into complete frames
    pub frames: FrameBuffer,
    /// Last time this peer was accepted or sent a heartbeat
    pub last_heartbeat: Instant,
}

impl<S> Client<S> {
    pub fn new(slot: usize, addr: SocketAddr, stream: S, max_frame: usize) -> Self {
        Self {
            slot,
            addr,
            stream,
            frames: FrameBuffer::new(max_frame),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn liveness(&self, policy: &LivenessPolicy, now: Instant) -> Liveness {
        policy.assess(self.last_heartbeat, now)
    }
}

/// Read-only view of a slot, handed out to callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub slot: usize,
    pub addr: SocketAddr,
    pub connected: bool,
    pub last_heartbeat: Instant,
}

/// Owns every peer slot on the host
///
/// Capacity is fixed at construction. The number of occupied slots is derived
/// from the table itself, so it can never drift from the real connection count.
#[derive(Debug)]
pub struct ClientManager<S> {
    slots: Vec<Option<Client<S>>>,
    max_frame: usize,
}

impl<S> ClientManager<S> {
    pub fn new(max_clients: usize, max_frame: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
            max_frame,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of currently connected peers
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Places a new peer in the lowest free slot
    ///
    /// Returns `None` when every slot is occupied; the stream is dropped in that case.
    pub fn add_client(&mut self, addr: SocketAddr, stream: S) -> Option<usize> {
        let slot = self.slots.iter().position(Option::is_none)?;
        info!("Peer {} connected from {}", slot, addr);
        self.slots[slot] = Some(Client::new(slot, addr, stream, self.max_frame));
        Some(slot)
    }

    /// Frees a slot, returning the peer that occupied it
    pub fn remove_client(&mut self, slot: usize) -> Option<Client<S>> {
        let client = self.slots.get_mut(slot)?.take()?;
        info!("Peer {} ({}) disconnected", slot, client.addr);
        Some(client)
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    pub fn get(&self, slot: usize) -> Option<&Client<S>> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Client<S>> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Records a heartbeat from `slot`; returns false for an empty slot
    pub fn touch(&mut self, slot: usize, now: Instant) -> bool {
        match self.get_mut(slot) {
            Some(client) => {
                client.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    /// Occupied slot ids in ascending order
    pub fn connected_slots(&self) -> Vec<usize> {
        self.iter().map(|client| client.slot).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client<S>> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client<S>> {
        self.slots.iter_mut().flatten()
    }

    /// Slots whose peer has been silent past the expiry threshold
    pub fn expired(&self, policy: &LivenessPolicy, now: Instant) -> Vec<usize> {
        self.iter()
            .filter(|client| client.liveness(policy, now) == Liveness::Expired)
            .map(|client| client.slot)
            .collect()
    }

    pub fn peer_info(&self, slot: usize) -> Option<PeerInfo> {
        self.get(slot).map(|client| PeerInfo {
            slot: client.slot,
            addr: client.addr,
            connected: true,
            last_heartbeat: client.last_heartbeat,
        })
    }

    /// Empties every slot, returning the peers that were connected
    pub fn drain(&mut self) -> Vec<Client<S>> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
