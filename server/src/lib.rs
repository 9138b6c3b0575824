//! # Game Host Library
//!
//! The authoritative side of a two-player Tetris session. The host owns the
//! canonical game state, accepts a small fixed number of peers over TCP, takes
//! their key presses in and pushes board snapshots out.
//!
//! ## Architecture Design
//!
//! ### Single-Task Polling
//! Everything runs on the task that owns the [`network::HostContext`]. Each
//! tick performs one bounded readiness wait over the listening socket and every
//! connected peer, then non-blocking reads on whichever sockets are ready. No
//! tasks are spawned and no state is shared, so there are no locks.
//!
//! ### Peer Isolation
//! A read error, a corrupt message or a missed heartbeat only ever affects the
//! peer it came from. That peer's slot is vacated and every other peer carries
//! on untouched.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Fixed-capacity slot table:
//! - Lowest-free-slot assignment; slot ids double as peer ids
//! - Per-peer reassembly buffer and heartbeat timestamp
//! - Expiry scan against the shared liveness policy
//!
//! ### Game Module (`game`)
//! A stand-in [`shared::Simulation`] used by the host binary. It has no game
//! rules; it only reflects received input back into the snapshot.
//!
//! ### Network Module (`network`)
//! The host state machine: start, accept, poll and dispatch, broadcast,
//! targeted send, liveness checks and shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::HostContext;
//! use shared::{NetConfig, NetworkMessage, GameStateSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut host = HostContext::bind(NetConfig::default()).await?;
//!
//!     loop {
//!         let outcome = host.poll_and_dispatch().await?;
//!         for inbound in &outcome.inbound {
//!             println!("peer {} sent {:?}", inbound.slot, inbound.input());
//!         }
//!
//!         let state = NetworkMessage::game_state(GameStateSnapshot::default())?;
//!         host.broadcast(&state)?;
//!         host.check_liveness()?;
//!     }
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
