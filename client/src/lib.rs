//! # Game Client Library
//!
//! The dependent side of a two-player Tetris session. The client sends the
//! keys its player is holding and shows whatever board the host sent last.
//! There is no prediction or reconciliation: the host is always right.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! [`network::ClientContext`] owns the single connection to the host:
//! - Connect with a bounded timeout, then non-blocking sends
//! - Receive with one short readiness wait per call and stream reassembly
//! - Handshake handling (peer id assignment, rejection when the host is full)
//! - Heartbeat emission and session timeout detection
//!
//! ### Game Module (`game`)
//! [`game::ClientView`] keeps the latest snapshot; each one replaces the last.
//!
//! ### Input Module (`input`)
//! [`input::InputScript`] produces seeded random key presses so the client can
//! run headless against a host.

pub mod game;
pub mod input;
pub mod network;
