//! Stand-in simulation driven by the host binary.
//!
//! There are no falling pieces or line clears here. The host only needs a
//! snapshot source and an input sink to exercise the protocol end to end.

use log::info;
use shared::{GameStateSnapshot, PlayerInputBatch, Simulation, BOARD_HEIGHT, KEY_COUNT};
use std::collections::BTreeMap;

/// Number of distinct piece ids cycled through `next_piece`
const PIECE_KINDS: u32 = 7;

#[derive(Debug, Clone, Default)]
pub struct HostGame {
    pub elapsed: f32,
    /// Inputs integrated since start, reported as the score
    pub inputs_applied: i32,
    /// Last key state per connected peer slot
    held: BTreeMap<usize, [u8; KEY_COUNT]>,
}

impl HostGame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, slot: usize) {
        self.held.insert(slot, [0; KEY_COUNT]);
        info!("Added player for peer {}", slot);
    }

    pub fn remove_player(&mut self, slot: usize) {
        if self.held.remove(&slot).is_some() {
            info!("Removed player for peer {}", slot);
        }
    }

    /// Drops players whose peer is gone
    pub fn retain_players<F>(&mut self, mut connected: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.held.retain(|&slot, _| {
            let keep = connected(slot);
            if !keep {
                info!("Removed player for peer {}", slot);
            }
            keep
        });
    }

    pub fn player_count(&self) -> usize {
        self.held.len()
    }

    pub fn update(&mut self, dt: f32) {
        self.elapsed += dt;
    }
}

impl Simulation for HostGame {
    fn snapshot(&self) -> GameStateSnapshot {
        let mut snapshot = GameStateSnapshot {
            elapsed_time: self.elapsed,
            score: self.inputs_applied,
            next_piece: (self.elapsed as u32) % PIECE_KINDS,
            ..GameStateSnapshot::default()
        };

        // Each peer's held keys light up one row counted from the bottom
        for (&slot, keys) in &self.held {
            if slot >= BOARD_HEIGHT {
                continue;
            }
            let row = &mut snapshot.board[BOARD_HEIGHT - 1 - slot];
            row[..KEY_COUNT].copy_from_slice(keys);
        }
        snapshot
    }

    fn apply_input(&mut self, peer: usize, input: &PlayerInputBatch) {
        self.held.insert(peer, input.keys);
        self.inputs_applied = self.inputs_applied.saturating_add(1);
    }
}
