//! Scripted key presses for the headless client

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Key, PlayerInputBatch};

/// Keys the script may press; Pause and Quit are left to the operator
const PLAYABLE: [Key; 7] = [
    Key::MoveLeft,
    Key::MoveRight,
    Key::RotateCw,
    Key::RotateCcw,
    Key::SoftDrop,
    Key::HardDrop,
    Key::Hold,
];

/// Generates a random but reproducible stream of input batches
pub struct InputScript {
    rng: StdRng,
    press_chance: f64,
}

impl InputScript {
    /// A fixed seed replays the same key sequence; `None` seeds from entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            press_chance: 0.2,
        }
    }

    pub fn with_press_chance(mut self, chance: f64) -> Self {
        self.press_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn next_batch(&mut self, timestamp: f32) -> PlayerInputBatch {
        let mut batch = PlayerInputBatch::new(timestamp);
        for key in PLAYABLE {
            if self.rng.gen_bool(self.press_chance) {
                batch.set(key, true);
            }
        }
        batch
    }
}
