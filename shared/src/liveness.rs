//! Heartbeat-based liveness classification shared by both roles.

use std::time::{Duration, Instant};

/// Where a peer stands relative to its last heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Heard from within two intervals
    Healthy,
    /// Silent for more than two intervals; a heartbeat should be sent
    Probe,
    /// Silent for more than three intervals; the connection is lost
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct LivenessPolicy {
    interval: Duration,
}

impl LivenessPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn probe_after(&self) -> Duration {
        self.interval * 2
    }

    pub fn expire_after(&self) -> Duration {
        self.interval * 3
    }

    /// Classifies the silence between `last_heartbeat` and `now`.
    ///
    /// Clocks running backwards count as zero elapsed time.
    pub fn assess(&self, last_heartbeat: Instant, now: Instant) -> Liveness {
        let elapsed = now.saturating_duration_since(last_heartbeat);
        if elapsed > self.expire_after() {
            Liveness::Expired
        } else if elapsed > self.probe_after() {
            Liveness::Probe
        } else {
            Liveness::Healthy
        }
    }
}
