use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::properties::Timestamp;

/// Wall clock in milliseconds, advanced by tokio's monotonic clock.
///
/// Reading the wall time once and adding tokio's elapsed time keeps timestamps consistent with
/// the engine's timers, including under a paused test clock.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    origin_wall_ms: Timestamp,
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or_default();
        Clock::starting_at(wall)
    }

    pub fn starting_at(origin_wall_ms: Timestamp) -> Self {
        Clock {
            origin_wall_ms,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.origin_wall_ms + self.origin.elapsed().as_millis() as Timestamp
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}
