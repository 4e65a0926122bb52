//! Request throttling for the REST API
//!
//! Poloniex allows 6 calls per second per IP. Requests are spaced evenly: each
//! caller reserves the next free slot and sleeps until it arrives.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Evenly spaced request throttle
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl Throttle {
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = requests_per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / per_second,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Minimum spacing between two requests
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next request slot
    pub async fn acquire(&self) {
        let slot = self.reserve();
        if slot > Instant::now() {
            tracing::trace!("Throttled, waiting {:?}", slot - Instant::now());
            sleep_until(slot).await;
        }
    }

    fn reserve(&self) -> Instant {
        let mut next = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let slot = if *next > now { *next } else { now };
        *next = slot + self.interval;
        slot
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(6)
    }
}
