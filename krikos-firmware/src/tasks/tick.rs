//! Tick task for time-based updates
//!
//! Provides periodic ticks to the node task for the watcher and MAC
//! countdowns. The signal carries elapsed milliseconds since boot so a
//! consumer that misses a tick still sees the full elapsed time.

use defmt::*;
use embassy_time::{Duration, Instant, Ticker};

use crate::channels::TICK_SIGNAL;

/// Tick interval in milliseconds
///
/// Short enough that the token turnaround stays well inside the silence
/// window of the other nodes on the ring.
pub const TICK_INTERVAL_MS: u32 = 10;

/// Tick task - sends periodic tick signals with timestamp
#[embassy_executor::task]
pub async fn tick_task() {
    info!("Tick task started");

    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS as u64));
    let start = Instant::now();

    loop {
        ticker.next().await;
        let now_ms = start.elapsed().as_millis() as u32;
        TICK_SIGNAL.signal(now_ms);
    }
}
