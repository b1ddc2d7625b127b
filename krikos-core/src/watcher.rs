//! Ring silence watcher
//!
//! Silence is the only observable signal of both "the ring powered up
//! idle" and "the upstream neighbor died" - there is no separate
//! link-presence indication on the wire. The watcher therefore runs two
//! countdowns: a silence window that any packet arrival re-arms, and a
//! debounce window after the silence so that two nodes observing the same
//! quiet period do not begin claiming in the exact same instant.

/// Watcher states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatcherState {
    /// Initial state on boot; moves to `WaitingSilence` on the first tick
    Start,
    /// Counting down the silence window; arrivals re-arm it
    WaitingSilence,
    /// Silence seen; counting down the debounce before signalling
    WaitingAfterSilence,
}

/// Silence-detection state machine
///
/// Advanced by elapsed-time ticks, reset by packet arrivals. Expiry of the
/// debounce window signals the caller that claiming may begin.
#[derive(Debug, Clone)]
pub struct RingWatcher {
    state: WatcherState,
    countdown_ms: u32,
    silence_timeout_ms: u32,
    debounce_ms: u32,
}

impl RingWatcher {
    pub fn new(silence_timeout_ms: u32, debounce_ms: u32) -> Self {
        Self {
            state: WatcherState::Start,
            countdown_ms: 0,
            silence_timeout_ms,
            debounce_ms,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Record a packet arrival: the wire is busy
    pub fn observe_packet(&mut self) {
        match self.state {
            WatcherState::Start => {}
            WatcherState::WaitingSilence => {
                self.countdown_ms = self.silence_timeout_ms;
            }
            WatcherState::WaitingAfterSilence => {
                // silence was broken, restart the detection
                self.state = WatcherState::WaitingSilence;
                self.countdown_ms = self.silence_timeout_ms;
            }
        }
    }

    /// Advance by elapsed time
    ///
    /// Returns true exactly when the debounce window expires, i.e. when it
    /// is safe to attempt an address claim. The watcher then re-arms the
    /// silence window and keeps observing.
    pub fn advance(&mut self, delta_ms: u32) -> bool {
        if self.state == WatcherState::Start {
            self.state = WatcherState::WaitingSilence;
            self.countdown_ms = self.silence_timeout_ms;
        }

        self.countdown_ms = self.countdown_ms.saturating_sub(delta_ms);
        if self.countdown_ms > 0 {
            return false;
        }

        match self.state {
            WatcherState::WaitingSilence => {
                self.state = WatcherState::WaitingAfterSilence;
                self.countdown_ms = self.debounce_ms;
                // a zero debounce fires on the next tick, not instantly
                false
            }
            WatcherState::WaitingAfterSilence => {
                self.state = WatcherState::WaitingSilence;
                self.countdown_ms = self.silence_timeout_ms;
                true
            }
            WatcherState::Start => false,
        }
    }
}
