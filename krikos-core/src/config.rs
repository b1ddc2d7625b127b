//! Engine configuration types

use krikos_protocol::DeviceName;

/// Default silence window before a join attempt is considered (ms)
pub const SILENCE_TIMEOUT_MS: u32 = 500;

/// Default base debounce after silence, before claiming begins (ms)
pub const CLAIM_DEBOUNCE_MS: u32 = 100;

/// Default contention window for an address claim (ms)
pub const CLAIM_TIMEOUT_MS: u32 = 300;

/// Spread of the per-device debounce jitter (ms)
const DEBOUNCE_JITTER_SPREAD_MS: u32 = 64;

/// Which claimant keeps a contested candidate address
///
/// Both sides of a conflict apply the same deterministic comparison on the
/// hardware ids carried in the claims, so exactly one of them backs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TieBreak {
    /// The numerically higher hardware id keeps the candidate
    #[default]
    HigherIdWins,
    /// The numerically lower hardware id keeps the candidate
    LowerIdWins,
}

/// Per-node configuration for the ring engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingConfig {
    /// Stable per-device identifier used for arbitration and jitter
    pub hardware_id: u32,
    /// Name announced in address claims (up to 16 bytes)
    pub device_name: DeviceName,
    /// Silence window armed by the watcher (ms)
    pub silence_timeout_ms: u32,
    /// Base debounce after silence; per-device jitter is added on top (ms)
    pub claim_debounce_ms: u32,
    /// Contention window for an address claim (ms)
    pub claim_timeout_ms: u32,
    /// Arbitration policy for contested candidates
    pub tie_break: TieBreak,
    /// First candidate address to claim; derived from the hardware id when
    /// unset
    pub initial_candidate: Option<u8>,
}

impl RingConfig {
    /// Configuration with default timing for the given hardware id
    pub fn new(hardware_id: u32) -> Self {
        Self {
            hardware_id,
            device_name: DeviceName::new(),
            silence_timeout_ms: SILENCE_TIMEOUT_MS,
            claim_debounce_ms: CLAIM_DEBOUNCE_MS,
            claim_timeout_ms: CLAIM_TIMEOUT_MS,
            tie_break: TieBreak::default(),
            initial_candidate: None,
        }
    }

    /// Set the announced device name (truncated to capacity)
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name.clear();
        let end = name
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= self.device_name.capacity())
            .last()
            .unwrap_or(0);
        let _ = self.device_name.push_str(&name[..end]);
        self
    }

    /// After-silence debounce including the per-device jitter
    ///
    /// Two nodes observing the same silence must not begin claiming in the
    /// same instant; the jitter derives from the hardware id so the offset
    /// is stable per device.
    pub fn debounce_with_jitter_ms(&self) -> u32 {
        self.claim_debounce_ms + self.hardware_id % DEBOUNCE_JITTER_SPREAD_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RingConfig::new(0xC0FFEE);
        assert_eq!(config.silence_timeout_ms, SILENCE_TIMEOUT_MS);
        assert_eq!(config.claim_timeout_ms, CLAIM_TIMEOUT_MS);
        assert_eq!(config.tie_break, TieBreak::HigherIdWins);
        assert!(config.initial_candidate.is_none());
        assert!(config.device_name.is_empty());
    }

    #[test]
    fn test_jitter_is_stable_and_bounded() {
        let a = RingConfig::new(1001);
        let b = RingConfig::new(1002);
        assert_eq!(a.debounce_with_jitter_ms(), a.debounce_with_jitter_ms());
        assert!(a.debounce_with_jitter_ms() >= a.claim_debounce_ms);
        assert!(a.debounce_with_jitter_ms() < a.claim_debounce_ms + 64);
        // adjacent ids land on different offsets
        assert_ne!(a.debounce_with_jitter_ms(), b.debounce_with_jitter_ms());
    }

    #[test]
    fn test_device_name_truncated() {
        let config = RingConfig::new(1).with_device_name("a-very-long-device-name");
        assert_eq!(config.device_name.len(), 16);
        assert_eq!(config.device_name.as_str(), "a-very-long-devi");
    }
}
