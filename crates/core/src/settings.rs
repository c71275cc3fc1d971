use std::time::Duration;

use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("settle delay must be between 1 ms and 60 s")]
    InvalidSettleDelay,

    #[error("tick interval must be between 1 ms and 60 s")]
    InvalidTickInterval,
}

const MAX_INTERVAL_MS: u64 = 60_000;

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Timing knobs for a learning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    settle_delay_ms: u64,
    tick_interval_ms: u64,
}

impl Default for SessionSettings {
    /// One second after each reveal step, one elapsed-time tick per second.
    fn default() -> Self {
        Self {
            settle_delay_ms: 1_000,
            tick_interval_ms: 1_000,
        }
    }
}

impl SessionSettings {
    /// # Errors
    ///
    /// Returns an error if either value is zero or above one minute.
    pub fn new(settle_delay_ms: u64, tick_interval_ms: u64) -> Result<Self, SettingsError> {
        if !(1..=MAX_INTERVAL_MS).contains(&settle_delay_ms) {
            return Err(SettingsError::InvalidSettleDelay);
        }
        if !(1..=MAX_INTERVAL_MS).contains(&tick_interval_ms) {
            return Err(SettingsError::InvalidTickInterval);
        }
        Ok(Self {
            settle_delay_ms,
            tick_interval_ms,
        })
    }

    /// # Errors
    ///
    /// Returns `SettingsError::InvalidSettleDelay` for out-of-range values.
    pub fn with_settle_delay_ms(self, settle_delay_ms: u64) -> Result<Self, SettingsError> {
        Self::new(settle_delay_ms, self.tick_interval_ms)
    }

    /// Pause between the end of a reveal step's audio and the next phase.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Period of the elapsed-time ticker. Each tick adds this much to the
    /// session's elapsed time.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_one_second() {
        let s = SessionSettings::default();
        assert_eq!(s.settle_delay(), Duration::from_secs(1));
        assert_eq!(s.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(
            SessionSettings::new(0, 1_000).unwrap_err(),
            SettingsError::InvalidSettleDelay
        );
        assert_eq!(
            SessionSettings::new(1_000, 60_001).unwrap_err(),
            SettingsError::InvalidTickInterval
        );
        let s = SessionSettings::default().with_settle_delay_ms(250).unwrap();
        assert_eq!(s.settle_delay(), Duration::from_millis(250));
    }
}
