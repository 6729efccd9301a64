/// Compile-time sniffer configuration.
///
/// There is no persisted or runtime-editable state: firmware builds a
/// [`SnifferConfig`] from these defaults, validates it once at boot, and
/// hands copies to the tasks that need it.

use core::fmt;

/// Highest 2.4 GHz channel swept in the reference deployment.
pub const MAX_CHANNEL: u8 = 13;

/// Highest channel any regulatory domain allows on 2.4 GHz.
pub const MAX_SUPPORTED_CHANNEL: u8 = 14;

/// Dwell time per channel in milliseconds.
/// Full sweep: 13 channels × 500ms = 6.5s.
pub const DEFAULT_DWELL_MS: u64 = 500;

/// Record link baud rate
pub const DEFAULT_UART_BAUD: u32 = 9600;

/// Longest the writer waits on the UART for one record before dropping it.
/// One record takes ~8.3ms on the wire at 9600 baud.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 50;

/// Interval between status reports on the log console
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_channel` outside `1..=MAX_SUPPORTED_CHANNEL`
    ChannelRange(u8),
    ZeroDwell,
    ZeroBaud,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ChannelRange(ch) => write!(
                f,
                "max channel {} outside 1..={}",
                ch, MAX_SUPPORTED_CHANNEL
            ),
            ConfigError::ZeroDwell => f.write_str("channel dwell must be non-zero"),
            ConfigError::ZeroBaud => f.write_str("record link baud rate must be non-zero"),
        }
    }
}

/// Sweep, link and reporting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnifferConfig {
    /// Sweep wraps from this channel back to 1
    pub max_channel: u8,
    /// Time spent on each channel before retuning
    pub dwell_ms: u64,
    pub uart_baud: u32,
    pub write_timeout_ms: u64,
    pub status_interval_secs: u64,
}

impl SnifferConfig {
    pub const fn new() -> Self {
        Self {
            max_channel: MAX_CHANNEL,
            dwell_ms: DEFAULT_DWELL_MS,
            uart_baud: DEFAULT_UART_BAUD,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channel == 0 || self.max_channel > MAX_SUPPORTED_CHANNEL {
            return Err(ConfigError::ChannelRange(self.max_channel));
        }
        if self.dwell_ms == 0 {
            return Err(ConfigError::ZeroDwell);
        }
        if self.uart_baud == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        Ok(())
    }

    /// Time for one complete sweep across all channels.
    pub fn sweep_period_ms(&self) -> u64 {
        self.dwell_ms * self.max_channel as u64
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self::new()
    }
}
