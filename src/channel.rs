/// Channel sweep scheduler.
///
/// Blind round-robin over channels 1..=max: every tick advances one
/// channel, wrapping from max back to 1, and retunes the radio. Dwell time
/// is fixed; nothing about capture activity changes the sweep.
///
/// A failed retune is logged and counted, and the sweep carries on. The
/// radio stays on whatever channel it was on until the next tick.

use core::fmt;

use crate::config::{ConfigError, SnifferConfig, MAX_SUPPORTED_CHANNEL};
use crate::status::CaptureStats;

/// The driver call that retunes the radio.
pub trait ChannelControl {
    type Error: fmt::Debug;

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error>;
}

impl<C: ChannelControl + ?Sized> ChannelControl for &mut C {
    type Error = C::Error;

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        (**self).set_channel(channel)
    }
}

/// Current-channel state machine. Always holds a value in `1..=max`.
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    current: u8,
    max: u8,
}

impl ChannelScheduler {
    /// Scheduler starting on channel 1.
    pub fn new(max_channel: u8) -> Result<Self, ConfigError> {
        if max_channel == 0 || max_channel > MAX_SUPPORTED_CHANNEL {
            return Err(ConfigError::ChannelRange(max_channel));
        }
        Ok(Self {
            current: 1,
            max: max_channel,
        })
    }

    pub fn from_config(config: &SnifferConfig) -> Result<Self, ConfigError> {
        Self::new(config.max_channel)
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn max_channel(&self) -> u8 {
        self.max
    }

    /// Step to the next channel without touching the radio.
    pub fn advance(&mut self) -> u8 {
        self.current = (self.current % self.max) + 1;
        self.current
    }

    /// Program the initial channel. Called once before the first dwell.
    pub fn start<R: ChannelControl>(&self, radio: &mut R, stats: &CaptureStats) -> bool {
        apply(radio, self.current, stats)
    }

    /// Advance and retune. Returns the new channel whether or not the
    /// radio accepted it.
    pub fn tick<R: ChannelControl>(&mut self, radio: &mut R, stats: &CaptureStats) -> u8 {
        let channel = self.advance();
        apply(radio, channel, stats);
        channel
    }
}

fn apply<R: ChannelControl>(radio: &mut R, channel: u8, stats: &CaptureStats) -> bool {
    match radio.set_channel(channel) {
        Ok(()) => {
            stats.set_channel(channel);
            true
        }
        Err(e) => {
            log::warn!("Channel set to {} failed: {:?}", channel, e);
            stats.record_channel_failure();
            false
        }
    }
}
