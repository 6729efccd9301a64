/// Capture diagnostics and the console status report.
///
/// Counters are updated from the sniffer callback, the UART writer and
/// the channel hop task, and read by the status task. They are plain
/// relaxed atomics: each value is independently monotonic, and a report
/// may mix values from slightly different instants.
///
/// Status reports are JSON and go to the log console only, never to the
/// record link (the consumer there expects nothing but 8-byte records).
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

use crate::frame::FrameKind;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized status report
pub const MAX_REPORT_LEN: usize = 384;

/// Shared capture counters.
pub struct CaptureStats {
    frames: AtomicU32,
    by_kind: [AtomicU32; 4],
    malformed: AtomicU32,
    accepted: AtomicU32,
    emitted: AtomicU32,
    dropped: AtomicU32,
    channel: AtomicU8,
    channel_failures: AtomicU32,
}

impl CaptureStats {
    pub const fn new() -> Self {
        Self {
            frames: AtomicU32::new(0),
            by_kind: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
            malformed: AtomicU32::new(0),
            accepted: AtomicU32::new(0),
            emitted: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            channel: AtomicU8::new(0),
            channel_failures: AtomicU32::new(0),
        }
    }

    pub fn record_frame(&self, kind: FrameKind) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        let slot = match kind {
            FrameKind::Management => 0,
            FrameKind::Control => 1,
            FrameKind::Data => 2,
            FrameKind::Extension => 3,
        };
        self.by_kind[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// A frame too short to carry the fixed header.
    pub fn record_malformed(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// A record the capture-side sink took (for firmware: queued for the
    /// UART writer).
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// A record written in full to the serial link.
    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A record lost at either stage: a full queue, or a UART that did not
    /// drain in time or failed. Each record is counted once, as emitted or
    /// dropped, at the stage it ends at.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_channel(&self, channel: u8) {
        self.channel.store(channel, Ordering::Relaxed);
    }

    pub fn channel(&self) -> u8 {
        self.channel.load(Ordering::Relaxed)
    }

    pub fn record_channel_failure(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            channel: self.channel.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            mgmt: self.by_kind[0].load(Ordering::Relaxed),
            ctrl: self.by_kind[1].load(Ordering::Relaxed),
            data: self.by_kind[2].load(Ordering::Relaxed),
            ext: self.by_kind[3].load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Channel the radio was last tuned to (0 before the first tune)
    #[serde(rename = "ch")]
    pub channel: u8,
    pub frames: u32,
    pub mgmt: u32,
    pub ctrl: u32,
    pub data: u32,
    pub ext: u32,
    pub malformed: u32,
    /// Records queued for the link
    pub accepted: u32,
    /// Records written to the link
    pub emitted: u32,
    pub dropped: u32,
    #[serde(rename = "ch_fail")]
    pub channel_failures: u32,
}

/// Messages written to the log console
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ConsoleMessage<'a> {
    /// Periodic device status
    #[serde(rename = "status")]
    Status {
        stats: &'a StatsSnapshot,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Serialize a console message into `buf`.
/// Returns the number of bytes written, or None if it did not fit.
pub fn serialize_message(msg: &ConsoleMessage, buf: &mut [u8]) -> Option<usize> {
    serde_json_core::to_slice(msg, buf).ok()
}
