/// Fixed 8-byte observation record, the only thing written to the link.
///
/// ```text
/// ┌──────┬───────────────────────────────┬────────┐
/// │ 0x80 │ address (6 bytes, as captured) │ signal │
/// └──────┴───────────────────────────────┴────────┘
/// ```
///
/// No length, checksum or escaping. Consumers resynchronize on the flag
/// byte and the fixed stride.
///
/// The signal byte is the driver RSSI with its sign flipped (-45 becomes
/// 45), clamped to `i8` and sent as its two's complement byte. This is
/// not a calibrated dBm value; existing receivers expect exactly this.

use crate::frame::MacAddress;

/// First byte of every record
pub const RECORD_FLAG: u8 = 0x80;

/// Every record is exactly this long
pub const RECORD_LEN: usize = 8;

/// One (address, signal strength) pair taken from a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub address: MacAddress,
    /// Sign-inverted driver RSSI, not yet clamped
    pub signal: i32,
}

impl Observation {
    /// Build an observation from the driver's raw RSSI.
    pub fn from_raw(address: MacAddress, raw_rssi: i32) -> Self {
        Self {
            address,
            signal: raw_rssi.saturating_neg(),
        }
    }
}

/// Signal value as it appears on the wire.
pub fn clamp_signal(signal: i32) -> i8 {
    signal.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// An encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record([u8; RECORD_LEN]);

impl Record {
    pub fn as_bytes(&self) -> &[u8; RECORD_LEN] {
        &self.0
    }

    pub fn flag(&self) -> u8 {
        self.0[0]
    }

    pub fn address(&self) -> MacAddress {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.0[1..7]);
        MacAddress::from(octets)
    }

    pub fn signal(&self) -> i8 {
        self.0[7] as i8
    }

    /// Reinterpret 8 received bytes. Returns None unless the flag is set.
    pub fn from_bytes(bytes: [u8; RECORD_LEN]) -> Option<Self> {
        (bytes[0] == RECORD_FLAG).then_some(Self(bytes))
    }
}

/// Encode an observation. Total: out-of-range signals are clamped.
pub fn encode(observation: &Observation) -> Record {
    let mut bytes = [0u8; RECORD_LEN];
    bytes[0] = RECORD_FLAG;
    bytes[1..7].copy_from_slice(observation.address.octets());
    bytes[7] = clamp_signal(observation.signal) as u8;
    Record(bytes)
}

/// Consumer-side stride decoder.
///
/// Bytes are fed one at a time. While idle, anything but the flag byte is
/// skipped; once a flag is seen the next seven bytes complete a record
/// regardless of their value. A truncated record would swallow the flag
/// of the one after it, so writers only ever put whole records on the
/// link.
pub struct RecordReader {
    buf: [u8; RECORD_LEN],
    pos: usize,
    skipped: u32,
}

impl RecordReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; RECORD_LEN],
            pos: 0,
            skipped: 0,
        }
    }

    /// Feed a byte. Returns a record when the eighth byte arrives.
    pub fn feed(&mut self, byte: u8) -> Option<Record> {
        if self.pos == 0 && byte != RECORD_FLAG {
            self.skipped = self.skipped.saturating_add(1);
            return None;
        }
        self.buf[self.pos] = byte;
        self.pos += 1;
        if self.pos == RECORD_LEN {
            self.pos = 0;
            Record::from_bytes(self.buf)
        } else {
            None
        }
    }

    /// Bytes discarded while hunting for a flag
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new()
    }
}
