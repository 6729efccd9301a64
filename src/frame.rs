/// 802.11 MAC header extraction.
///
/// Every captured frame, whatever its type, carries the same fixed-offset
/// header prefix. We read it with explicit offsets instead of overlaying a
/// struct, and refuse any buffer too short to hold it:
///
/// ```text
/// offset  0   2   4        10       16       22  24
///         ┌───┬───┬────────┬────────┬────────┬───┐
///         │ FC│Dur│ addr1  │ addr2  │ addr3  │Seq│
///         └───┴───┴────────┴────────┴────────┴───┘
///                  receiver transmit filtering
/// ```
///
/// 16-bit fields are little-endian, as on air. Addresses are kept in the
/// byte order they were captured in.
///
/// Safe to call from ISR context (no allocation, no blocking).

use core::fmt;

use crate::record::Observation;

/// Fixed header length: frame control through sequence control.
pub const HEADER_LEN: usize = 24;

const FRAME_CONTROL: usize = 0;
const DURATION_ID: usize = 2;
const ADDR1: usize = 4;
const ADDR2: usize = 10;
const ADDR3: usize = 16;
const SEQUENCE_CONTROL: usize = 22;

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn octets(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer ends before the fixed header does
    TooShort { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort { len } => {
                write!(f, "frame of {} bytes shorter than {}-byte header", len, HEADER_LEN)
            }
        }
    }
}

/// Frame class from the 2-bit type field of the frame control.
/// Diagnostics only; extraction treats every kind the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Management,
    Control,
    Data,
    Extension,
}

impl FrameKind {
    pub fn from_frame_control(fc: u16) -> Self {
        match (fc >> 2) & 0x3 {
            0 => FrameKind::Management,
            1 => FrameKind::Control,
            2 => FrameKind::Data,
            _ => FrameKind::Extension,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Management => "mgmt",
            FrameKind::Control => "ctrl",
            FrameKind::Data => "data",
            FrameKind::Extension => "ext",
        }
    }
}

/// Driver-supplied metadata delivered alongside each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMeta {
    /// Driver-reported RSSI, native units (more negative = weaker)
    pub rssi: i32,
    pub channel: u8,
}

/// Borrowed view of a captured frame whose header length has been checked.
///
/// Lives only as long as the driver's buffer; nothing here outlives the
/// callback that produced it.
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> CapturedFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort { len: bytes.len() });
        }
        Ok(Self { bytes })
    }

    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn addr_at(&self, offset: usize) -> MacAddress {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.bytes[offset..offset + 6]);
        MacAddress::from(octets)
    }

    pub fn frame_control(&self) -> u16 {
        self.u16_at(FRAME_CONTROL)
    }

    pub fn duration_id(&self) -> u16 {
        self.u16_at(DURATION_ID)
    }

    pub fn receiver(&self) -> MacAddress {
        self.addr_at(ADDR1)
    }

    pub fn transmitter(&self) -> MacAddress {
        self.addr_at(ADDR2)
    }

    pub fn filtering(&self) -> MacAddress {
        self.addr_at(ADDR3)
    }

    pub fn sequence_control(&self) -> u16 {
        self.u16_at(SEQUENCE_CONTROL)
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_frame_control(self.frame_control())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Extract the two observations carried by a frame: transmitter address
/// first, then filtering address, both with the same signal strength.
pub fn extract(bytes: &[u8], rssi: i32) -> Result<[Observation; 2], FrameError> {
    let frame = CapturedFrame::parse(bytes)?;
    Ok(observations(&frame, rssi))
}

/// Observations for an already-validated frame.
pub fn observations(frame: &CapturedFrame<'_>, rssi: i32) -> [Observation; 2] {
    [
        Observation::from_raw(frame.transmitter(), rssi),
        Observation::from_raw(frame.filtering(), rssi),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TRANSMITTER: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    pub(crate) const FILTERING: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    const RECEIVER: [u8; 6] = [0xFF; 6];

    /// Build a header with the given frame control and the fixed test addresses.
    pub(crate) fn header(fc: u16) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&fc.to_le_bytes());
        buf[2..4].copy_from_slice(&0x013Au16.to_le_bytes());
        buf[4..10].copy_from_slice(&RECEIVER);
        buf[10..16].copy_from_slice(&TRANSMITTER);
        buf[16..22].copy_from_slice(&FILTERING);
        buf[22..24].copy_from_slice(&0x1230u16.to_le_bytes());
        buf
    }

    // ── Header parsing ──────────────────────────────────────────────

    #[test]
    fn parse_reads_fixed_offsets() {
        let buf = header(0x0080);
        let frame = CapturedFrame::parse(&buf).unwrap();
        assert_eq!(frame.frame_control(), 0x0080);
        assert_eq!(frame.duration_id(), 0x013A);
        assert_eq!(frame.receiver(), MacAddress(RECEIVER));
        assert_eq!(frame.transmitter(), MacAddress(TRANSMITTER));
        assert_eq!(frame.filtering(), MacAddress(FILTERING));
        assert_eq!(frame.sequence_control(), 0x1230);
    }

    #[test]
    fn parse_rejects_four_byte_buffer() {
        let buf = [0x80, 0x00, 0x00, 0x00];
        assert_eq!(
            CapturedFrame::parse(&buf).unwrap_err(),
            FrameError::TooShort { len: 4 }
        );
    }

    #[test]
    fn parse_rejects_one_byte_short() {
        let buf = header(0x0080);
        assert!(CapturedFrame::parse(&buf[..HEADER_LEN - 1]).is_err());
    }

    #[test]
    fn parse_rejects_empty_buffer() {
        assert_eq!(
            CapturedFrame::parse(&[]).unwrap_err(),
            FrameError::TooShort { len: 0 }
        );
    }

    #[test]
    fn parse_accepts_payload_after_header() {
        let mut buf = [0u8; 64];
        buf[..HEADER_LEN].copy_from_slice(&header(0x0008));
        let frame = CapturedFrame::parse(&buf).unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(frame.transmitter(), MacAddress(TRANSMITTER));
    }

    // ── Frame kind ──────────────────────────────────────────────────

    #[test]
    fn kind_from_frame_control_type_bits() {
        assert_eq!(FrameKind::from_frame_control(0x0080), FrameKind::Management); // beacon
        assert_eq!(FrameKind::from_frame_control(0x0040), FrameKind::Management); // probe req
        assert_eq!(FrameKind::from_frame_control(0x00D4), FrameKind::Control); // ACK
        assert_eq!(FrameKind::from_frame_control(0x0008), FrameKind::Data);
        assert_eq!(FrameKind::from_frame_control(0x0288), FrameKind::Data); // QoS, FromDS
        assert_eq!(FrameKind::from_frame_control(0x000C), FrameKind::Extension);
    }

    // ── Extraction ──────────────────────────────────────────────────

    #[test]
    fn extract_yields_transmitter_then_filtering() {
        let buf = header(0x0080);
        let [first, second] = extract(&buf, -60).unwrap();
        assert_eq!(first.address, MacAddress(TRANSMITTER));
        assert_eq!(second.address, MacAddress(FILTERING));
        assert_eq!(first.signal, 60);
        assert_eq!(second.signal, first.signal);
    }

    #[test]
    fn extract_ignores_frame_type() {
        for fc in [0x0080u16, 0x00D4, 0x0008, 0x000C] {
            let buf = header(fc);
            let obs = extract(&buf, -45).unwrap();
            assert_eq!(obs[0].address, MacAddress(TRANSMITTER), "fc {fc:#06x}");
            assert_eq!(obs[1].address, MacAddress(FILTERING), "fc {fc:#06x}");
        }
    }

    #[test]
    fn extract_short_frame_yields_nothing() {
        let buf = header(0x0080);
        assert!(extract(&buf[..16], -60).is_err());
        assert!(extract(&buf[..4], -60).is_err());
    }

    #[test]
    fn extract_never_reports_receiver_address() {
        let buf = header(0x0080);
        let obs = extract(&buf, -70).unwrap();
        assert!(obs.iter().all(|o| o.address != MacAddress(RECEIVER)));
    }

    // ── MacAddress ──────────────────────────────────────────────────

    #[test]
    fn mac_display_is_colon_separated_upper_hex() {
        let mut s = heapless::String::<18>::new();
        core::fmt::write(&mut s, format_args!("{}", MacAddress(TRANSMITTER))).unwrap();
        assert_eq!(s.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn mac_display_pads_single_digit_octets() {
        let mut s = heapless::String::<18>::new();
        core::fmt::write(&mut s, format_args!("{}", MacAddress([0, 1, 2, 0x0A, 0x0B, 0x0C]))).unwrap();
        assert_eq!(s.as_str(), "00:01:02:0A:0B:0C");
    }
}
