/// Capture service: the body of the promiscuous-mode receive callback.
///
/// Driver frame → header check → two observations → two records →
/// transport. Runs in the driver's delivery context: no allocation, no
/// blocking, nothing retained once it returns.
///
/// The sink is injected at construction, so the same service runs
/// against the firmware's record queue or a test buffer fed by a
/// synthetic frame source.

use crate::frame::{observations, CapturedFrame, RxMeta};
use crate::record::encode;
use crate::status::CaptureStats;
use crate::transport::{RecordSink, Transport};

pub struct CaptureService<'s, S> {
    transport: Transport<'s, S>,
    stats: &'s CaptureStats,
}

impl<'s, S: RecordSink> CaptureService<'s, S> {
    pub fn new(sink: S, stats: &'s CaptureStats) -> Self {
        Self {
            transport: Transport::new(sink, stats),
            stats,
        }
    }

    /// Handle one delivered frame. Emits two records for any frame that
    /// holds the full header and none otherwise. Returns how many of those
    /// records the sink accepted.
    pub fn on_frame(&mut self, bytes: &[u8], meta: RxMeta) -> usize {
        let frame = match CapturedFrame::parse(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.record_malformed();
                log::trace!("ch={} discarded: {}", meta.channel, e);
                return 0;
            }
        };

        let kind = frame.kind();
        self.stats.record_frame(kind);
        log::trace!(
            "{} ch={} rssi={} a1={} a2={} a3={}",
            kind.as_str(),
            meta.channel,
            meta.rssi,
            frame.receiver(),
            frame.transmitter(),
            frame.filtering(),
        );

        let mut accepted = 0;
        for observation in observations(&frame, meta.rssi) {
            if self.transport.emit(&encode(&observation)).is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn sink(&self) -> &S {
        self.transport.sink()
    }

    pub fn into_sink(self) -> S {
        self.transport.into_sink()
    }
}
