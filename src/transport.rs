/// Record transport: hands encoded records to a byte sink.
///
/// A sink accepts a whole record or rejects it; there is no partial write
/// at this layer, so the 8-byte stride on the link is never broken by a
/// failed emit. Failures are counted and reported to the caller as a
/// dropped record. Nothing here retries.
///
/// The sniffer callback runs in the driver's delivery context and must not
/// wait on the UART. Firmware therefore emits into a [`QueueSink`]: a
/// bounded queue that drops when full. A writer task drains the queue to
/// the serial link through a [`LinkWriter`], whose deadline only covers
/// the wait before a record's first byte.
///
/// The driver never re-enters the callback, so `Transport` holds no lock.
/// If delivery ever became concurrent, the queue is already a
/// multi-producer channel and keeps each record whole.

use core::fmt;
use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::record::{Record, RECORD_LEN};
use crate::status::CaptureStats;

/// Records buffered between the sniffer callback and the UART writer.
/// 64 records = 512 bytes, ~0.5s of link time at 9600 baud.
pub const RECORD_QUEUE_DEPTH: usize = 64;

/// Queue from the sniffer callback to the UART writer
pub type RecordQueue = Channel<CriticalSectionRawMutex, Record, RECORD_QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// No room for a whole record right now
    Full,
    /// The link did not accept the record in time
    Timeout,
    /// The link is gone
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Full => f.write_str("sink full"),
            SinkError::Timeout => f.write_str("sink write timed out"),
            SinkError::Closed => f.write_str("sink closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    /// The record was not written; the link is still on a record boundary
    Dropped(SinkError),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Dropped(e) => write!(f, "record dropped: {}", e),
        }
    }
}

/// Destination for encoded records.
pub trait RecordSink {
    /// Write all 8 bytes of `record`, or none of them.
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        (**self).write_record(record)
    }
}

/// In-memory byte sink. Rejects a record that would not fit whole.
impl<const N: usize> RecordSink for heapless::Vec<u8, N> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        if N - self.len() < RECORD_LEN {
            return Err(SinkError::Full);
        }
        self.extend_from_slice(record.as_bytes())
            .map_err(|_| SinkError::Full)
    }
}

/// Non-blocking sink over a [`RecordQueue`]; drops when the queue is full.
pub struct QueueSink<'q> {
    queue: &'q RecordQueue,
}

impl<'q> QueueSink<'q> {
    pub const fn new(queue: &'q RecordQueue) -> Self {
        Self { queue }
    }
}

impl RecordSink for QueueSink<'_> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        self.queue.try_send(*record).map_err(|_| SinkError::Full)
    }
}

/// Where a [`Transport`] sits in the pipeline, which decides the counter a
/// successful emit lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Capture side: the sink queues or buffers the record
    Capture,
    /// Link side: the sink is the serial link itself
    Link,
}

/// Owns a sink and accounts for every record handed to it.
pub struct Transport<'s, S> {
    sink: S,
    stats: &'s CaptureStats,
    stage: Stage,
}

impl<'s, S: RecordSink> Transport<'s, S> {
    /// Capture-side transport; accepted records count as `accepted`.
    pub fn new(sink: S, stats: &'s CaptureStats) -> Self {
        Self {
            sink,
            stats,
            stage: Stage::Capture,
        }
    }

    /// Transport straight onto the serial link; accepted records count as
    /// `emitted`.
    pub fn on_link(sink: S, stats: &'s CaptureStats) -> Self {
        Self {
            sink,
            stats,
            stage: Stage::Link,
        }
    }

    /// Emit one record: flag, six address bytes, signal, in that order.
    pub fn emit(&mut self, record: &Record) -> Result<(), EmitError> {
        match self.sink.write_record(record) {
            Ok(()) => {
                match self.stage {
                    Stage::Capture => self.stats.record_accepted(),
                    Stage::Link => self.stats.record_emitted(),
                }
                Ok(())
            }
            Err(e) => {
                self.stats.record_dropped();
                Err(EmitError::Dropped(e))
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Async serial link that records are drained onto.
#[allow(async_fn_in_trait)]
pub trait RecordLink {
    type Error: fmt::Debug;

    /// Resolve once everything already written has left the link.
    async fn drained(&mut self) -> Result<(), Self::Error>;

    /// Hand over a prefix of `bytes`; returns how many were taken.
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, Self::Error>;
}

/// Drains records onto a [`RecordLink`] one whole record at a time.
///
/// The deadline bounds only the wait for the link to drain. Once the
/// first byte of a record is handed over the other seven always follow,
/// so a slow link costs whole records and the 8-byte stride holds. Only a
/// link error part way through a record can break it.
pub struct LinkWriter<'s, L> {
    link: L,
    stats: &'s CaptureStats,
}

impl<'s, L: RecordLink> LinkWriter<'s, L> {
    pub fn new(link: L, stats: &'s CaptureStats) -> Self {
        Self { link, stats }
    }

    /// Write `record`, or drop it if the link has not drained by the time
    /// `deadline` resolves.
    pub async fn write<D>(&mut self, record: &Record, deadline: D) -> Result<(), EmitError>
    where
        D: Future<Output = ()>,
    {
        match self.send(record, deadline).await {
            Ok(()) => {
                self.stats.record_emitted();
                Ok(())
            }
            Err(e) => {
                self.stats.record_dropped();
                Err(EmitError::Dropped(e))
            }
        }
    }

    async fn send<D>(&mut self, record: &Record, deadline: D) -> Result<(), SinkError>
    where
        D: Future<Output = ()>,
    {
        match select(self.link.drained(), deadline).await {
            Either::First(Ok(())) => {}
            Either::First(Err(e)) => {
                log::warn!("Record link drain failed: {:?}", e);
                return Err(SinkError::Closed);
            }
            Either::Second(()) => return Err(SinkError::Timeout),
        }

        let mut bytes: &[u8] = record.as_bytes();
        while !bytes.is_empty() {
            match self.link.write(bytes).await {
                Ok(0) => {
                    log::error!(
                        "Record link closed {} bytes into a record",
                        RECORD_LEN - bytes.len()
                    );
                    return Err(SinkError::Closed);
                }
                Ok(n) => bytes = &bytes[n..],
                Err(e) => {
                    log::error!(
                        "Record link failed {} bytes into a record: {:?}",
                        RECORD_LEN - bytes.len(),
                        e
                    );
                    return Err(SinkError::Closed);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MacAddress;
    use crate::record::{encode, Observation, RecordReader};

    fn record(last: u8, rssi: i32) -> Record {
        encode(&Observation::from_raw(MacAddress([1, 2, 3, 4, 5, last]), rssi))
    }

    // ── Byte sink ───────────────────────────────────────────────────

    #[test]
    fn emit_writes_record_bytes_in_order() {
        let stats = CaptureStats::new();
        let mut transport = Transport::new(heapless::Vec::<u8, 64>::new(), &stats);
        transport.emit(&record(6, -60)).unwrap();
        assert_eq!(transport.sink().as_slice(), &[0x80, 1, 2, 3, 4, 5, 6, 60]);
        assert_eq!(stats.snapshot().accepted, 1);
    }

    #[test]
    fn full_sink_drops_whole_record() {
        let stats = CaptureStats::new();
        // Room for one record plus 4 stray bytes
        let mut transport = Transport::new(heapless::Vec::<u8, 12>::new(), &stats);
        transport.emit(&record(1, -40)).unwrap();
        assert_eq!(
            transport.emit(&record(2, -40)),
            Err(EmitError::Dropped(SinkError::Full))
        );
        // Nothing of the dropped record reached the sink
        assert_eq!(transport.sink().len(), RECORD_LEN);

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.dropped, 1);
    }

    #[test]
    fn emits_concatenate_on_fixed_stride() {
        let stats = CaptureStats::new();
        let mut transport = Transport::new(heapless::Vec::<u8, 80>::new(), &stats);
        for i in 0..10u8 {
            transport.emit(&record(i, -(i as i32))).unwrap();
        }
        let bytes = transport.into_sink();
        assert_eq!(bytes.len(), 10 * RECORD_LEN);
        for (i, chunk) in bytes.chunks(RECORD_LEN).enumerate() {
            assert_eq!(chunk[0], 0x80);
            assert_eq!(chunk[6], i as u8);
            assert_eq!(chunk[7], i as u8);
        }
    }

    #[test]
    fn borrowed_sink_is_a_sink() {
        let stats = CaptureStats::new();
        let mut buf = heapless::Vec::<u8, 16>::new();
        Transport::new(&mut buf, &stats).emit(&record(9, -1)).unwrap();
        assert_eq!(buf.len(), RECORD_LEN);
    }

    // ── Queue sink ──────────────────────────────────────────────────

    #[test]
    fn queue_sink_delivers_in_order() {
        let queue = RecordQueue::new();
        let stats = CaptureStats::new();
        let mut transport = Transport::new(QueueSink::new(&queue), &stats);
        transport.emit(&record(1, -10)).unwrap();
        transport.emit(&record(2, -20)).unwrap();

        assert_eq!(queue.try_receive().ok(), Some(record(1, -10)));
        assert_eq!(queue.try_receive().ok(), Some(record(2, -20)));
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn queue_sink_drops_and_counts_when_full() {
        let queue = RecordQueue::new();
        let stats = CaptureStats::new();
        let mut transport = Transport::new(QueueSink::new(&queue), &stats);
        for i in 0..RECORD_QUEUE_DEPTH {
            transport.emit(&record(i as u8, -50)).unwrap();
        }
        assert_eq!(
            transport.emit(&record(0xFF, -50)),
            Err(EmitError::Dropped(SinkError::Full))
        );

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, RECORD_QUEUE_DEPTH as u32);
        assert_eq!(snap.dropped, 1);

        // Draining frees room again
        queue.try_receive().unwrap();
        assert!(transport.emit(&record(0xFE, -50)).is_ok());
    }

    #[test]
    fn link_transport_counts_emitted() {
        let stats = CaptureStats::new();
        let mut transport = Transport::on_link(heapless::Vec::<u8, 16>::new(), &stats);
        transport.emit(&record(3, -70)).unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.emitted, 1);
        assert_eq!(snap.accepted, 0);
    }

    // ── Link writer ─────────────────────────────────────────────────

    /// In-memory link: takes at most `chunk` bytes per write and can be
    /// held busy or made to fail part way through.
    struct TestLink {
        wire: heapless::Vec<u8, 64>,
        busy: bool,
        chunk: usize,
        slow: bool,
        fail_at: Option<usize>,
    }

    impl TestLink {
        fn new() -> Self {
            Self {
                wire: heapless::Vec::new(),
                busy: false,
                chunk: RECORD_LEN,
                slow: false,
                fail_at: None,
            }
        }
    }

    impl RecordLink for TestLink {
        type Error = ();

        async fn drained(&mut self) -> Result<(), ()> {
            if self.busy {
                core::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn write(&mut self, bytes: &[u8]) -> Result<usize, ()> {
            if self.slow {
                embassy_futures::yield_now().await;
            }
            if self.fail_at == Some(self.wire.len()) {
                return Err(());
            }
            let n = bytes.len().min(self.chunk);
            self.wire.extend_from_slice(&bytes[..n]).map_err(|_| ())?;
            Ok(n)
        }
    }

    fn decode(bytes: &[u8]) -> heapless::Vec<Record, 8> {
        let mut reader = RecordReader::new();
        bytes.iter().filter_map(|&b| reader.feed(b)).collect()
    }

    #[test]
    fn link_writer_writes_whole_record() {
        let stats = CaptureStats::new();
        let mut writer = LinkWriter::new(TestLink::new(), &stats);
        embassy_futures::block_on(writer.write(&record(6, -60), core::future::pending()))
            .unwrap();
        assert_eq!(writer.link.wire.as_slice(), &[0x80, 1, 2, 3, 4, 5, 6, 60]);
        assert_eq!(stats.snapshot().emitted, 1);
    }

    #[test]
    fn busy_link_times_out_before_first_byte() {
        let stats = CaptureStats::new();
        let mut link = TestLink::new();
        link.busy = true;
        let mut writer = LinkWriter::new(link, &stats);

        let a = record(0xAA, -40);
        let b = record(0xBB, -60);
        assert_eq!(
            embassy_futures::block_on(writer.write(&a, core::future::ready(()))),
            Err(EmitError::Dropped(SinkError::Timeout))
        );
        assert!(writer.link.wire.is_empty());

        // The next record still starts on a record boundary
        writer.link.busy = false;
        embassy_futures::block_on(writer.write(&b, core::future::ready(()))).unwrap();
        assert_eq!(decode(&writer.link.wire).as_slice(), &[b]);

        let snap = stats.snapshot();
        assert_eq!(snap.emitted, 1);
        assert_eq!(snap.dropped, 1);
    }

    #[test]
    fn started_record_finishes_past_the_deadline() {
        let stats = CaptureStats::new();
        let mut link = TestLink::new();
        link.chunk = 3;
        link.slow = true;
        let mut writer = LinkWriter::new(link, &stats);

        let a = record(0xAA, -40);
        let b = record(0xBB, -60);
        // Deadline already passed while the link trickles 3 bytes at a time
        for r in [&a, &b] {
            embassy_futures::block_on(writer.write(r, core::future::ready(()))).unwrap();
        }
        assert_eq!(writer.link.wire.len(), 2 * RECORD_LEN);
        assert_eq!(decode(&writer.link.wire).as_slice(), &[a, b]);
        assert_eq!(stats.snapshot().dropped, 0);
    }

    #[test]
    fn link_error_drops_and_counts() {
        let stats = CaptureStats::new();
        let mut link = TestLink::new();
        link.fail_at = Some(0);
        let mut writer = LinkWriter::new(link, &stats);
        assert_eq!(
            embassy_futures::block_on(writer.write(&record(1, -1), core::future::pending())),
            Err(EmitError::Dropped(SinkError::Closed))
        );
        assert_eq!(stats.snapshot().dropped, 1);
    }

    #[test]
    fn record_lost_on_link_is_not_counted_emitted() {
        let queue = RecordQueue::new();
        let stats = CaptureStats::new();
        let mut capture = Transport::new(QueueSink::new(&queue), &stats);
        capture.emit(&record(1, -10)).unwrap();
        capture.emit(&record(2, -20)).unwrap();

        let mut link = TestLink::new();
        link.busy = true;
        let mut writer = LinkWriter::new(link, &stats);
        let first = queue.try_receive().unwrap();
        assert!(embassy_futures::block_on(writer.write(&first, core::future::ready(()))).is_err());

        writer.link.busy = false;
        let second = queue.try_receive().unwrap();
        embassy_futures::block_on(writer.write(&second, core::future::ready(()))).unwrap();

        let snap = stats.snapshot();
        assert_eq!((snap.accepted, snap.emitted, snap.dropped), (2, 1, 1));
    }
}
