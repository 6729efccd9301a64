//! Tracer — passive WiFi presence sensor (bare-metal Embassy firmware)
//!
//! Sniffs every 802.11 frame in promiscuous mode and streams transmitter
//! and filtering addresses with RSSI as 8-byte records over UART1, while
//! a hop task sweeps channels 1..=13.
//!
//! Aggregation, storage and display happen on the consumer side of the
//! serial link.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{self, UartTx};
use esp_hal::Async;

use tracer::board;
use tracer::capture::CaptureService;
use tracer::channel::{ChannelControl, ChannelScheduler};
use tracer::config::SnifferConfig;
use tracer::frame::RxMeta;
use tracer::status::{self, CaptureStats, ConsoleMessage, MAX_REPORT_LEN, VERSION};
use tracer::transport::{LinkWriter, QueueSink, RecordLink, RecordQueue};

const CONFIG: SnifferConfig = SnifferConfig::new();

// ── Static shared state ──────────────────────────────────────────────

/// Records from the sniffer callback waiting for the UART writer
static RECORD_QUEUE: RecordQueue = RecordQueue::new();

/// Capture counters shared by the callback, writer, hop and status tasks
static STATS: CaptureStats = CaptureStats::new();

// ── WiFi sniffer ─────────────────────────────────────────────────────

/// WiFi sniffer callback — called from ISR context by the esp-radio sniffer.
///
/// Encodes the frame's two observations and queues them with `try_send`;
/// a full queue drops records rather than stall the driver.
fn wifi_sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    let meta = RxMeta {
        rssi: pkt.rx_cntl.rssi as i32,
        channel: pkt.rx_cntl.channel as u8,
    };
    CaptureService::new(QueueSink::new(&RECORD_QUEUE), &STATS).on_frame(pkt.data, meta);
}

// FFI binding for WiFi channel control.
// The symbol is linked via esp-radio's WiFi driver.
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
}

/// Retunes the radio through the WiFi driver; errors are raw `esp_err_t`.
struct EspRadioChannel;

impl ChannelControl for EspRadioChannel {
    type Error = i32;

    fn set_channel(&mut self, channel: u8) -> Result<(), i32> {
        // Second channel 0 = WIFI_SECOND_CHAN_NONE
        let code = unsafe { esp_wifi_set_channel(channel, 0) };
        if code == 0 {
            Ok(())
        } else {
            Err(code)
        }
    }
}

/// WiFi channel hop task — tunes channel 1, then advances one channel
/// per dwell period, forever.
#[embassy_executor::task]
async fn channel_hop_task(mut scheduler: ChannelScheduler) {
    let mut radio = EspRadioChannel;
    scheduler.start(&mut radio, &STATS);
    loop {
        Timer::after(Duration::from_millis(CONFIG.dwell_ms)).await;
        scheduler.tick(&mut radio, &STATS);
    }
}

// ── Record link ──────────────────────────────────────────────────────

/// UART1 TX as the record link.
struct UartLink(UartTx<'static, Async>);

impl RecordLink for UartLink {
    type Error = uart::TxError;

    async fn drained(&mut self) -> Result<(), uart::TxError> {
        self.0.flush_async().await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, uart::TxError> {
        self.0.write_async(bytes).await
    }
}

/// UART writer task — drains the record queue onto the serial link.
///
/// A record waits at most `write_timeout_ms` for the link to drain and is
/// dropped if it does not. Once its first byte is out it is always
/// finished, so the link stays on the 8-byte stride.
#[embassy_executor::task]
async fn record_writer_task(tx: UartTx<'static, Async>) {
    log::info!("Record writer task started");

    let timeout = Duration::from_millis(CONFIG.write_timeout_ms);
    let mut writer = LinkWriter::new(UartLink(tx), &STATS);

    loop {
        let record = RECORD_QUEUE.receive().await;
        if let Err(e) = writer.write(&record, Timer::after(timeout)).await {
            log::warn!("Record link: {}", e);
        }
    }
}

/// Periodic status reporting task (log console only)
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(CONFIG.status_interval_secs)).await;

        let snapshot = STATS.snapshot();
        let msg = ConsoleMessage::Status {
            stats: &snapshot,
            uptime: Instant::now().as_secs() as u32,
            heap_free: esp_alloc::HEAP.free() as u32,
            board: board::BOARD_NAME,
            version: VERSION,
        };

        let mut buf = [0u8; MAX_REPORT_LEN];
        if let Some(len) = status::serialize_message(&msg, &mut buf) {
            if let Ok(s) = core::str::from_utf8(&buf[..len]) {
                log::info!("{}", s);
            }
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the WiFi driver. ESP32 is tighter on DRAM.
    #[cfg(feature = "esp32")]
    {
        esp_alloc::heap_allocator!(size: 64 * 1024);
    }
    #[cfg(not(feature = "esp32"))]
    {
        esp_alloc::heap_allocator!(size: 96 * 1024);
    }

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("Tracer v{} starting on {}", VERSION, board::BOARD_NAME);

    CONFIG.validate().expect("invalid sniffer config");
    let scheduler = ChannelScheduler::from_config(&CONFIG).expect("invalid channel range");

    log::info!(
        "Sweeping channels 1..={} with {}ms dwell ({}ms per sweep)",
        CONFIG.max_channel,
        CONFIG.dwell_ms,
        CONFIG.sweep_period_ms(),
    );

    // ── Record link (UART1, TX only) ─────────────────────────────────

    #[cfg(feature = "board-xiao")]
    let tx_pin = peripherals.GPIO43;
    #[cfg(not(feature = "board-xiao"))]
    let tx_pin = peripherals.GPIO17;

    let uart_config = uart::Config::default().with_baudrate(CONFIG.uart_baud);
    let tx = UartTx::new(peripherals.UART1, uart_config)
        .expect("Record UART init failed")
        .with_tx(tx_pin)
        .into_async();

    spawner.spawn(record_writer_task(tx)).unwrap();
    spawner.spawn(status_task()).unwrap();

    log::info!(
        "Record link on UART1 TX GPIO{} at {} baud",
        board::RECORD_TX_PIN,
        CONFIG.uart_baud
    );

    // ── WiFi sniffer initialization ──────────────────────────────────

    let (_wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    let mut sniffer = wifi_interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);
    sniffer
        .set_promiscuous_mode(true)
        .expect("Promiscuous mode failed");

    spawner.spawn(channel_hop_task(scheduler)).unwrap();

    log::info!("WiFi sniffer initialized in promiscuous mode");

    // The controller and sniffer must outlive capture; park here with them.
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
