//! Tracer — ESP-IDF std firmware
//!
//! Thread-based implementation using FreeRTOS threads and std::sync::mpsc
//! channels. Feature-equivalent to the no_std Embassy firmware but uses
//! ESP-IDF services for WiFi and the UART driver.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracer::board;
use tracer::capture::CaptureService;
use tracer::channel::{ChannelControl, ChannelScheduler};
use tracer::config::SnifferConfig;
use tracer::frame::RxMeta;
use tracer::record::Record;
use tracer::status::{self, CaptureStats, ConsoleMessage, MAX_REPORT_LEN, VERSION};
use tracer::transport::{RecordSink, SinkError, Transport, RECORD_QUEUE_DEPTH};

use esp_idf_svc::hal::delay::TickType;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartTxDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::{
    esp, esp_get_free_heap_size, esp_wifi_set_channel, esp_wifi_set_promiscuous,
    esp_wifi_set_promiscuous_rx_cb, wifi_promiscuous_pkt_t, wifi_promiscuous_pkt_type_t,
    wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, EspError, TickType_t, ESP_ERR_TIMEOUT,
};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

const CONFIG: SnifferConfig = SnifferConfig::new();

// ── Shared state ─────────────────────────────────────────────────────

static STATS: CaptureStats = CaptureStats::new();

/// Boot time — captured once in main, used for uptime calculation.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_secs() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| boot.elapsed().as_secs() as u32))
        .unwrap_or(0)
}

// ── Record queue sender (for WiFi promisc callback) ──────────────────

static RECORD_TX: Mutex<Option<SyncSender<Record>>> = Mutex::new(None);

/// Non-blocking sink over the record queue; drops when full.
struct ChannelSink<'a>(&'a SyncSender<Record>);

impl RecordSink for ChannelSink<'_> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        self.0.try_send(*record).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Closed,
        })
    }
}

// ── WiFi promiscuous callback ────────────────────────────────────────

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task context (not ISR on ESP-IDF, but still
/// must be non-blocking). Queues the frame's two records via try_send.
unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    _pkt_type: wifi_promiscuous_pkt_type_t,
) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let meta = RxMeta {
        rssi: pkt.rx_ctrl.rssi() as i32,
        channel: pkt.rx_ctrl.channel() as u8,
    };
    let sig_len = pkt.rx_ctrl.sig_len() as usize;

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };

    if let Ok(guard) = RECORD_TX.lock() {
        if let Some(ref tx) = *guard {
            CaptureService::new(ChannelSink(tx), &STATS).on_frame(payload, meta);
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    // Record boot time
    *BOOT_INSTANT.lock().unwrap() = Some(Instant::now());

    log::info!("Tracer v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    CONFIG
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid sniffer config: {}", e))?;
    let scheduler = ChannelScheduler::from_config(&CONFIG)
        .map_err(|e| anyhow::anyhow!("invalid channel range: {}", e))?;

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── Record link (UART1, TX only) ─────────────────────────────────

    #[cfg(feature = "xiao")]
    let tx_pin = peripherals.pins.gpio43;
    #[cfg(not(feature = "xiao"))]
    let tx_pin = peripherals.pins.gpio17;

    let uart_config = UartConfig::new().baudrate(Hertz(CONFIG.uart_baud));
    let uart = UartTxDriver::new(
        peripherals.uart1,
        tx_pin,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    log::info!(
        "Record link on UART1 TX GPIO{} at {} baud",
        board::RECORD_TX_PIN,
        CONFIG.uart_baud
    );

    // ── Record queue + writer thread ─────────────────────────────────

    let (record_tx, record_rx) = mpsc::sync_channel::<Record>(RECORD_QUEUE_DEPTH);
    *RECORD_TX.lock().unwrap() = Some(record_tx);

    thread::Builder::new()
        .name("recwriter".into())
        .stack_size(3072)
        .spawn(move || {
            record_writer_thread(record_rx, uart);
        })?;
    log::info!("Record writer thread spawned");

    // ── WiFi sniffer ─────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&esp_idf_svc::wifi::Configuration::Client(Default::default()))?;
    wifi.start()?;

    // Enable promiscuous mode
    unsafe {
        esp!(esp_wifi_set_promiscuous(true))?;
        esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb)))?;
    }
    log::info!("WiFi sniffer initialized in promiscuous mode");

    // ── Channel hop thread ───────────────────────────────────────────

    thread::Builder::new()
        .name("chanhop".into())
        .stack_size(2048)
        .spawn(move || {
            channel_hop_thread(scheduler);
        })?;
    log::info!(
        "Channel hop thread spawned: 1..={} with {}ms dwell",
        CONFIG.max_channel,
        CONFIG.dwell_ms
    );

    // Status reports run on the main thread, which keeps `wifi` alive.
    status_loop()
}

// ── Channel hopping ──────────────────────────────────────────────────

/// Retunes the radio through `esp_wifi_set_channel`.
struct IdfChannel;

impl ChannelControl for IdfChannel {
    type Error = EspError;

    fn set_channel(&mut self, channel: u8) -> Result<(), EspError> {
        unsafe { esp!(esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE)) }
    }
}

fn channel_hop_thread(mut scheduler: ChannelScheduler) {
    let mut radio = IdfChannel;
    scheduler.start(&mut radio, &STATS);
    loop {
        thread::sleep(Duration::from_millis(CONFIG.dwell_ms));
        scheduler.tick(&mut radio, &STATS);
    }
}

// ── Record writer thread ─────────────────────────────────────────────

/// UART1 as an all-or-nothing record sink.
///
/// Waits up to `write_timeout_ms` for the previous bytes to leave the
/// transmitter, then hands all eight bytes to the empty FIFO at once. A
/// record that cannot start in time is dropped before any of it is sent.
struct UartLink<'d> {
    uart: UartTxDriver<'d>,
    drain_timeout: TickType_t,
}

impl RecordSink for UartLink<'_> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        self.uart
            .wait_done(self.drain_timeout)
            .map_err(|e| match e.code() {
                code if code == ESP_ERR_TIMEOUT as i32 => SinkError::Timeout,
                _ => SinkError::Closed,
            })?;

        let mut bytes: &[u8] = record.as_bytes();
        while !bytes.is_empty() {
            match self.uart.write(bytes) {
                Ok(0) => return Err(SinkError::Closed),
                Ok(n) => bytes = &bytes[n..],
                Err(e) => {
                    log::error!("Record link write failed: {:?}", e);
                    return Err(SinkError::Closed);
                }
            }
        }
        Ok(())
    }
}

fn record_writer_thread(record_rx: mpsc::Receiver<Record>, uart: UartTxDriver<'static>) {
    log::info!("Record writer thread started");

    let link = UartLink {
        uart,
        drain_timeout: TickType::from(Duration::from_millis(CONFIG.write_timeout_ms)).ticks(),
    };
    let mut transport = Transport::on_link(link, &STATS);

    while let Ok(record) = record_rx.recv() {
        if let Err(e) = transport.emit(&record) {
            log::warn!("Record link: {}", e);
        }
    }
}

// ── Status reporting ─────────────────────────────────────────────────

fn status_loop() -> ! {
    loop {
        thread::sleep(Duration::from_secs(CONFIG.status_interval_secs));

        let snapshot = STATS.snapshot();
        let heap_free = unsafe { esp_get_free_heap_size() };

        let msg = ConsoleMessage::Status {
            stats: &snapshot,
            uptime: uptime_secs(),
            heap_free,
            board: board::BOARD_NAME,
            version: VERSION,
        };

        let mut buf = [0u8; MAX_REPORT_LEN];
        if let Some(len) = status::serialize_message(&msg, &mut buf) {
            if let Ok(s) = std::str::from_utf8(&buf[..len]) {
                log::info!("{}", s);
            }
        }
    }
}
