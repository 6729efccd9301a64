/// Hardware abstraction for supported boards.
///
/// Each board module defines the record link pinout and identity,
/// selected at compile time via feature flags. The log console always
/// stays on the default UART0 / USB serial.

#[cfg(feature = "board-devkitc")]
mod hw {
    /// UART1 TX, the record link (one direction, sensor → consumer)
    pub const RECORD_TX_PIN: u8 = 17;
    pub const BOARD_NAME: &str = "esp32_devkitc";
}

#[cfg(feature = "board-xiao")]
mod hw {
    pub const RECORD_TX_PIN: u8 = 43; // D6
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(not(any(feature = "board-devkitc", feature = "board-xiao")))]
mod hw {
    pub const RECORD_TX_PIN: u8 = 17;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
