//! Tracer library — passive WiFi presence sensor core.
//!
//! Captures every 802.11 frame the radio hears in promiscuous mode, pulls
//! the transmitter and filtering addresses plus RSSI out of the fixed
//! header, and streams them as 8-byte records over a serial link to an
//! external consumer, while sweeping the radio across channels 1..=13.
//!
//! This crate holds the whole capture/encode/sweep pipeline with no
//! platform dependencies, testable on any host with `cargo test`. The
//! firmware binaries (bare-metal Embassy in `src/main.rs`, ESP-IDF std in
//! `firmware-std/`) only bring up the radio and UART and wire them in.
//!
//! Pipeline, leaf first:
//! - `record`: observation → 8-byte wire record, plus a stride decoder
//! - `frame`: fixed-offset header extraction with length check
//! - `transport`: all-or-nothing record sinks, the record queue and the
//!   link writer
//! - `channel`: round-robin channel sweep
//! - `capture`: the receive callback body tying the above together
//! - `status`, `config`, `board`: diagnostics and compile-time settings

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod capture;
pub mod channel;
pub mod config;
pub mod frame;
pub mod record;
pub mod status;
pub mod transport;
