//! # rfm69-radio - An Async Driver for the HopeRF RFM69 Packet Radio
//!
//! The rfm69-radio crate drives an RFM69 (W/HW/CW/HCW) sub-GHz transceiver wired
//! to a Linux host over SPI, with a GPIO for the DIO0 interrupt and optionally
//! one for reset.
//!
//! ## Features
//!
//! - 315, 433, 868 and 915 MHz bands, FSK at 55.5 kbps
//! - Addressed frames with optional acknowledgement and retries
//! - Broadcast, promiscuous reception and automatic ack replies
//! - Carrier sense before every transmission
//! - Hardware AES-128
//! - Listen mode wake-up bursts for duty-cycled receivers
//! - RSSI, die temperature, RC calibration and register dumps
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! rfm69-radio = { version = "0.1.0", features = ["raspberry-pi"] }
//! ```
//!
//! ```rust
//! use rfm69_radio::{
//!     init_logger, FrequencyBand, MockHal, Radio, RadioConfig, RadioError, ReceivedPacket,
//!     SendOptions, SendOutcome,
//! };
//! ```

pub mod error;
pub mod logging;
pub mod radio;

pub use crate::error::RadioError;
pub use crate::logging::{init_logger, init_logger_with_level, log_info};

pub use radio::hal::{Hal, HalError, MockHal};
#[cfg(feature = "raspberry-pi")]
pub use radio::hal::{RaspberryPiHal, RaspberryPiHalBuilder};
pub use radio::{
    ControlFlags, EncryptionKey, FrameKind, FrequencyBand, ListenTiming, Mode, PinConfig, Radio,
    RadioConfig, RadioStats, ReceivedPacket, SendOptions, SendOutcome, TimingConfig,
};
