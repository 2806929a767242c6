//! # RFM69 Radio
//!
//! Layers, bottom up:
//!
//! - [`registers`]: register map and bit definitions
//! - [`hal`]: SPI, reset and interrupt access, with a Raspberry Pi backend and a mock
//! - [`config`]: bands, the power-on register table and driver configuration
//! - [`frame`]: the length/target/sender/control frame layout
//! - [`listen`]: listen mode cycle encoding and wake-up bursts
//! - [`Radio`]: the async driver

pub mod config;
pub mod frame;
pub mod hal;
pub mod listen;
pub mod registers;
pub mod stats;

mod chip;
mod driver;
mod mode;

pub use config::{EncryptionKey, FrequencyBand, PinConfig, RadioConfig, TimingConfig};
pub use driver::{Radio, SendOptions, SendOutcome};
pub use frame::{ControlFlags, FrameKind, ReceivedPacket};
pub use listen::{ListenResolution, ListenTiming};
pub use mode::Mode;
pub use stats::RadioStats;
