//! # Hardware Abstraction Layer for the RFM69
//!
//! The driver talks to the chip through the narrow [`Hal`] trait: whole SPI
//! transactions with chip select held for their duration, the reset pin, and a
//! rising-edge interrupt source that pushes [`InterruptEvent`]s into a channel.
//!
//! Platform implementations:
//! - [`raspberry_pi::RaspberryPiHal`] (feature `raspberry-pi`), built on rppal
//! - [`mock::MockHal`], a register-level chip simulation for tests

use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during HAL operations
#[derive(Debug, Error)]
pub enum HalError {
    #[error("SPI communication error: {0}")]
    Spi(String),

    #[error("GPIO operation error: {0}")]
    Gpio(String),

    #[error("Interrupt setup error: {0}")]
    Interrupt(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A rising edge seen on the DIO0 interrupt line
#[derive(Debug, Clone, Copy)]
pub struct InterruptEvent {
    /// When the platform callback observed the edge
    pub at: Instant,
}

impl InterruptEvent {
    pub fn now() -> Self {
        Self { at: Instant::now() }
    }
}

/// Channel end handed to the interrupt source
pub type InterruptSender = mpsc::Sender<InterruptEvent>;

/// Hardware Abstraction Layer trait for RFM69 control
pub trait Hal: Send {
    /// Clock `tx` out while chip select is low and return the bytes clocked in.
    ///
    /// The returned buffer has the same length as `tx`.
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HalError>;

    /// Drive the reset pin
    fn set_reset(&mut self, high: bool) -> Result<(), HalError>;

    /// Whether a reset pin is wired up
    fn has_reset_pin(&self) -> bool;

    /// Start delivering rising edges of the interrupt line into `notify`.
    ///
    /// Implementations must not block in the callback; a full channel drops
    /// the event.
    fn enable_interrupt(&mut self, notify: InterruptSender) -> Result<(), HalError>;

    /// Stop delivering interrupt events
    fn disable_interrupt(&mut self) -> Result<(), HalError>;

    /// Release pins and bus handles
    fn release(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

pub mod mock;

// Platform implementations
#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi;

pub use mock::MockHal;

#[cfg(feature = "raspberry-pi")]
pub use raspberry_pi::{RaspberryPiHal, RaspberryPiHalBuilder};
