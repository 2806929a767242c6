//! # Raspberry Pi HAL Implementation
//!
//! Hardware abstraction layer for an RFM69 module wired to the 40-pin header of
//! a Raspberry Pi, built on the rppal crate.
//!
//! ### Default wiring (BCM numbering)
//! ```text
//! Pi Pin │ BCM GPIO │ RFM69 Pin │ Function
//! ───────┼──────────┼───────────┼─────────────
//! 19     │ GPIO 10  │ MOSI      │ SPI data out
//! 21     │ GPIO 9   │ MISO      │ SPI data in
//! 23     │ GPIO 11  │ SCK       │ SPI clock
//! 24     │ GPIO 8   │ NSS       │ Chip select (CE0)
//! 18     │ GPIO 24  │ DIO0      │ Interrupt (input)
//! 29     │ GPIO 5   │ RESET     │ Reset (output, active high)
//! ```
//!
//! A dedicated chip-select GPIO can be configured instead of the hardware CE
//! line; it is then driven low for each transaction and high afterwards.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::radio::config::PinConfig;
use crate::radio::hal::{Hal, HalError, InterruptEvent, InterruptSender};
use crate::radio::registers::SPI_SPEED;

/// Raspberry Pi HAL implementation for the RFM69
pub struct RaspberryPiHal {
    spi: Spi,
    interrupt_pin: InputPin,
    reset_pin: Option<OutputPin>,
    select_pin: Option<OutputPin>,
    bus_info: String,
}

impl RaspberryPiHal {
    /// Open the SPI device and claim the GPIO pins.
    ///
    /// # Arguments
    ///
    /// * `spi_bus` - SPI bus number (0 for primary SPI, 1 for auxiliary SPI)
    /// * `slave_select` - hardware chip enable line (0 or 1)
    /// * `spi_speed_hz` - SPI clock
    /// * `pins` - interrupt, reset and optional chip-select GPIOs
    pub fn new(
        spi_bus: u8,
        slave_select: u8,
        spi_speed_hz: u32,
        pins: &PinConfig,
    ) -> Result<Self, HalError> {
        let bus = match spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid SPI bus {}, only 0 and 1 are supported",
                    spi_bus
                )))
            }
        };
        let ss = match slave_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            _ => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid slave select {}, only 0 and 1 are supported",
                    slave_select
                )))
            }
        };

        let spi = Spi::new(bus, ss, spi_speed_hz, Mode::Mode0)
            .map_err(|e| HalError::Spi(format!("Failed to initialize SPI: {}", e)))?;
        let bus_info = format!("SPI{}.{} @ {} Hz", spi_bus, slave_select, spi_speed_hz);

        let gpio =
            Gpio::new().map_err(|e| HalError::Gpio(format!("Failed to initialize GPIO: {}", e)))?;

        let interrupt_pin = gpio
            .get(pins.interrupt)
            .map_err(|e| {
                HalError::Gpio(format!("Failed to get interrupt pin {}: {}", pins.interrupt, e))
            })?
            .into_input();

        let reset_pin = match pins.reset {
            Some(num) => {
                let mut pin = gpio
                    .get(num)
                    .map_err(|e| HalError::Gpio(format!("Failed to get reset pin {}: {}", num, e)))?
                    .into_output();
                // RFM69 reset is active high, start low (not in reset)
                pin.set_low();
                Some(pin)
            }
            None => None,
        };

        let select_pin = match pins.select {
            Some(num) => {
                let mut pin = gpio
                    .get(num)
                    .map_err(|e| {
                        HalError::Gpio(format!("Failed to get select pin {}: {}", num, e))
                    })?
                    .into_output();
                pin.set_high();
                Some(pin)
            }
            None => None,
        };

        log::info!("Raspberry Pi HAL initialized:");
        log::info!("  SPI: {}", bus_info);
        log::info!("  DIO0: GPIO {}", pins.interrupt);
        if let Some(reset) = pins.reset {
            log::info!("  RESET: GPIO {}", reset);
        } else {
            log::warn!("  RESET: not connected, skipping hardware reset");
        }
        if let Some(select) = pins.select {
            log::info!("  NSS: GPIO {}", select);
        }

        Ok(Self {
            spi,
            interrupt_pin,
            reset_pin,
            select_pin,
            bus_info,
        })
    }

    /// Human readable description of the bus in use
    pub fn bus_info(&self) -> &str {
        &self.bus_info
    }
}

impl Hal for RaspberryPiHal {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HalError> {
        let mut rx = vec![0u8; tx.len()];

        if let Some(ref mut select) = self.select_pin {
            select.set_low();
        }
        let result = self.spi.transfer(&mut rx, tx);
        if let Some(ref mut select) = self.select_pin {
            select.set_high();
        }

        match result {
            Ok(_) => {
                log::trace!(
                    "SPI transfer 0x{:02X}, {} bytes",
                    tx.first().copied().unwrap_or_default(),
                    tx.len()
                );
                Ok(rx)
            }
            Err(e) => {
                log::error!("SPI transfer failed: {}", e);
                Err(HalError::Spi(e.to_string()))
            }
        }
    }

    fn set_reset(&mut self, high: bool) -> Result<(), HalError> {
        match self.reset_pin {
            Some(ref mut pin) => {
                if high {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
                Ok(())
            }
            None => Err(HalError::Gpio("No reset pin configured".to_string())),
        }
    }

    fn has_reset_pin(&self) -> bool {
        self.reset_pin.is_some()
    }

    fn enable_interrupt(&mut self, notify: InterruptSender) -> Result<(), HalError> {
        // Replace any earlier registration
        let _ = self.interrupt_pin.clear_async_interrupt();

        self.interrupt_pin
            .set_async_interrupt(Trigger::RisingEdge, move |level: Level| {
                if level == Level::High && notify.try_send(InterruptEvent::now()).is_err() {
                    log::trace!("Interrupt event dropped, handler already pending");
                }
            })
            .map_err(|e| HalError::Interrupt(format!("Failed to set interrupt: {}", e)))
    }

    fn disable_interrupt(&mut self) -> Result<(), HalError> {
        self.interrupt_pin
            .clear_async_interrupt()
            .map_err(|e| HalError::Interrupt(format!("Failed to clear interrupt: {}", e)))
    }

    fn release(&mut self) -> Result<(), HalError> {
        self.disable_interrupt()?;
        if let Some(ref mut select) = self.select_pin {
            select.set_high();
        }
        if let Some(ref mut reset) = self.reset_pin {
            reset.set_low();
        }
        log::info!("Raspberry Pi HAL released ({})", self.bus_info);
        Ok(())
    }
}

/// Builder for Raspberry Pi HAL configuration
///
/// ```rust,no_run
/// use rfm69_radio::radio::hal::RaspberryPiHalBuilder;
///
/// let hal = RaspberryPiHalBuilder::new()
///     .spi_bus(0)
///     .interrupt_pin(24)
///     .reset_pin(5)
///     .build()?;
/// # Ok::<(), rfm69_radio::radio::hal::HalError>(())
/// ```
pub struct RaspberryPiHalBuilder {
    spi_bus: u8,
    slave_select: u8,
    spi_speed: u32,
    pins: PinConfig,
}

impl Default for RaspberryPiHalBuilder {
    fn default() -> Self {
        Self {
            spi_bus: 0,
            slave_select: 0,
            spi_speed: SPI_SPEED,
            pins: PinConfig::default(),
        }
    }
}

impl RaspberryPiHalBuilder {
    /// Create a new HAL builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SPI bus number (0 or 1)
    pub fn spi_bus(mut self, bus: u8) -> Self {
        self.spi_bus = bus;
        self
    }

    /// Set the hardware chip enable line (0 or 1)
    pub fn slave_select(mut self, ss: u8) -> Self {
        self.slave_select = ss;
        self
    }

    /// Set the SPI clock speed in Hz (max 10 MHz for the RFM69)
    pub fn spi_speed(mut self, speed: u32) -> Self {
        self.spi_speed = speed.min(10_000_000);
        self
    }

    /// Set the DIO0 interrupt GPIO number
    pub fn interrupt_pin(mut self, pin: u8) -> Self {
        self.pins.interrupt = pin;
        self
    }

    /// Set the RESET GPIO number
    pub fn reset_pin(mut self, pin: u8) -> Self {
        self.pins.reset = Some(pin);
        self
    }

    /// Disable RESET pin control
    pub fn no_reset(mut self) -> Self {
        self.pins.reset = None;
        self
    }

    /// Drive chip select from a GPIO instead of the hardware CE line
    pub fn select_pin(mut self, pin: u8) -> Self {
        self.pins.select = Some(pin);
        self
    }

    /// Build the HAL instance with current configuration
    pub fn build(self) -> Result<RaspberryPiHal, HalError> {
        if self.spi_speed == 0 {
            return Err(HalError::InvalidConfig("SPI speed must be non-zero".to_string()));
        }
        RaspberryPiHal::new(self.spi_bus, self.slave_select, self.spi_speed, &self.pins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_builder() {
        let builder = RaspberryPiHalBuilder::new()
            .spi_bus(1)
            .spi_speed(20_000_000)
            .interrupt_pin(25)
            .select_pin(7)
            .no_reset();

        assert_eq!(builder.spi_bus, 1);
        assert_eq!(builder.spi_speed, 10_000_000);
        assert_eq!(builder.pins.interrupt, 25);
        assert_eq!(builder.pins.select, Some(7));
        assert_eq!(builder.pins.reset, None);
    }
}
