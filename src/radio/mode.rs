//! Operating mode state machine.
//!
//! The driver tracks the mode it last commanded and skips redundant writes.
//! The chip only needs time to settle when it leaves sleep.

use std::fmt;

use log::debug;

use crate::error::RadioError;
use crate::radio::chip::Chip;
use crate::radio::hal::Hal;
use crate::radio::registers::*;

/// RFM69 operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Sleep,
    Standby,
    Synthesizer,
    Receive,
    Transmit,
}

impl Mode {
    /// Mode field of REG_OPMODE
    pub fn opmode_bits(self) -> u8 {
        match self {
            Mode::Sleep => RF_OPMODE_SLEEP,
            Mode::Standby => RF_OPMODE_STANDBY,
            Mode::Synthesizer => RF_OPMODE_SYNTHESIZER,
            Mode::Receive => RF_OPMODE_RECEIVER,
            Mode::Transmit => RF_OPMODE_TRANSMITTER,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Sleep => "sleep",
            Mode::Standby => "standby",
            Mode::Synthesizer => "synthesizer",
            Mode::Receive => "rx",
            Mode::Transmit => "tx",
        };
        f.write_str(name)
    }
}

impl<H: Hal> Chip<H> {
    /// Set radio operating mode
    pub(crate) async fn set_mode(&mut self, mode: Mode) -> Result<(), RadioError> {
        if self.mode == Some(mode) {
            return Ok(());
        }

        self.write_register_bits(REG_OPMODE, RF_OPMODE_MODE_MASK, mode.opmode_bits())?;

        // PA boost registers only while transmitting on high power modules
        if self.high_power {
            match mode {
                Mode::Transmit => self.set_high_power_regs(true)?,
                Mode::Receive => self.set_high_power_regs(false)?,
                _ => {}
            }
        }

        // Wait for mode ready if transitioning from sleep
        if self.mode == Some(Mode::Sleep) {
            let limit = self.timing.mode_ready_timeout();
            if let Err(e) = self
                .poll_register(
                    REG_IRQFLAGS1,
                    RF_IRQFLAGS1_MODEREADY,
                    true,
                    limit,
                    "mode ready after sleep",
                )
                .await
            {
                // OPMODE is already rewritten, the chip is somewhere in between
                self.mode = None;
                return Err(e);
            }
        }

        self.mode = Some(mode);
        debug!("RFM69 mode set to: {}", mode);
        Ok(())
    }

    fn set_high_power_regs(&mut self, boost: bool) -> Result<(), RadioError> {
        if boost {
            self.write_reg(REG_TESTPA1, RF_TESTPA1_BOOST)?;
            self.write_reg(REG_TESTPA2, RF_TESTPA2_BOOST)?;
        } else {
            self.write_reg(REG_TESTPA1, RF_TESTPA1_NORMAL)?;
            self.write_reg(REG_TESTPA2, RF_TESTPA2_NORMAL)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::config::{FrequencyBand, RadioConfig, TimingConfig};
    use crate::radio::hal::MockHal;

    #[test]
    fn test_opmode_bits_fit_mask() {
        for mode in [
            Mode::Sleep,
            Mode::Standby,
            Mode::Synthesizer,
            Mode::Receive,
            Mode::Transmit,
        ] {
            assert_eq!(mode.opmode_bits() & !RF_OPMODE_MODE_MASK, 0);
        }
        assert_eq!(Mode::Receive.to_string(), "rx");
    }

    #[tokio::test]
    async fn test_wake_timeout_forgets_mode() {
        let hal = MockHal::new();
        let timing = TimingConfig {
            mode_ready_timeout_ms: 20,
            ..TimingConfig::default()
        };
        let config = RadioConfig::new(FrequencyBand::Mhz433, 2).with_timing(timing);
        let mut chip = Chip::new(hal.clone(), &config).unwrap();
        chip.initialize().await.unwrap();
        chip.set_mode(Mode::Sleep).await.unwrap();

        hal.set_mode_ready(false);
        let result = chip.set_mode(Mode::Standby).await;
        assert!(matches!(
            result,
            Err(RadioError::Timeout {
                operation: "mode ready after sleep",
                ..
            })
        ));
        assert_eq!(chip.mode, None);
        assert_eq!(hal.mode_bits(), RF_OPMODE_STANDBY);

        // Unknown mode means the next request writes OPMODE again
        hal.set_mode_ready(true);
        let writes = hal.write_count(REG_OPMODE);
        chip.set_mode(Mode::Standby).await.unwrap();
        assert_eq!(hal.write_count(REG_OPMODE), writes + 1);
        assert_eq!(chip.mode, Some(Mode::Standby));
    }
}
