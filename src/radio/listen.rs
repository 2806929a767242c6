//! # Listen Mode Timing and Wake-up Bursts
//!
//! In listen mode a receiver alternates a short RX window with a long idle
//! window. The chip encodes each window as `coefficient × resolution`, with an
//! 8-bit coefficient and one of three fixed resolutions. A sender reaches such
//! a node by repeating its frame for a full cycle, each copy carrying the time
//! left in the burst.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::RadioError;
use crate::radio::chip::Chip;
use crate::radio::frame::encode_burst_frame;
use crate::radio::hal::Hal;
use crate::radio::mode::Mode;
use crate::radio::registers::*;

/// Time unit of a listen window coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenResolution {
    Us64,
    Us4100,
    Us262000,
}

impl ListenResolution {
    /// Search order, finest first
    pub const ALL: [ListenResolution; 3] = [
        ListenResolution::Us64,
        ListenResolution::Us4100,
        ListenResolution::Us262000,
    ];

    pub fn micros(self) -> u32 {
        match self {
            ListenResolution::Us64 => 64,
            ListenResolution::Us4100 => 4_100,
            ListenResolution::Us262000 => 262_000,
        }
    }
}

/// Coefficient closest to `duration_us` at `resolution`.
///
/// The next higher coefficient wins only when its error is strictly smaller.
pub fn coefficient_for(resolution: ListenResolution, duration_us: u32) -> u64 {
    let unit = u64::from(resolution.micros());
    let duration = u64::from(duration_us);
    let lower = duration / unit;
    let lower_error = duration - lower * unit;
    let upper_error = (lower + 1) * unit - duration;
    if upper_error < lower_error {
        lower + 1
    } else {
        lower
    }
}

/// First resolution, finest first, whose best coefficient fits in a byte.
///
/// A duration that rounds to a zero coefficient at the finest resolution has
/// no usable encoding either.
pub fn choose_resolution(duration_us: u32) -> Result<(ListenResolution, u8), RadioError> {
    for resolution in ListenResolution::ALL {
        let coefficient = coefficient_for(resolution, duration_us);
        if coefficient <= 255 {
            if coefficient == 0 {
                break;
            }
            return Ok((resolution, coefficient as u8));
        }
    }
    Err(RadioError::UnrepresentableDuration {
        micros: duration_us,
    })
}

/// Encoded RX and idle windows of a listen cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenTiming {
    pub rx_resolution: ListenResolution,
    pub rx_coefficient: u8,
    pub idle_resolution: ListenResolution,
    pub idle_coefficient: u8,
}

impl ListenTiming {
    pub fn new(rx_us: u32, idle_us: u32) -> Result<Self, RadioError> {
        let (rx_resolution, rx_coefficient) = choose_resolution(rx_us)?;
        let (idle_resolution, idle_coefficient) = choose_resolution(idle_us)?;
        Ok(Self {
            rx_resolution,
            rx_coefficient,
            idle_resolution,
            idle_coefficient,
        })
    }

    /// RX window actually realized by the chip
    pub fn rx_duration_us(&self) -> u32 {
        self.rx_resolution.micros() * u32::from(self.rx_coefficient)
    }

    /// Idle window actually realized by the chip
    pub fn idle_duration_us(&self) -> u32 {
        self.idle_resolution.micros() * u32::from(self.idle_coefficient)
    }

    pub fn cycle_duration_us(&self) -> u32 {
        self.rx_duration_us() + self.idle_duration_us()
    }
}

impl Default for ListenTiming {
    fn default() -> Self {
        // 256 us RX, 1 s idle
        Self {
            rx_resolution: ListenResolution::Us64,
            rx_coefficient: 4,
            idle_resolution: ListenResolution::Us4100,
            idle_coefficient: 244,
        }
    }
}

impl<H: Hal> Chip<H> {
    /// Switch the packet engine to listen mode burst settings.
    async fn prepare_burst(&mut self) -> Result<(), RadioError> {
        self.set_mode(Mode::Standby).await?;
        self.write_reg(
            REG_PACKETCONFIG1,
            RF_PACKET1_FORMAT_VARIABLE
                | RF_PACKET1_DCFREE_WHITENING
                | RF_PACKET1_CRC_ON
                | RF_PACKET1_CRCAUTOCLEAR_ON,
        )?;
        self.write_reg(
            REG_PACKETCONFIG2,
            RF_PACKET2_RXRESTARTDELAY_NONE | RF_PACKET2_AUTORXRESTART_ON | RF_PACKET2_AES_OFF,
        )?;
        self.write_reg(REG_SYNCVALUE1, LISTEN_BURST_SYNC)?;
        self.write_reg(REG_SYNCVALUE2, LISTEN_BURST_SYNC)?;
        if self.listen_high_speed {
            self.write_reg(REG_BITRATEMSB, RF_BITRATEMSB_200000)?;
            self.write_reg(REG_BITRATELSB, RF_BITRATELSB_200000)?;
            self.write_reg(REG_FDEVMSB, RF_FDEVMSB_100000)?;
            self.write_reg(REG_FDEVLSB, RF_FDEVLSB_100000)?;
            self.write_reg(REG_RXBW, RF_RXBW_DCCFREQ_000 | RF_RXBW_MANT_20 | RF_RXBW_EXP_0)?;
        }
        // Bursts go out one frequency step up; LSB must be written to latch
        let msb = self.read_reg(REG_FRFMSB)?;
        self.write_reg(REG_FRFMSB, msb.wrapping_add(1))?;
        let lsb = self.read_reg(REG_FRFLSB)?;
        self.write_reg(REG_FRFLSB, lsb)?;
        Ok(())
    }

    /// Repeat a frame for one full listen cycle, then restore normal framing.
    ///
    /// Returns the number of frames transmitted.
    pub(crate) async fn send_listen_burst(
        &mut self,
        target: u8,
        payload: &[u8],
    ) -> Result<u64, RadioError> {
        self.prepare_burst().await?;

        let cycle_ms = cycle_duration(&self.listen).as_millis() as u64;
        let drain_timeout = self.timing.packet_sent_timeout();
        info!(
            "Listen mode burst to node {} for {} ms",
            target, cycle_ms
        );

        self.set_mode(Mode::Transmit).await?;
        let start = Instant::now();
        let mut remaining = cycle_ms;
        let mut frames = 0u64;
        let result = loop {
            if remaining == 0 {
                break Ok(());
            }
            let countdown = remaining.min(u64::from(u16::MAX)) as u16;
            let burst = encode_burst_frame(target, self.address, countdown, payload);
            if let Err(e) = self.hal.transfer(&burst) {
                break Err(e.into());
            }
            frames += 1;
            if let Err(e) = self
                .poll_register(
                    REG_IRQFLAGS2,
                    RF_IRQFLAGS2_FIFONOTEMPTY,
                    false,
                    drain_timeout,
                    "burst FIFO drain",
                )
                .await
            {
                break Err(e);
            }
            let elapsed = start.elapsed().as_millis() as u64;
            remaining = cycle_ms.saturating_sub(elapsed);
        };
        debug!("Listen mode burst sent {} frames", frames);

        self.set_mode(Mode::Standby).await?;
        self.reinitialize().await?;
        result.map(|_| frames)
    }

    /// Full re-initialization after a burst, keeping key and power level.
    async fn reinitialize(&mut self) -> Result<(), RadioError> {
        self.initialize().await?;
        let key = self.encryption_key.clone();
        self.encrypt(key).await?;
        self.apply_power_level()?;
        if self.listen_high_speed {
            self.write_register_bits(REG_LNA, RF_LNA_GAINSELECT_MASK, RF_LNA_GAINSELECT_AUTO)?;
        }
        Ok(())
    }
}

/// Convert a realized listen cycle to a wall clock duration
pub fn cycle_duration(timing: &ListenTiming) -> Duration {
    Duration::from_micros(u64::from(timing.cycle_duration_us()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_fit_at_medium_resolution() {
        assert_eq!(
            choose_resolution(20_500).unwrap(),
            (ListenResolution::Us4100, 5)
        );
    }

    #[test]
    fn test_fine_resolution_preferred() {
        assert_eq!(choose_resolution(256).unwrap(), (ListenResolution::Us64, 4));
        assert_eq!(
            choose_resolution(64 * 255).unwrap(),
            (ListenResolution::Us64, 255)
        );
    }

    #[test]
    fn test_rounds_up_only_when_strictly_closer() {
        // 96 sits exactly between 1 x 64 and 2 x 64
        assert_eq!(coefficient_for(ListenResolution::Us64, 96), 1);
        assert_eq!(coefficient_for(ListenResolution::Us64, 97), 2);
        assert_eq!(coefficient_for(ListenResolution::Us64, 95), 1);
    }

    #[test]
    fn test_default_idle_window() {
        assert_eq!(
            choose_resolution(DEFAULT_LISTEN_IDLE_US).unwrap(),
            (ListenResolution::Us4100, 244)
        );
        let timing = ListenTiming::new(DEFAULT_LISTEN_RX_US, DEFAULT_LISTEN_IDLE_US).unwrap();
        assert_eq!(timing, ListenTiming::default());
        assert_eq!(timing.cycle_duration_us(), 256 + 1_000_400);
    }

    #[test]
    fn test_unrepresentable_durations() {
        assert!(matches!(
            choose_resolution(262_000 * 256),
            Err(RadioError::UnrepresentableDuration { micros }) if micros == 262_000 * 256
        ));
        assert!(matches!(
            choose_resolution(u32::MAX),
            Err(RadioError::UnrepresentableDuration { .. })
        ));
        assert!(matches!(
            choose_resolution(10),
            Err(RadioError::UnrepresentableDuration { .. })
        ));
        assert!(ListenTiming::new(256, 262_000 * 300).is_err());
    }

    #[test]
    fn test_cycle_duration() {
        let timing = ListenTiming::new(256, 20_500).unwrap();
        assert_eq!(cycle_duration(&timing), Duration::from_micros(20_756));
    }

    proptest! {
        #[test]
        fn prop_chosen_coefficient_is_nearest(duration in 32u32..66_000_000) {
            if let Ok((resolution, coefficient)) = choose_resolution(duration) {
                let unit = i64::from(resolution.micros());
                let chosen = (i64::from(duration) - i64::from(coefficient) * unit).abs();
                for candidate in 0..=255i64 {
                    let error = (i64::from(duration) - candidate * unit).abs();
                    prop_assert!(chosen <= error);
                }
            }
        }

        #[test]
        fn prop_finer_resolutions_overflow(duration in 32u32..66_000_000) {
            if let Ok((resolution, _)) = choose_resolution(duration) {
                for finer in ListenResolution::ALL.iter().take_while(|r| **r != resolution) {
                    prop_assert!(coefficient_for(*finer, duration) > 255);
                }
            }
        }
    }
}
