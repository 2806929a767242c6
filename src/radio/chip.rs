//! Register-level access to one RFM69 chip.
//!
//! [`Chip`] owns the HAL and the driver's view of the chip: the mode it last
//! commanded, its addresses, PA configuration, AES key and listen timing.
//! Every method assumes exclusive access; the driver serializes callers
//! through a single async mutex around the chip.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::time::sleep;
use zeroize::Zeroize;

use crate::error::RadioError;
use crate::radio::config::{
    power_level_code, register_table, validate_network_id, EncryptionKey, FrequencyBand,
    RadioConfig, TimingConfig,
};
use crate::radio::frame::{
    encode_frame, header_read_request, payload_read_request, ControlFlags, FrameHeader,
};
use crate::radio::hal::{Hal, HalError};
use crate::radio::listen::ListenTiming;
use crate::radio::mode::Mode;
use crate::radio::registers::*;

/// Reset line is held high, then low, for this long each
const RESET_PULSE: Duration = Duration::from_millis(300);
/// Bound for each half of the SYNCVALUE1 handshake
const SYNC_PROBE_TIMEOUT: Duration = Duration::from_millis(100);
/// Mode-ready bound during bring-up
const INIT_MODE_READY_TIMEOUT: Duration = Duration::from_secs(1);
/// Bound for RSSI, temperature and RC calibration measurements
const MEASUREMENT_TIMEOUT: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A frame read out of the FIFO that passed the address filter
#[derive(Debug, Clone)]
pub(crate) struct InboundFrame {
    pub header: FrameHeader,
    pub data: Vec<u8>,
    pub rssi: i16,
}

pub(crate) struct Chip<H: Hal> {
    pub(crate) hal: H,
    /// Last commanded mode; `None` until bring-up completes
    pub(crate) mode: Option<Mode>,
    pub(crate) address: u8,
    pub(crate) network_id: u8,
    pub(crate) band: FrequencyBand,
    pub(crate) high_power: bool,
    /// 5-bit output power field
    pub(crate) power_level: u8,
    pub(crate) encryption_key: Option<EncryptionKey>,
    pub(crate) listen: ListenTiming,
    pub(crate) listen_high_speed: bool,
    pub(crate) timing: TimingConfig,
}

impl<H: Hal> Chip<H> {
    /// Wrap a HAL without touching the bus
    pub(crate) fn new(hal: H, config: &RadioConfig) -> Result<Self, RadioError> {
        Ok(Self {
            hal,
            mode: None,
            address: config.node_id,
            network_id: validate_network_id(config.network_id)?,
            band: config.frequency_band,
            high_power: config.high_power,
            power_level: power_level_code(config.power_percent)?,
            encryption_key: None,
            listen: ListenTiming::default(),
            listen_high_speed: true,
            timing: config.timing.clone(),
        })
    }

    pub(crate) fn read_reg(&mut self, addr: u8) -> Result<u8, RadioError> {
        let rx = self.hal.transfer(&[addr & 0x7F, 0])?;
        Ok(rx.get(1).copied().unwrap_or_default())
    }

    pub(crate) fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), RadioError> {
        self.hal.transfer(&[addr | 0x80, value])?;
        Ok(())
    }

    /// Replace the bits selected by `mask` with `bits`, keeping the rest
    pub(crate) fn write_register_bits(
        &mut self,
        reg: u8,
        mask: u8,
        bits: u8,
    ) -> Result<(), RadioError> {
        let current = self.read_reg(reg)?;
        self.write_reg(reg, (current & !mask) | (bits & mask))
    }

    /// Poll `reg` until the bits in `mask` are all clear (`set == false`) or
    /// any is set (`set == true`), giving up after `limit`.
    pub(crate) async fn poll_register(
        &mut self,
        reg: u8,
        mask: u8,
        set: bool,
        limit: Duration,
        operation: &'static str,
    ) -> Result<(), RadioError> {
        let start = Instant::now();
        loop {
            let value = self.read_reg(reg)?;
            if (value & mask != 0) == set {
                return Ok(());
            }
            if start.elapsed() >= limit {
                return Err(RadioError::Timeout {
                    operation,
                    waited: start.elapsed(),
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn reset(&mut self) -> Result<(), RadioError> {
        if !self.hal.has_reset_pin() {
            debug!("No reset pin wired, skipping hardware reset");
            return Ok(());
        }
        info!("Resetting RFM69 chip");
        self.hal.set_reset(true)?;
        sleep(RESET_PULSE).await;
        self.hal.set_reset(false)?;
        sleep(RESET_PULSE).await;
        Ok(())
    }

    /// Write `pattern` to SYNCVALUE1 until it reads back
    async fn sync_probe(&mut self, pattern: u8) -> Result<(), RadioError> {
        let start = Instant::now();
        loop {
            if self.read_reg(REG_SYNCVALUE1)? == pattern {
                return Ok(());
            }
            self.write_reg(REG_SYNCVALUE1, pattern)?;
            if start.elapsed() >= SYNC_PROBE_TIMEOUT {
                return Err(RadioError::InitializationTimeout {
                    stage: "sync handshake",
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Reset the chip, prove the bus works and load the packet configuration.
    ///
    /// Leaves the chip in standby. AES and output power are applied separately.
    pub(crate) async fn initialize(&mut self) -> Result<(), RadioError> {
        info!(
            "Initializing RFM69 for {} MHz, network {}, node {}",
            self.band, self.network_id, self.address
        );
        self.mode = None;
        self.reset().await?;

        self.sync_probe(SYNC_PROBE_FIRST).await?;
        self.sync_probe(SYNC_PROBE_SECOND).await?;

        for (reg, value) in register_table(self.band, self.network_id) {
            self.write_reg(reg, value)?;
        }
        self.set_high_power(self.high_power)?;

        self.poll_register(
            REG_IRQFLAGS1,
            RF_IRQFLAGS1_MODEREADY,
            true,
            INIT_MODE_READY_TIMEOUT,
            "mode ready",
        )
        .await
        .map_err(|e| match e {
            RadioError::Timeout { .. } => RadioError::InitializationTimeout {
                stage: "mode ready",
            },
            other => other,
        })?;
        self.mode = Some(Mode::Standby);

        let version = self.read_reg(REG_VERSION)?;
        info!("RFM69 chip version: 0x{:02X}", version);
        Ok(())
    }

    /// Configure the PA stages for an RFM69HW (`on`) or a plain RFM69.
    pub(crate) fn set_high_power(&mut self, on: bool) -> Result<(), RadioError> {
        self.high_power = on;
        if on {
            self.write_reg(REG_OCP, RF_OCP_OFF)?;
            self.write_register_bits(
                REG_PALEVEL,
                !RF_PALEVEL_OUTPUTPOWER_MASK,
                RF_PALEVEL_PA1_ON | RF_PALEVEL_PA2_ON,
            )?;
        } else {
            self.write_reg(REG_OCP, RF_OCP_ON)?;
            self.write_reg(
                REG_PALEVEL,
                RF_PALEVEL_PA0_ON | RF_PALEVEL_PA1_OFF | RF_PALEVEL_PA2_OFF | self.power_level,
            )?;
        }
        Ok(())
    }

    /// Write the stored output power into PALEVEL
    pub(crate) fn apply_power_level(&mut self) -> Result<(), RadioError> {
        let level = self.power_level;
        self.write_register_bits(REG_PALEVEL, RF_PALEVEL_OUTPUTPOWER_MASK, level)
    }

    pub(crate) fn set_power_level(&mut self, percent: u8) -> Result<u8, RadioError> {
        self.power_level = power_level_code(percent)?;
        self.apply_power_level()?;
        debug!("Output power {}% (code {})", percent, self.power_level);
        Ok(self.power_level)
    }

    /// Load `key` into the AES engine, or disable AES for `None`
    pub(crate) async fn encrypt(&mut self, key: Option<EncryptionKey>) -> Result<(), RadioError> {
        self.set_mode(Mode::Standby).await?;
        match &key {
            Some(key) => {
                let mut burst = Vec::with_capacity(17);
                burst.push(REG_AESKEY1 | 0x80);
                burst.extend_from_slice(key.as_bytes());
                let result = self.hal.transfer(&burst);
                burst.zeroize();
                result?;
                self.write_register_bits(REG_PACKETCONFIG2, RF_PACKET2_AES_ON, RF_PACKET2_AES_ON)?;
                info!("AES encryption enabled");
            }
            None => {
                self.write_register_bits(REG_PACKETCONFIG2, RF_PACKET2_AES_ON, RF_PACKET2_AES_OFF)?;
                debug!("AES encryption disabled");
            }
        }
        self.encryption_key = key;
        Ok(())
    }

    /// Program the 24-bit carrier frequency word
    pub(crate) fn set_frequency(&mut self, frf: u32) -> Result<(), RadioError> {
        if frf > 0x00FF_FFFF {
            return Err(RadioError::InvalidParameter(format!(
                "frequency word 0x{:X} exceeds 24 bits",
                frf
            )));
        }
        self.write_reg(REG_FRFMSB, (frf >> 16) as u8)?;
        self.write_reg(REG_FRFMID, (frf >> 8) as u8)?;
        self.write_reg(REG_FRFLSB, frf as u8)?;
        debug!("Frequency word set to 0x{:06X}", frf);
        Ok(())
    }

    pub(crate) fn set_network(&mut self, network_id: u8) -> Result<(), RadioError> {
        let network_id = validate_network_id(network_id)?;
        self.write_reg(REG_SYNCVALUE2, network_id)?;
        self.network_id = network_id;
        info!("Network ID set to: {}", network_id);
        Ok(())
    }

    pub(crate) fn set_address(&mut self, address: u8) -> Result<(), RadioError> {
        if address == BROADCAST_ADDRESS {
            return Err(RadioError::InvalidParameter(format!(
                "node id {} is reserved for broadcast",
                BROADCAST_ADDRESS
            )));
        }
        self.write_reg(REG_NODEADRS, address)?;
        self.address = address;
        info!("Node ID set to: {}", address);
        Ok(())
    }

    /// Signal strength in dBm; `force` triggers a fresh measurement first
    pub(crate) async fn read_rssi(&mut self, force: bool) -> Result<i16, RadioError> {
        if force {
            self.write_reg(REG_RSSICONFIG, RF_RSSI_START)?;
            self.poll_register(
                REG_RSSICONFIG,
                RF_RSSI_DONE,
                true,
                MEASUREMENT_TIMEOUT,
                "RSSI measurement",
            )
            .await?;
        }
        let raw = self.read_reg(REG_RSSIVALUE)?;
        Ok(-i16::from(raw) >> 1)
    }

    /// Die temperature in °C. The raw reading falls as temperature rises, so
    /// the result uses its bitwise complement `!raw` (255 - raw), not `raw + 1`.
    pub(crate) async fn read_temperature(&mut self, calibration: i16) -> Result<i16, RadioError> {
        self.set_mode(Mode::Standby).await?;
        self.write_reg(REG_TEMP1, RF_TEMP1_MEAS_START)?;
        self.poll_register(
            REG_TEMP1,
            RF_TEMP1_MEAS_RUNNING,
            false,
            MEASUREMENT_TIMEOUT,
            "temperature measurement",
        )
        .await?;
        let raw = self.read_reg(REG_TEMP2)?;
        Ok(i16::from(!raw) + COURSE_TEMP_COEF + calibration)
    }

    /// Calibrate the internal RC oscillator
    pub(crate) async fn calibrate_rc_oscillator(&mut self) -> Result<(), RadioError> {
        self.write_reg(REG_OSC1, RF_OSC1_RCCAL_START)?;
        self.poll_register(
            REG_OSC1,
            RF_OSC1_RCCAL_DONE,
            true,
            MEASUREMENT_TIMEOUT,
            "RC calibration",
        )
        .await
    }

    /// Every configuration register from 0x01 through 0x4F
    pub(crate) fn read_registers(&mut self) -> Result<Vec<(u8, u8)>, RadioError> {
        let mut dump = Vec::with_capacity(usize::from(REG_LAST_DUMPED));
        for addr in 1..=REG_LAST_DUMPED {
            dump.push((addr, self.read_reg(addr)?));
        }
        Ok(dump)
    }

    /// Ask the packet engine to drop the current frame and restart RX
    pub(crate) fn restart_rx(&mut self) -> Result<(), RadioError> {
        self.write_register_bits(REG_PACKETCONFIG2, RF_PACKET2_RXRESTART, RF_PACKET2_RXRESTART)
    }

    /// Map DIO0 to payload-ready and enter RX, dropping any unread frame
    pub(crate) async fn begin_receive(&mut self) -> Result<(), RadioError> {
        if self.read_reg(REG_IRQFLAGS2)? & RF_IRQFLAGS2_PAYLOADREADY != 0 {
            self.restart_rx()?;
        }
        self.write_reg(REG_DIOMAPPING1, RF_DIOMAPPING1_DIO0_01)?;
        self.set_mode(Mode::Receive).await
    }

    /// True while in RX with a complete frame waiting in the FIFO
    pub(crate) fn payload_ready(&mut self) -> Result<bool, RadioError> {
        if self.mode != Some(Mode::Receive) {
            return Ok(false);
        }
        Ok(self.read_reg(REG_IRQFLAGS2)? & RF_IRQFLAGS2_PAYLOADREADY != 0)
    }

    /// Channel check before transmitting.
    ///
    /// Standby enters RX and reports clear. RX reports clear when no frame is
    /// waiting and RSSI is below the CSMA threshold, dropping to standby.
    pub(crate) async fn can_send(&mut self) -> Result<bool, RadioError> {
        match self.mode {
            Some(Mode::Standby) => {
                self.begin_receive().await?;
                Ok(true)
            }
            Some(Mode::Receive) => {
                if self.payload_ready()? {
                    return Ok(false);
                }
                if self.read_rssi(false).await? < CSMA_LIMIT_DBM {
                    self.set_mode(Mode::Standby).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            _ => Ok(false),
        }
    }

    /// Load one frame into the FIFO, transmit it and return to RX
    pub(crate) async fn transmit_frame(
        &mut self,
        target: u8,
        payload: &[u8],
        control: ControlFlags,
    ) -> Result<(), RadioError> {
        self.set_mode(Mode::Standby).await?;
        let mode_limit = self.timing.mode_ready_timeout();
        self.poll_register(
            REG_IRQFLAGS1,
            RF_IRQFLAGS1_MODEREADY,
            true,
            mode_limit,
            "mode ready before transmit",
        )
        .await?;
        self.write_reg(REG_DIOMAPPING1, RF_DIOMAPPING1_DIO0_00)?;

        if payload.len() > MAX_DATA_LEN {
            warn!(
                "Payload of {} bytes truncated to {}",
                payload.len(),
                MAX_DATA_LEN
            );
        }
        let burst = encode_frame(target, self.address, control, payload);
        self.hal.transfer(&burst)?;

        self.set_mode(Mode::Transmit).await?;
        let sent_limit = self.timing.packet_sent_timeout();
        let sent = self
            .poll_register(
                REG_IRQFLAGS2,
                RF_IRQFLAGS2_PACKETSENT,
                true,
                sent_limit,
                "packet sent",
            )
            .await;
        self.begin_receive().await?;
        sent?;
        debug!(
            "Frame sent to node {}: {} bytes, control 0x{:02X}",
            target,
            burst.len() - 2,
            control.bits()
        );
        Ok(())
    }

    /// Read the waiting frame out of the FIFO.
    ///
    /// Returns `None` for frames addressed elsewhere unless `promiscuous`; the
    /// rest of such a frame stays in the FIFO for `begin_receive` to drop.
    pub(crate) async fn read_frame(
        &mut self,
        promiscuous: bool,
    ) -> Result<Option<InboundFrame>, RadioError> {
        self.set_mode(Mode::Standby).await?;
        let response = self.hal.transfer(&header_read_request())?;
        let header = FrameHeader::from_response(&response)
            .ok_or_else(|| HalError::Spi("short FIFO header read".to_string()))?;

        let accepted = promiscuous
            || header.target == self.address
            || header.target == BROADCAST_ADDRESS;
        if !accepted {
            debug!(
                "Ignoring frame for node {} from node {}",
                header.target, header.sender
            );
            return Ok(None);
        }

        let len = header.payload_len();
        let data = if len > 0 {
            let response = self.hal.transfer(&payload_read_request(len))?;
            response.get(1..).unwrap_or_default().to_vec()
        } else {
            Vec::new()
        };
        let rssi = self.read_rssi(false).await?;
        Ok(Some(InboundFrame { header, data, rssi }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::hal::MockHal;

    fn chip(hal: &MockHal) -> Chip<MockHal> {
        let config = RadioConfig::new(FrequencyBand::Mhz433, 2);
        Chip::new(hal.clone(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_loads_table() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.initialize().await.unwrap();

        assert_eq!(chip.mode, Some(Mode::Standby));
        assert_eq!(hal.register(REG_SYNCVALUE1), 0x2D);
        assert_eq!(hal.register(REG_SYNCVALUE2), 100);
        assert_eq!(hal.register(REG_FRFMSB), 0x6C);
        assert_eq!(hal.register(REG_OCP), RF_OCP_OFF);
        assert_eq!(
            hal.register(REG_PALEVEL) & !RF_PALEVEL_OUTPUTPOWER_MASK,
            RF_PALEVEL_PA1_ON | RF_PALEVEL_PA2_ON
        );
    }

    #[tokio::test]
    async fn test_reset_pulse_when_wired() {
        let hal = MockHal::new().with_reset_pin();
        let mut chip = chip(&hal);
        chip.initialize().await.unwrap();
        assert_eq!(hal.reset_pulses(), 1);
    }

    #[tokio::test]
    async fn test_low_power_uses_stored_level() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.power_level = 12;
        chip.set_high_power(false).unwrap();
        assert_eq!(hal.register(REG_OCP), RF_OCP_ON);
        assert_eq!(hal.register(REG_PALEVEL), RF_PALEVEL_PA0_ON | 12);
    }

    #[tokio::test]
    async fn test_power_level_keeps_pa_bits() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.initialize().await.unwrap();
        assert_eq!(chip.set_power_level(100).unwrap(), 31);
        assert_eq!(
            hal.register(REG_PALEVEL),
            RF_PALEVEL_PA1_ON | RF_PALEVEL_PA2_ON | 31
        );
        assert!(chip.set_power_level(101).is_err());
        assert_eq!(chip.power_level, 31);
    }

    #[tokio::test]
    async fn test_rssi_and_temperature_conversion() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.initialize().await.unwrap();

        hal.set_rssi_raw(120);
        assert_eq!(chip.read_rssi(true).await.unwrap(), -60);
        hal.set_rssi_raw(201);
        assert_eq!(chip.read_rssi(false).await.unwrap(), -101);

        hal.set_temperature_raw(140);
        assert_eq!(chip.read_temperature(0).await.unwrap(), 25);
        assert_eq!(chip.read_temperature(-2).await.unwrap(), 23);
    }

    #[tokio::test]
    async fn test_register_dump_range() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        let dump = chip.read_registers().unwrap();
        assert_eq!(dump.len(), 0x4F);
        assert_eq!(dump.first().map(|r| r.0), Some(0x01));
        assert_eq!(dump.last().map(|r| r.0), Some(0x4F));
    }

    #[tokio::test]
    async fn test_can_send_from_standby_and_busy_channel() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.initialize().await.unwrap();

        assert!(chip.can_send().await.unwrap());
        assert_eq!(chip.mode, Some(Mode::Receive));

        hal.set_rssi_raw(100); // -50 dBm
        assert!(!chip.can_send().await.unwrap());
        assert_eq!(chip.mode, Some(Mode::Receive));

        hal.set_rssi_raw(200);
        assert!(chip.can_send().await.unwrap());
        assert_eq!(chip.mode, Some(Mode::Standby));

        chip.set_mode(Mode::Sleep).await.unwrap();
        assert!(!chip.can_send().await.unwrap());
    }

    #[tokio::test]
    async fn test_frequency_word_range() {
        let hal = MockHal::new();
        let mut chip = chip(&hal);
        chip.set_frequency(0xE4C000).unwrap();
        assert_eq!(hal.register(REG_FRFMSB), 0xE4);
        assert_eq!(hal.register(REG_FRFMID), 0xC0);
        assert!(chip.set_frequency(0x0100_0000).is_err());
    }
}
