//! # Radio Configuration
//!
//! One explicit configuration structure for the driver, loadable from JSON:
//!
//! ```json
//! {
//!   "frequency_band": "433",
//!   "node_id": 1,
//!   "network_id": 100,
//!   "encryption_key": "sampleEncryptKey",
//!   "pins": { "interrupt": 24, "reset": 5 }
//! }
//! ```
//!
//! It also holds the static register table applied after reset.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::RadioError;
use crate::radio::registers::*;

/// Frequency band of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyBand {
    #[serde(rename = "315")]
    Mhz315,
    #[serde(rename = "433")]
    Mhz433,
    #[serde(rename = "868")]
    Mhz868,
    #[serde(rename = "915")]
    Mhz915,
}

impl FrequencyBand {
    /// 24-bit carrier frequency word (Fstep = 32 MHz / 2^19)
    pub fn frf(self) -> u32 {
        match self {
            FrequencyBand::Mhz315 => 0x4E_C000,
            FrequencyBand::Mhz433 => 0x6C_4000,
            FrequencyBand::Mhz868 => 0xD9_0000,
            FrequencyBand::Mhz915 => 0xE4_C000,
        }
    }

    /// Nominal band in MHz
    pub fn mhz(self) -> u16 {
        match self {
            FrequencyBand::Mhz315 => 315,
            FrequencyBand::Mhz433 => 433,
            FrequencyBand::Mhz868 => 868,
            FrequencyBand::Mhz915 => 915,
        }
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.mhz())
    }
}

impl FromStr for FrequencyBand {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches(|c: char| c.is_ascii_alphabetic());
        match digits {
            "315" => Ok(FrequencyBand::Mhz315),
            "433" => Ok(FrequencyBand::Mhz433),
            "868" => Ok(FrequencyBand::Mhz868),
            "915" => Ok(FrequencyBand::Mhz915),
            _ => Err(RadioError::InvalidParameter(format!(
                "unknown frequency band '{}', expected 315, 433, 868 or 915",
                s
            ))),
        }
    }
}

/// Ordered (register, value) writes that bring a freshly reset chip into
/// packet mode on `band` with `network_id` as the second sync byte.
pub fn register_table(band: FrequencyBand, network_id: u8) -> Vec<(u8, u8)> {
    let frf = band.frf();
    vec![
        (
            REG_OPMODE,
            RF_OPMODE_SEQUENCER_ON | RF_OPMODE_LISTEN_OFF | RF_OPMODE_STANDBY,
        ),
        (
            REG_DATAMODUL,
            RF_DATAMODUL_DATAMODE_PACKET
                | RF_DATAMODUL_MODULATIONTYPE_FSK
                | RF_DATAMODUL_MODULATIONSHAPING_00,
        ),
        (REG_BITRATEMSB, RF_BITRATEMSB_55555),
        (REG_BITRATELSB, RF_BITRATELSB_55555),
        (REG_FDEVMSB, RF_FDEVMSB_50000),
        (REG_FDEVLSB, RF_FDEVLSB_50000),
        (REG_FRFMSB, (frf >> 16) as u8),
        (REG_FRFMID, (frf >> 8) as u8),
        (REG_FRFLSB, frf as u8),
        (REG_RXBW, RF_RXBW_DCCFREQ_010 | RF_RXBW_MANT_16 | RF_RXBW_EXP_2),
        (REG_DIOMAPPING1, RF_DIOMAPPING1_DIO0_01),
        (REG_DIOMAPPING2, RF_DIOMAPPING2_CLKOUT_OFF),
        (REG_IRQFLAGS2, RF_IRQFLAGS2_FIFOOVERRUN),
        (REG_RSSITHRESH, 220),
        (
            REG_SYNCCONFIG,
            RF_SYNC_ON | RF_SYNC_FIFOFILL_AUTO | RF_SYNC_SIZE_2 | RF_SYNC_TOL_0,
        ),
        (REG_SYNCVALUE1, 0x2D),
        (REG_SYNCVALUE2, network_id),
        (
            REG_PACKETCONFIG1,
            RF_PACKET1_FORMAT_VARIABLE
                | RF_PACKET1_DCFREE_OFF
                | RF_PACKET1_CRC_ON
                | RF_PACKET1_CRCAUTOCLEAR_ON
                | RF_PACKET1_ADRSFILTERING_OFF,
        ),
        (REG_PAYLOADLENGTH, FIFO_SIZE as u8),
        (
            REG_FIFOTHRESH,
            RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY | RF_FIFOTHRESH_VALUE,
        ),
        (
            REG_PACKETCONFIG2,
            RF_PACKET2_RXRESTARTDELAY_2BITS | RF_PACKET2_AUTORXRESTART_ON | RF_PACKET2_AES_OFF,
        ),
        (REG_TESTDAGC, RF_DAGC_IMPROVED_LOWBETA0),
    ]
}

/// AES-128 key loaded into the chip; wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 16]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Accepts either 16 ASCII characters or 32 hex digits.
    pub fn parse(key: &str) -> Result<Self, RadioError> {
        let mut bytes = [0u8; 16];
        if key.len() == 16 && key.is_ascii() {
            bytes.copy_from_slice(key.as_bytes());
        } else if key.len() == 32 {
            hex::decode_to_slice(key, &mut bytes).map_err(|e| {
                RadioError::InvalidParameter(format!("encryption key is not valid hex: {}", e))
            })?;
        } else {
            return Err(RadioError::InvalidParameter(format!(
                "encryption key must be 16 characters or 32 hex digits, got {} characters",
                key.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// GPIO assignment (BCM numbering)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// DIO0 interrupt input
    pub interrupt: u8,
    /// Reset output, active high
    pub reset: Option<u8>,
    /// Chip select driven from a GPIO; `None` uses the hardware CE line
    pub select: Option<u8>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            interrupt: DEFAULT_INTERRUPT_PIN,
            reset: Some(DEFAULT_RESET_PIN),
            select: None,
        }
    }
}

/// Bounds for the driver's polling loops, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Longest wait for a clear channel before transmitting anyway
    pub csma_limit_ms: u64,
    /// Period of the ack check while a send waits for its reply
    pub ack_poll_interval_ms: u64,
    /// Longest wait for mode-ready after leaving sleep
    pub mode_ready_timeout_ms: u64,
    /// Longest wait for packet-sent after entering TX
    pub packet_sent_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            csma_limit_ms: 1000,
            ack_poll_interval_ms: 5,
            mode_ready_timeout_ms: 1000,
            packet_sent_timeout_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn csma_limit(&self) -> Duration {
        Duration::from_millis(self.csma_limit_ms)
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms.max(1))
    }

    pub fn mode_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.mode_ready_timeout_ms)
    }

    pub fn packet_sent_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_sent_timeout_ms)
    }
}

/// Configuration for the RFM69 driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Frequency band of the module
    pub frequency_band: FrequencyBand,
    /// Address of this node
    pub node_id: u8,
    /// Network id, 1..=254
    #[serde(default = "default_network_id")]
    pub network_id: u8,
    /// Reply to ack requests from the receive path
    #[serde(default = "default_true")]
    pub auto_acknowledge: bool,
    /// RFM69HW/HCW module with the PA boost stages
    #[serde(default = "default_true")]
    pub high_power: bool,
    /// Transmit power, 0..=100 percent
    #[serde(default = "default_power")]
    pub power_percent: u8,
    /// Deliver frames addressed to other nodes too
    #[serde(default)]
    pub promiscuous: bool,
    /// 16 characters or 32 hex digits; `None` disables AES
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub spi_bus: u8,
    #[serde(default)]
    pub spi_slave_select: u8,
    #[serde(default = "default_spi_speed")]
    pub spi_speed_hz: u32,
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_network_id() -> u8 {
    100
}

fn default_true() -> bool {
    true
}

fn default_power() -> u8 {
    70
}

fn default_spi_speed() -> u32 {
    SPI_SPEED
}

impl RadioConfig {
    /// Defaults for everything but band and node address
    pub fn new(frequency_band: FrequencyBand, node_id: u8) -> Self {
        Self {
            frequency_band,
            node_id,
            network_id: default_network_id(),
            auto_acknowledge: true,
            high_power: true,
            power_percent: default_power(),
            promiscuous: false,
            encryption_key: None,
            pins: PinConfig::default(),
            spi_bus: 0,
            spi_slave_select: 0,
            spi_speed_hz: SPI_SPEED,
            timing: TimingConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, RadioError> {
        let config: RadioConfig = serde_json::from_str(json)
            .map_err(|e| RadioError::InvalidParameter(format!("configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_network_id(mut self, network_id: u8) -> Self {
        self.network_id = network_id;
        self
    }

    pub fn with_power_percent(mut self, percent: u8) -> Self {
        self.power_percent = percent;
        self
    }

    pub fn with_encryption_key(mut self, key: &str) -> Self {
        self.encryption_key = Some(key.to_string());
        self
    }

    pub fn with_promiscuous(mut self, on: bool) -> Self {
        self.promiscuous = on;
        self
    }

    pub fn with_auto_acknowledge(mut self, on: bool) -> Self {
        self.auto_acknowledge = on;
        self
    }

    pub fn with_high_power(mut self, on: bool) -> Self {
        self.high_power = on;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Check every ranged field
    pub fn validate(&self) -> Result<(), RadioError> {
        validate_network_id(self.network_id)?;
        power_level_code(self.power_percent)?;
        if self.node_id == BROADCAST_ADDRESS {
            return Err(RadioError::InvalidParameter(format!(
                "node id {} is reserved for broadcast",
                BROADCAST_ADDRESS
            )));
        }
        if self.spi_speed_hz == 0 {
            return Err(RadioError::InvalidParameter(
                "SPI speed must be non-zero".to_string(),
            ));
        }
        self.encryption_key()?;
        Ok(())
    }

    /// The parsed encryption key, if one is configured
    pub fn encryption_key(&self) -> Result<Option<EncryptionKey>, RadioError> {
        self.encryption_key
            .as_deref()
            .map(EncryptionKey::parse)
            .transpose()
    }
}

/// Accepts network ids 1..=254
pub fn validate_network_id(network_id: u8) -> Result<u8, RadioError> {
    if (1..=254).contains(&network_id) {
        Ok(network_id)
    } else {
        Err(RadioError::InvalidParameter(format!(
            "network id {} outside 1..=254",
            network_id
        )))
    }
}

/// Maps a power percentage onto the 5-bit output power field:
/// round(31 * percent / 100).
pub fn power_level_code(percent: u8) -> Result<u8, RadioError> {
    if percent > 100 {
        return Err(RadioError::InvalidParameter(format!(
            "power {}% outside 0..=100",
            percent
        )));
    }
    let code = (31 * u32::from(percent) + 50) / 100;
    Ok((code as u8).min(RF_PALEVEL_OUTPUTPOWER_MASK))
}
