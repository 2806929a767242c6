//! # RFM69 Register Definitions and Constants
//!
//! Register addresses and bit field values for the HopeRF RFM69 (W/CW/HW/HCW)
//! transceiver family, as used by the packet driver in this crate.
//!
//! ## Register Map
//!
//! - 0x00-0x0F: FIFO, operating mode, modulation, bit rate, frequency, listen mode
//! - 0x10-0x2F: PA, LNA, RX bandwidth, RSSI, DIO mapping, IRQ flags, sync word
//! - 0x30-0x4F: packet engine, addressing, AES key, temperature sensor
//! - 0x5A-0x71: test registers (high power PA boost, DAGC)

// =============================================================================
// Register Addresses
// =============================================================================

/// FIFO read/write access register
pub const REG_FIFO: u8 = 0x00;

/// Operating mode, sequencer and listen mode control
pub const REG_OPMODE: u8 = 0x01;

/// Data processing mode and modulation scheme
pub const REG_DATAMODUL: u8 = 0x02;

/// Bit rate setting (MSB)
pub const REG_BITRATEMSB: u8 = 0x03;

/// Bit rate setting (LSB)
pub const REG_BITRATELSB: u8 = 0x04;

/// Frequency deviation setting (MSB)
pub const REG_FDEVMSB: u8 = 0x05;

/// Frequency deviation setting (LSB)
pub const REG_FDEVLSB: u8 = 0x06;

/// RF carrier frequency setting (MSB)
pub const REG_FRFMSB: u8 = 0x07;

/// RF carrier frequency setting (MID)
pub const REG_FRFMID: u8 = 0x08;

/// RF carrier frequency setting (LSB), writing it latches the new frequency
pub const REG_FRFLSB: u8 = 0x09;

/// RC oscillator settings
pub const REG_OSC1: u8 = 0x0A;

/// Listen mode resolutions and criteria
pub const REG_LISTEN1: u8 = 0x0D;

/// Listen mode idle coefficient
pub const REG_LISTEN2: u8 = 0x0E;

/// Listen mode RX coefficient
pub const REG_LISTEN3: u8 = 0x0F;

/// Chip version (read-only)
pub const REG_VERSION: u8 = 0x10;

/// PA selection and output power control
pub const REG_PALEVEL: u8 = 0x11;

/// Over current protection control
pub const REG_OCP: u8 = 0x13;

/// LNA settings
pub const REG_LNA: u8 = 0x18;

/// Channel filter bandwidth control
pub const REG_RXBW: u8 = 0x19;

/// RSSI trigger and status
pub const REG_RSSICONFIG: u8 = 0x23;

/// RSSI value, -RssiValue/2 dBm
pub const REG_RSSIVALUE: u8 = 0x24;

/// Mapping of pins DIO0 to DIO3
pub const REG_DIOMAPPING1: u8 = 0x25;

/// Mapping of pins DIO4 and DIO5, ClkOut frequency
pub const REG_DIOMAPPING2: u8 = 0x26;

/// Status register: mode ready, RX/TX ready, PLL lock, RSSI
pub const REG_IRQFLAGS1: u8 = 0x27;

/// Status register: FIFO and packet engine flags
pub const REG_IRQFLAGS2: u8 = 0x28;

/// RSSI trigger level for RSSI interrupt
pub const REG_RSSITHRESH: u8 = 0x29;

/// Sync word recognition control
pub const REG_SYNCCONFIG: u8 = 0x2E;

/// Sync word byte 1
pub const REG_SYNCVALUE1: u8 = 0x2F;

/// Sync word byte 2, carries the network id
pub const REG_SYNCVALUE2: u8 = 0x30;

/// Packet format, DC-free encoding, CRC and address filtering
pub const REG_PACKETCONFIG1: u8 = 0x37;

/// Payload length (maximum length in variable length mode)
pub const REG_PAYLOADLENGTH: u8 = 0x38;

/// Node address
pub const REG_NODEADRS: u8 = 0x39;

/// Broadcast address
pub const REG_BROADCASTADRS: u8 = 0x3A;

/// FIFO threshold, TX start condition
pub const REG_FIFOTHRESH: u8 = 0x3C;

/// Inter packet RX delay, RX restart, AES enable
pub const REG_PACKETCONFIG2: u8 = 0x3D;

/// First of the 16 AES key registers (0x3E-0x4D)
pub const REG_AESKEY1: u8 = 0x3E;

/// Temperature sensor control
pub const REG_TEMP1: u8 = 0x4E;

/// Temperature sensor reading
pub const REG_TEMP2: u8 = 0x4F;

/// High power PA setting 1
pub const REG_TESTPA1: u8 = 0x5A;

/// High power PA setting 2
pub const REG_TESTPA2: u8 = 0x5C;

/// Fading margin improvement
pub const REG_TESTDAGC: u8 = 0x6F;

/// Last register included in a register dump
pub const REG_LAST_DUMPED: u8 = 0x4F;

// =============================================================================
// Operating Mode Constants
// =============================================================================

/// Mode bits of REG_OPMODE
pub const RF_OPMODE_MODE_MASK: u8 = 0x1C;

pub const RF_OPMODE_SEQUENCER_ON: u8 = 0x00;
pub const RF_OPMODE_LISTEN_OFF: u8 = 0x00;
pub const RF_OPMODE_SLEEP: u8 = 0x00;
pub const RF_OPMODE_STANDBY: u8 = 0x04;
pub const RF_OPMODE_SYNTHESIZER: u8 = 0x08;
pub const RF_OPMODE_TRANSMITTER: u8 = 0x0C;
pub const RF_OPMODE_RECEIVER: u8 = 0x10;

// =============================================================================
// IRQ Flag Definitions
// =============================================================================

/// IRQ flags in REG_IRQFLAGS1
pub const RF_IRQFLAGS1_MODEREADY: u8 = 0x80;

/// IRQ flags in REG_IRQFLAGS2
pub const RF_IRQFLAGS2_PAYLOADREADY: u8 = 0x04;
pub const RF_IRQFLAGS2_PACKETSENT: u8 = 0x08;
pub const RF_IRQFLAGS2_FIFOOVERRUN: u8 = 0x10;
pub const RF_IRQFLAGS2_FIFONOTEMPTY: u8 = 0x40;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Data modulation: packet mode, FSK, no shaping
pub const RF_DATAMODUL_DATAMODE_PACKET: u8 = 0x00;
pub const RF_DATAMODUL_MODULATIONTYPE_FSK: u8 = 0x00;
pub const RF_DATAMODUL_MODULATIONSHAPING_00: u8 = 0x00;

/// Bit rate 55.555 kbps (default) and 200 kbps (listen mode burst)
pub const RF_BITRATEMSB_55555: u8 = 0x02;
pub const RF_BITRATELSB_55555: u8 = 0x40;
pub const RF_BITRATEMSB_200000: u8 = 0x00;
pub const RF_BITRATELSB_200000: u8 = 0xA0;

/// Frequency deviation 50 kHz (default) and 100 kHz (listen mode burst)
pub const RF_FDEVMSB_50000: u8 = 0x03;
pub const RF_FDEVLSB_50000: u8 = 0x33;
pub const RF_FDEVMSB_100000: u8 = 0x06;
pub const RF_FDEVLSB_100000: u8 = 0x66;

/// RC oscillator calibration flags
pub const RF_OSC1_RCCAL_START: u8 = 0x80;
pub const RF_OSC1_RCCAL_DONE: u8 = 0x40;

/// PA stage selection in REG_PALEVEL
pub const RF_PALEVEL_PA0_ON: u8 = 0x80;
pub const RF_PALEVEL_PA0_OFF: u8 = 0x00;
pub const RF_PALEVEL_PA1_ON: u8 = 0x40;
pub const RF_PALEVEL_PA1_OFF: u8 = 0x00;
pub const RF_PALEVEL_PA2_ON: u8 = 0x20;
pub const RF_PALEVEL_PA2_OFF: u8 = 0x00;
/// Output power bits of REG_PALEVEL
pub const RF_PALEVEL_OUTPUTPOWER_MASK: u8 = 0x1F;

/// Over current protection
pub const RF_OCP_OFF: u8 = 0x0F;
pub const RF_OCP_ON: u8 = 0x1A;

/// LNA gain selected by AGC
pub const RF_LNA_GAINSELECT_AUTO: u8 = 0x00;
pub const RF_LNA_GAINSELECT_MASK: u8 = 0x03;

/// RX bandwidth fields
pub const RF_RXBW_DCCFREQ_000: u8 = 0x00;
pub const RF_RXBW_DCCFREQ_010: u8 = 0x40;
pub const RF_RXBW_MANT_16: u8 = 0x00;
pub const RF_RXBW_MANT_20: u8 = 0x08;
pub const RF_RXBW_EXP_0: u8 = 0x00;
pub const RF_RXBW_EXP_2: u8 = 0x02;

/// RSSI measurement trigger/status
pub const RF_RSSI_START: u8 = 0x01;
pub const RF_RSSI_DONE: u8 = 0x02;

/// DIO0 mapping: 00 = PacketSent in TX, 01 = PayloadReady in RX
pub const RF_DIOMAPPING1_DIO0_00: u8 = 0x00;
pub const RF_DIOMAPPING1_DIO0_01: u8 = 0x40;

/// ClkOut disabled
pub const RF_DIOMAPPING2_CLKOUT_OFF: u8 = 0x07;

/// Sync word configuration
pub const RF_SYNC_ON: u8 = 0x80;
pub const RF_SYNC_FIFOFILL_AUTO: u8 = 0x00;
pub const RF_SYNC_SIZE_2: u8 = 0x08;
pub const RF_SYNC_TOL_0: u8 = 0x00;

/// Packet configuration 1 flags
pub const RF_PACKET1_FORMAT_VARIABLE: u8 = 0x80;
pub const RF_PACKET1_DCFREE_OFF: u8 = 0x00;
pub const RF_PACKET1_DCFREE_WHITENING: u8 = 0x40;
pub const RF_PACKET1_CRC_ON: u8 = 0x10;
pub const RF_PACKET1_CRCAUTOCLEAR_ON: u8 = 0x00;
pub const RF_PACKET1_ADRSFILTERING_OFF: u8 = 0x00;

/// FIFO threshold: start TX as soon as the FIFO is not empty
pub const RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY: u8 = 0x80;
pub const RF_FIFOTHRESH_VALUE: u8 = 0x0F;

/// Packet configuration 2 flags
pub const RF_PACKET2_RXRESTARTDELAY_2BITS: u8 = 0x10;
pub const RF_PACKET2_RXRESTARTDELAY_NONE: u8 = 0xF0;
pub const RF_PACKET2_RXRESTART: u8 = 0x04;
pub const RF_PACKET2_AUTORXRESTART_ON: u8 = 0x02;
pub const RF_PACKET2_AES_ON: u8 = 0x01;
pub const RF_PACKET2_AES_OFF: u8 = 0x00;

/// Temperature measurement control
pub const RF_TEMP1_MEAS_START: u8 = 0x08;
pub const RF_TEMP1_MEAS_RUNNING: u8 = 0x04;

/// DAGC setting for low modulation index
pub const RF_DAGC_IMPROVED_LOWBETA0: u8 = 0x30;

/// TESTPA values for +20 dBm operation and for normal operation
pub const RF_TESTPA1_BOOST: u8 = 0x5D;
pub const RF_TESTPA2_BOOST: u8 = 0x7C;
pub const RF_TESTPA1_NORMAL: u8 = 0x55;
pub const RF_TESTPA2_NORMAL: u8 = 0x70;

/// Sync value used to verify the chip responds after reset
pub const SYNC_PROBE_FIRST: u8 = 0xAA;
pub const SYNC_PROBE_SECOND: u8 = 0x55;

/// Sync word used for listen mode bursts
pub const LISTEN_BURST_SYNC: u8 = 0x5A;

/// Coarse calibration offset applied to the temperature reading
pub const COURSE_TEMP_COEF: i16 = -90;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Maximum payload bytes per frame
pub const MAX_DATA_LEN: usize = 61;

/// Hardware FIFO size in bytes, ceiling for a received length byte
pub const FIFO_SIZE: usize = 66;

/// RSSI below this level (dBm) means the channel is clear
pub const CSMA_LIMIT_DBM: i16 = -90;

/// Address reserved for broadcast frames
pub const BROADCAST_ADDRESS: u8 = 255;

/// Control byte flag: frame acknowledges a previous frame
pub const CTL_ACK_REPLY: u8 = 0x80;

/// Control byte flag: sender requests an acknowledgement
pub const CTL_ACK_REQUEST: u8 = 0x40;

/// Default SPI communication speed
pub const SPI_SPEED: u32 = 4_000_000;

/// Default listen mode RX window
pub const DEFAULT_LISTEN_RX_US: u32 = 256;

/// Default listen mode idle window
pub const DEFAULT_LISTEN_IDLE_US: u32 = 1_000_000;

/// Default GPIO pins (BCM numbering)
pub const DEFAULT_RESET_PIN: u8 = 5;
pub const DEFAULT_INTERRUPT_PIN: u8 = 24;
