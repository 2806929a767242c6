//! Mock RFM69 implementation for testing
//!
//! This module provides a register-level simulation of the chip behind the
//! [`Hal`] trait, so the driver can be exercised without hardware. It models
//! the parts of the chip the driver depends on: the mode field of REG_OPMODE,
//! the FIFO, the IRQ flags, RSSI and temperature measurements, and the AES key
//! registers. Frames written to the FIFO are recorded when the chip enters TX;
//! injected frames are delivered when it enters RX.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::radio::hal::{Hal, HalError, InterruptEvent, InterruptSender};
use crate::radio::registers::*;

const REGISTER_SPACE: usize = 0x80;
const CHIP_VERSION: u8 = 0x24;

struct MockState {
    regs: [u8; REGISTER_SPACE],
    write_counts: [u32; REGISTER_SPACE],
    tx_fifo: Vec<u8>,
    rx_fifo: VecDeque<u8>,
    payload_ready: bool,
    packet_sent: bool,
    sent: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
    irq: Option<InterruptSender>,
    auto_ack: bool,
    has_reset_pin: bool,
    reset_high: bool,
    reset_pulses: u32,
    rssi_raw: u8,
    temperature_raw: u8,
    unresponsive: bool,
    mode_ready: bool,
    tx_stalled: bool,
    bus_failure: bool,
    released: bool,
}

impl MockState {
    fn new() -> Self {
        let mut regs = [0u8; REGISTER_SPACE];
        regs[usize::from(REG_OPMODE)] = RF_OPMODE_STANDBY;
        regs[usize::from(REG_VERSION)] = CHIP_VERSION;
        Self {
            regs,
            write_counts: [0; REGISTER_SPACE],
            tx_fifo: Vec::new(),
            rx_fifo: VecDeque::new(),
            payload_ready: false,
            packet_sent: false,
            sent: Vec::new(),
            inbound: VecDeque::new(),
            irq: None,
            auto_ack: false,
            has_reset_pin: false,
            reset_high: false,
            reset_pulses: 0,
            // -100 dBm, below the CSMA threshold
            rssi_raw: 200,
            temperature_raw: 140,
            unresponsive: false,
            mode_ready: true,
            tx_stalled: false,
            bus_failure: false,
            released: false,
        }
    }

    fn mode_bits(&self) -> u8 {
        self.regs[usize::from(REG_OPMODE)] & RF_OPMODE_MODE_MASK
    }

    fn read(&self, addr: u8) -> u8 {
        match addr {
            REG_IRQFLAGS1 => {
                if self.mode_ready {
                    RF_IRQFLAGS1_MODEREADY
                } else {
                    0
                }
            }
            REG_IRQFLAGS2 => {
                let mut flags = 0;
                if self.payload_ready {
                    flags |= RF_IRQFLAGS2_PAYLOADREADY;
                }
                if self.packet_sent {
                    flags |= RF_IRQFLAGS2_PACKETSENT;
                }
                if !self.rx_fifo.is_empty() || !self.tx_fifo.is_empty() {
                    flags |= RF_IRQFLAGS2_FIFONOTEMPTY;
                }
                flags
            }
            REG_RSSIVALUE => self.rssi_raw,
            _ => self.regs[usize::from(addr) % REGISTER_SPACE],
        }
    }

    fn write(&mut self, addr: u8, value: u8) {
        let index = usize::from(addr) % REGISTER_SPACE;
        self.write_counts[index] += 1;
        match addr {
            REG_OPMODE => {
                self.regs[index] = value;
                self.enter_mode(value & RF_OPMODE_MODE_MASK);
            }
            REG_PACKETCONFIG2 => {
                self.regs[index] = value & !RF_PACKET2_RXRESTART;
                if value & RF_PACKET2_RXRESTART != 0 {
                    self.rx_fifo.clear();
                    self.payload_ready = false;
                    if self.mode_bits() == RF_OPMODE_RECEIVER {
                        self.deliver_inbound();
                    }
                }
            }
            REG_TEMP1 => {
                if value & RF_TEMP1_MEAS_START != 0 {
                    self.regs[index] = 0;
                    self.regs[usize::from(REG_TEMP2)] = self.temperature_raw;
                }
            }
            REG_OSC1 => {
                self.regs[index] = if value & RF_OSC1_RCCAL_START != 0 {
                    RF_OSC1_RCCAL_DONE
                } else {
                    value
                };
            }
            REG_RSSICONFIG => {
                self.regs[index] = if value & RF_RSSI_START != 0 {
                    RF_RSSI_DONE
                } else {
                    value
                };
            }
            REG_SYNCVALUE1 if self.unresponsive => {}
            REG_IRQFLAGS2 => {}
            _ => self.regs[index] = value,
        }
    }

    fn enter_mode(&mut self, mode: u8) {
        match mode {
            RF_OPMODE_TRANSMITTER => {
                self.rx_fifo.clear();
                self.payload_ready = false;
                if !self.tx_fifo.is_empty() {
                    let frame = std::mem::take(&mut self.tx_fifo);
                    self.transmit(frame);
                }
            }
            RF_OPMODE_RECEIVER => {
                self.packet_sent = false;
                self.deliver_inbound();
            }
            _ => {}
        }
    }

    fn transmit(&mut self, frame: Vec<u8>) {
        if self.tx_stalled {
            return;
        }
        self.packet_sent = true;
        if self.auto_ack && frame.len() >= 4 && frame[3] & CTL_ACK_REQUEST != 0 {
            // Reply from the addressed node back to the sender
            self.inbound.push_back(vec![3, frame[2], frame[1], CTL_ACK_REPLY]);
        }
        self.sent.push(frame);
    }

    fn deliver_inbound(&mut self) {
        if self.payload_ready {
            return;
        }
        if let Some(frame) = self.inbound.pop_front() {
            self.rx_fifo.extend(frame);
            self.payload_ready = true;
            if let Some(irq) = &self.irq {
                let _ = irq.try_send(InterruptEvent::now());
            }
        }
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HalError> {
        if self.bus_failure {
            return Err(HalError::Spi("mock bus failure".to_string()));
        }
        let mut rx = vec![0u8; tx.len()];
        let Some((&first, data)) = tx.split_first() else {
            return Ok(rx);
        };
        let addr = first & 0x7F;
        let is_write = first & 0x80 != 0;

        match (addr, is_write) {
            (REG_FIFO, true) => {
                if self.mode_bits() == RF_OPMODE_TRANSMITTER {
                    // Already transmitting, frame goes straight out
                    self.transmit(data.to_vec());
                } else {
                    self.tx_fifo.extend_from_slice(data);
                }
            }
            (REG_FIFO, false) => {
                for byte in rx.iter_mut().skip(1) {
                    *byte = self.rx_fifo.pop_front().unwrap_or(0);
                }
                if self.rx_fifo.is_empty() {
                    self.payload_ready = false;
                }
            }
            (_, true) => {
                for (offset, value) in data.iter().enumerate() {
                    self.write(addr.wrapping_add(offset as u8), *value);
                }
            }
            (_, false) => {
                for (offset, byte) in rx.iter_mut().skip(1).enumerate() {
                    *byte = self.read(addr.wrapping_add(offset as u8));
                }
            }
        }
        Ok(rx)
    }
}

/// Simulated RFM69 behind the [`Hal`] trait.
///
/// Clones share the same chip, so a test can keep a handle for inspection
/// after moving one into the driver.
#[derive(Clone)]
pub struct MockHal {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHal {
    pub fn new() -> Self {
        MockHal {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a wired reset pin; reset pulses are then counted
    pub fn with_reset_pin(self) -> Self {
        self.state().has_reset_pin = true;
        self
    }

    /// Answer every transmitted ack request with an ack reply from its target
    pub fn set_auto_ack(&self, on: bool) {
        self.state().auto_ack = on;
    }

    /// Queue a frame from another node; it arrives once the chip is in RX
    pub fn inject_frame(&self, target: u8, sender: u8, control: u8, payload: &[u8]) {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push((payload.len() + 3) as u8);
        frame.push(target);
        frame.push(sender);
        frame.push(control);
        frame.extend_from_slice(payload);
        self.inject_raw(frame);
    }

    /// Queue raw FIFO content, length byte first
    pub fn inject_raw(&self, frame: Vec<u8>) {
        let mut state = self.state();
        state.inbound.push_back(frame);
        if state.mode_bits() == RF_OPMODE_RECEIVER {
            state.deliver_inbound();
        }
    }

    /// Frames transmitted so far, length byte first
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn clear_sent_frames(&self) {
        self.state().sent.clear();
    }

    /// Whether an injected frame is waiting in the FIFO or the queue
    pub fn rx_pending(&self) -> bool {
        let state = self.state();
        state.payload_ready || !state.inbound.is_empty()
    }

    /// Raw RSSI register value; dBm is `-raw / 2`
    pub fn set_rssi_raw(&self, raw: u8) {
        self.state().rssi_raw = raw;
    }

    /// Raw TEMP2 value reported by the next measurement
    pub fn set_temperature_raw(&self, raw: u8) {
        self.state().temperature_raw = raw;
    }

    /// Ignore writes to SYNCVALUE1, failing the bring-up handshake
    pub fn set_unresponsive(&self, on: bool) {
        self.state().unresponsive = on;
    }

    /// Control the MODEREADY flag
    pub fn set_mode_ready(&self, ready: bool) {
        self.state().mode_ready = ready;
    }

    /// Swallow frames entering TX without ever raising PACKETSENT
    pub fn set_tx_stalled(&self, on: bool) {
        self.state().tx_stalled = on;
    }

    /// Fail every SPI transfer
    pub fn set_bus_failure(&self, on: bool) {
        self.state().bus_failure = on;
    }

    /// Current register content
    pub fn register(&self, addr: u8) -> u8 {
        self.state().read(addr)
    }

    /// Number of writes to a register
    pub fn write_count(&self, addr: u8) -> u32 {
        self.state().write_counts[usize::from(addr) % REGISTER_SPACE]
    }

    /// Mode bits of REG_OPMODE
    pub fn mode_bits(&self) -> u8 {
        self.state().mode_bits()
    }

    /// Key currently held in the AES registers
    pub fn aes_key(&self) -> [u8; 16] {
        let state = self.state();
        let start = usize::from(REG_AESKEY1);
        let mut key = [0u8; 16];
        key.copy_from_slice(&state.regs[start..start + 16]);
        key
    }

    pub fn reset_pulses(&self) -> u32 {
        self.state().reset_pulses
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.state().irq.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }
}

impl Hal for MockHal {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HalError> {
        self.state().transfer(tx)
    }

    fn set_reset(&mut self, high: bool) -> Result<(), HalError> {
        let mut state = self.state();
        if !state.has_reset_pin {
            return Err(HalError::Gpio("No reset pin configured".to_string()));
        }
        if state.reset_high && !high {
            // Falling edge ends the pulse: registers back to power-on values
            let mut fresh = MockState::new();
            fresh.irq = state.irq.take();
            fresh.auto_ack = state.auto_ack;
            fresh.unresponsive = state.unresponsive;
            fresh.tx_stalled = state.tx_stalled;
            fresh.rssi_raw = state.rssi_raw;
            fresh.temperature_raw = state.temperature_raw;
            fresh.has_reset_pin = true;
            fresh.sent = std::mem::take(&mut state.sent);
            fresh.write_counts = state.write_counts;
            fresh.reset_pulses = state.reset_pulses + 1;
            *state = fresh;
        }
        state.reset_high = high;
        Ok(())
    }

    fn has_reset_pin(&self) -> bool {
        self.state().has_reset_pin
    }

    fn enable_interrupt(&mut self, notify: InterruptSender) -> Result<(), HalError> {
        self.state().irq = Some(notify);
        Ok(())
    }

    fn disable_interrupt(&mut self) -> Result<(), HalError> {
        self.state().irq = None;
        Ok(())
    }

    fn release(&mut self) -> Result<(), HalError> {
        let mut state = self.state();
        state.irq = None;
        state.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_read_write() {
        let mut hal = MockHal::new();
        hal.transfer(&[REG_SYNCVALUE1 | 0x80, 0xAA]).unwrap();
        let rx = hal.transfer(&[REG_SYNCVALUE1, 0]).unwrap();
        assert_eq!(rx, vec![0, 0xAA]);
        assert_eq!(hal.write_count(REG_SYNCVALUE1), 1);
        assert_eq!(hal.register(REG_VERSION), CHIP_VERSION);
    }

    #[test]
    fn test_transmit_records_frame() {
        let mut hal = MockHal::new();
        hal.transfer(&[REG_FIFO | 0x80, 4, 9, 1, 0, b'x']).unwrap();
        assert!(hal.sent_frames().is_empty());
        hal.transfer(&[REG_OPMODE | 0x80, RF_OPMODE_TRANSMITTER]).unwrap();
        assert_eq!(hal.sent_frames(), vec![vec![4, 9, 1, 0, b'x']]);
        assert_ne!(hal.register(REG_IRQFLAGS2) & RF_IRQFLAGS2_PACKETSENT, 0);
    }

    #[test]
    fn test_inbound_delivered_in_rx() {
        let mut hal = MockHal::new();
        hal.inject_frame(1, 2, 0, b"hi");
        assert_eq!(hal.register(REG_IRQFLAGS2) & RF_IRQFLAGS2_PAYLOADREADY, 0);

        hal.transfer(&[REG_OPMODE | 0x80, RF_OPMODE_RECEIVER]).unwrap();
        assert_ne!(hal.register(REG_IRQFLAGS2) & RF_IRQFLAGS2_PAYLOADREADY, 0);

        let rx = hal.transfer(&[REG_FIFO, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(rx, vec![0, 5, 1, 2, 0, b'h', b'i']);
        assert!(!hal.rx_pending());
    }

    #[test]
    fn test_auto_ack_reply_queued() {
        let mut hal = MockHal::new();
        hal.set_auto_ack(true);
        hal.transfer(&[REG_FIFO | 0x80, 3, 9, 1, CTL_ACK_REQUEST]).unwrap();
        hal.transfer(&[REG_OPMODE | 0x80, RF_OPMODE_TRANSMITTER]).unwrap();
        hal.transfer(&[REG_OPMODE | 0x80, RF_OPMODE_RECEIVER]).unwrap();
        let rx = hal.transfer(&[REG_FIFO, 0, 0, 0, 0]).unwrap();
        assert_eq!(rx, vec![0, 3, 1, 9, CTL_ACK_REPLY]);
    }

    #[test]
    fn test_bus_failure() {
        let mut hal = MockHal::new();
        hal.set_bus_failure(true);
        assert!(matches!(
            hal.transfer(&[REG_VERSION, 0]),
            Err(HalError::Spi(_))
        ));
    }
}
