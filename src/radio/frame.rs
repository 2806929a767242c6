//! # RFM69 Frame Codec
//!
//! Frames travel through the chip FIFO as
//!
//! ```text
//! ┌────────┬────────┬────────┬─────────┬───────────────┐
//! │ length │ target │ sender │ control │ payload (≤61) │
//! └────────┴────────┴────────┴─────────┴───────────────┘
//! ```
//!
//! where `length` counts the three address/control bytes plus the payload.
//! Bit 7 of `control` marks an ack reply, bit 6 an ack request. CRC is
//! checked by the chip's packet engine and never seen here.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::radio::registers::{FIFO_SIZE, MAX_DATA_LEN, REG_FIFO};

/// Bytes between the length byte and the payload
pub const HEADER_OVERHEAD: usize = 3;

bitflags! {
    /// Control byte of a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u8 {
        const ACK_REPLY = 0x80;
        const ACK_REQUEST = 0x40;
    }
}

impl ControlFlags {
    /// Control byte for an outbound frame; an ack reply never requests an ack.
    pub fn outbound(request_ack: bool, ack_reply: bool) -> Self {
        if ack_reply {
            ControlFlags::ACK_REPLY
        } else if request_ack {
            ControlFlags::ACK_REQUEST
        } else {
            ControlFlags::empty()
        }
    }

    pub fn kind(self) -> FrameKind {
        if self.contains(ControlFlags::ACK_REPLY) {
            FrameKind::AckReply
        } else if self.contains(ControlFlags::ACK_REQUEST) {
            FrameKind::AckRequest
        } else {
            FrameKind::Data
        }
    }
}

/// How the receive path treats a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Confirms an earlier frame from us
    AckReply,
    /// Data the sender wants confirmed
    AckRequest,
    /// Plain data
    Data,
}

/// Write-burst bytes for an outbound frame, FIFO address first.
///
/// Payloads longer than [`MAX_DATA_LEN`] are truncated.
pub fn encode_frame(target: u8, sender: u8, control: ControlFlags, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(MAX_DATA_LEN)];
    let mut burst = Vec::with_capacity(2 + HEADER_OVERHEAD + payload.len());
    burst.push(REG_FIFO | 0x80);
    burst.push((payload.len() + HEADER_OVERHEAD) as u8);
    burst.push(target);
    burst.push(sender);
    burst.push(control.bits());
    burst.extend_from_slice(payload);
    burst
}

/// Write-burst bytes for one listen mode wake-up frame.
///
/// The control byte position carries the remaining burst time in
/// milliseconds, little-endian over two bytes.
pub fn encode_burst_frame(target: u8, sender: u8, remaining_ms: u16, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(MAX_DATA_LEN)];
    let [lo, hi] = remaining_ms.to_le_bytes();
    let mut burst = Vec::with_capacity(7 + payload.len());
    burst.push(REG_FIFO | 0x80);
    burst.push((payload.len() + 4) as u8);
    burst.push(target);
    burst.push(sender);
    burst.push(lo);
    burst.push(hi);
    burst.extend_from_slice(payload);
    burst
}

/// Bytes clocked out to read the 4-byte header from the FIFO
pub fn header_read_request() -> [u8; 5] {
    [REG_FIFO & 0x7F, 0, 0, 0, 0]
}

/// Bytes clocked out to read `len` payload bytes from the FIFO
pub fn payload_read_request(len: usize) -> Vec<u8> {
    let mut request = vec![0u8; len + 1];
    request[0] = REG_FIFO & 0x7F;
    request
}

/// The four header bytes of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length byte, clamped to the FIFO size
    pub length: u8,
    pub target: u8,
    pub sender: u8,
    pub control: ControlFlags,
}

impl FrameHeader {
    /// Parse the response to [`header_read_request`]; the first byte is the
    /// status clocked in while the address went out.
    pub fn from_response(response: &[u8]) -> Option<Self> {
        match response {
            [_, length, target, sender, control, ..] => Some(Self::new(
                *length,
                *target,
                *sender,
                ControlFlags::from_bits_retain(*control),
            )),
            _ => None,
        }
    }

    pub fn new(length: u8, target: u8, sender: u8, control: ControlFlags) -> Self {
        Self {
            length: length.min(FIFO_SIZE as u8),
            target,
            sender,
            control,
        }
    }

    /// Payload bytes still waiting in the FIFO
    pub fn payload_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_OVERHEAD)
    }

    pub fn kind(&self) -> FrameKind {
        self.control.kind()
    }
}

/// A frame delivered to the application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedPacket {
    /// Address the frame was sent to
    pub target: u8,
    /// Address of the sending node
    pub sender: u8,
    /// Signal strength at reception, dBm
    pub rssi: i16,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Reception time
    pub received_at: DateTime<Utc>,
}

impl ReceivedPacket {
    pub fn new(target: u8, sender: u8, rssi: i16, data: Vec<u8>) -> Self {
        Self {
            target,
            sender,
            rssi,
            data,
            received_at: Utc::now(),
        }
    }

    /// Payload decoded as UTF-8, invalid sequences replaced
    pub fn data_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// JSON object with all fields
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::radio::hal::{Hal, MockHal};
    use crate::radio::registers::{REG_OPMODE, RF_OPMODE_RECEIVER, RF_OPMODE_TRANSMITTER};

    #[test]
    fn test_loopback_round_trip() {
        let mut sender = MockHal::new();
        sender
            .transfer(&encode_frame(5, 2, ControlFlags::empty(), &[1, 2, 3]))
            .unwrap();
        sender
            .transfer(&[REG_OPMODE | 0x80, RF_OPMODE_TRANSMITTER])
            .unwrap();

        let mut receiver = MockHal::new();
        receiver.inject_raw(sender.sent_frames().remove(0));
        receiver
            .transfer(&[REG_OPMODE | 0x80, RF_OPMODE_RECEIVER])
            .unwrap();

        let response = receiver.transfer(&header_read_request()).unwrap();
        let header = FrameHeader::from_response(&response).unwrap();
        assert_eq!(header.target, 5);
        assert_eq!(header.sender, 2);
        assert_eq!(header.kind(), FrameKind::Data);

        let payload = receiver
            .transfer(&payload_read_request(header.payload_len()))
            .unwrap();
        assert_eq!(&payload[1..], &[1, 2, 3]);
    }

    #[test]
    fn test_encode_truncates_payload() {
        let burst = encode_frame(1, 2, ControlFlags::ACK_REQUEST, &[0xAB; 80]);
        assert_eq!(burst[0], REG_FIFO | 0x80);
        assert_eq!(usize::from(burst[1]), MAX_DATA_LEN + HEADER_OVERHEAD);
        assert_eq!(burst[4], 0x40);
        assert_eq!(burst.len(), 2 + HEADER_OVERHEAD + MAX_DATA_LEN);
    }

    #[test]
    fn test_header_length_clamped() {
        let header = FrameHeader::from_response(&[0, 200, 1, 2, 0]).unwrap();
        assert_eq!(usize::from(header.length), FIFO_SIZE);
        assert_eq!(header.payload_len(), FIFO_SIZE - HEADER_OVERHEAD);

        let empty = FrameHeader::from_response(&[0, 1, 1, 2, 0]).unwrap();
        assert_eq!(empty.payload_len(), 0);
        assert!(FrameHeader::from_response(&[0, 4, 1]).is_none());
    }

    #[test]
    fn test_control_byte_values() {
        assert_eq!(ControlFlags::outbound(false, true).bits(), 0x80);
        assert_eq!(ControlFlags::outbound(true, true).bits(), 0x80);
        assert_eq!(ControlFlags::outbound(true, false).bits(), 0x40);
        assert_eq!(ControlFlags::outbound(false, false).bits(), 0x00);
    }

    #[test]
    fn test_classification() {
        assert_eq!(ControlFlags::from_bits_retain(0xC0).kind(), FrameKind::AckReply);
        assert_eq!(ControlFlags::from_bits_retain(0x40).kind(), FrameKind::AckRequest);
        assert_eq!(ControlFlags::from_bits_retain(0x01).kind(), FrameKind::Data);
    }

    #[test]
    fn test_encode_frame_layout() {
        let burst = encode_frame(5, 2, ControlFlags::ACK_REQUEST, &[1, 2, 3]);
        assert_eq!(burst, vec![0x80, 6, 5, 2, 0x40, 1, 2, 3]);
    }

    #[test]
    fn test_burst_frame_countdown() {
        let burst = encode_burst_frame(9, 1, 0x0312, b"hi");
        assert_eq!(burst, vec![0x80, 6, 9, 1, 0x12, 0x03, b'h', b'i']);
    }

    #[test]
    fn test_read_requests() {
        assert_eq!(header_read_request(), [0x00, 0, 0, 0, 0]);
        assert_eq!(payload_read_request(3), vec![0x00, 0, 0, 0]);
    }

    #[test]
    fn test_packet_text_and_json() {
        let packet = ReceivedPacket::new(1, 2, -60, b"hello".to_vec());
        assert_eq!(packet.data_string(), "hello");
        let json = packet.to_json().unwrap();
        assert!(json.contains("\"sender\":2"));
        assert!(json.contains("\"rssi\":-60"));
    }
}
