//! Integration tests for the public types of the `rfm69-radio` crate.
//!
//! These cover the pieces an application touches without a chip attached:
//! configuration, received packets and control flags.

use rfm69_radio::{ControlFlags, FrameKind, FrequencyBand, RadioConfig, ReceivedPacket};

#[test]
fn test_packet_json() {
    let packet = ReceivedPacket::new(1, 42, -71, b"21.5C".to_vec());
    let json: serde_json::Value = serde_json::from_str(&packet.to_json().unwrap()).unwrap();

    assert_eq!(json["target"], 1);
    assert_eq!(json["sender"], 42);
    assert_eq!(json["rssi"], -71);
    assert_eq!(json["data"], serde_json::json!([50, 49, 46, 53, 67]));
    assert!(json["received_at"].is_string());
}

#[test]
fn test_packet_lossy_string() {
    let packet = ReceivedPacket::new(1, 2, -80, vec![b'o', b'k', 0xFF]);
    assert_eq!(packet.data_string(), "ok\u{FFFD}");
}

#[test]
fn test_control_flags_kind() {
    assert_eq!(ControlFlags::empty().kind(), FrameKind::Data);
    assert_eq!(ControlFlags::ACK_REQUEST.kind(), FrameKind::AckRequest);
    assert_eq!(ControlFlags::ACK_REPLY.kind(), FrameKind::AckReply);
    // Reply wins when both bits are set
    assert_eq!(
        (ControlFlags::ACK_REPLY | ControlFlags::ACK_REQUEST).kind(),
        FrameKind::AckReply
    );
    assert_eq!(ControlFlags::outbound(true, false).bits(), 0x40);
    assert_eq!(ControlFlags::outbound(false, false).bits(), 0x00);
}

#[test]
fn test_config_builders_validate() {
    let config = RadioConfig::new(FrequencyBand::Mhz868, 12)
        .with_network_id(7)
        .with_power_percent(100)
        .with_encryption_key("sampleEncryptKey")
        .with_promiscuous(true);
    assert!(config.validate().is_ok());
    assert!(config.encryption_key().unwrap().is_some());

    assert!(RadioConfig::new(FrequencyBand::Mhz868, 255).validate().is_err());
    assert!(RadioConfig::new(FrequencyBand::Mhz868, 1)
        .with_network_id(255)
        .validate()
        .is_err());
}

#[test]
fn test_band_display() {
    assert_eq!(FrequencyBand::Mhz915.to_string(), "915 MHz");
    assert_eq!("315".parse::<FrequencyBand>().unwrap(), FrequencyBand::Mhz315);
}
