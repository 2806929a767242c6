//! Listen mode cycle configuration and wake-up bursts over the mock chip.

use rfm69_radio::radio::registers::*;
use rfm69_radio::{FrequencyBand, MockHal, Mode, Radio, RadioConfig, RadioError};

async fn start_with(config: RadioConfig) -> (Radio<MockHal>, MockHal) {
    let hal = MockHal::new();
    let radio = Radio::new(hal.clone(), config).await.unwrap();
    (radio, hal)
}

/// Countdown field of a burst frame as recorded by the mock
fn countdown(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[3], frame[4]])
}

#[tokio::test]
async fn test_default_cycle() {
    let (radio, _hal) = start_with(RadioConfig::new(FrequencyBand::Mhz433, 1)).await;
    assert_eq!(radio.listen_durations().await.unwrap(), (256, 1_000_400));
}

#[tokio::test]
async fn test_durations_rounded_to_chip_steps() {
    let (radio, _hal) = start_with(RadioConfig::new(FrequencyBand::Mhz433, 1)).await;

    assert_eq!(
        radio.set_listen_durations(256, 20_000).await.unwrap(),
        (256, 20_500)
    );
    assert_eq!(radio.listen_durations().await.unwrap(), (256, 20_500));
}

#[tokio::test]
async fn test_unrepresentable_duration_keeps_cycle() {
    let (radio, _hal) = start_with(RadioConfig::new(FrequencyBand::Mhz433, 1)).await;

    let result = radio.set_listen_durations(256, u32::MAX).await;
    assert!(matches!(
        result,
        Err(RadioError::UnrepresentableDuration { micros: u32::MAX })
    ));
    assert!(radio.set_listen_durations(10, 20_000).await.is_err());
    assert_eq!(radio.listen_durations().await.unwrap(), (256, 1_000_400));
}

#[tokio::test]
async fn test_burst_frames_count_down() {
    let (radio, hal) = start_with(RadioConfig::new(FrequencyBand::Mhz433, 1)).await;
    radio.set_listen_durations(256, 20_000).await.unwrap();

    let frames = radio.listen_mode_send_burst(4, b"wake").await.unwrap();
    let sent = hal.sent_frames();
    assert!(frames >= 1);
    assert_eq!(sent.len() as u64, frames);

    // 20_756 us cycle
    assert_eq!(sent[0], vec![8, 4, 1, 20, 0, b'w', b'a', b'k', b'e']);
    let counts: Vec<u16> = sent.iter().map(|frame| countdown(frame)).collect();
    assert!(counts.iter().all(|&ms| ms >= 1 && ms <= 20));
    assert!(counts.windows(2).all(|pair| pair[1] <= pair[0]));
    assert_eq!(radio.stats().burst_frames, frames);
}

#[tokio::test]
async fn test_burst_restores_normal_operation() {
    let config = RadioConfig::new(FrequencyBand::Mhz433, 1)
        .with_network_id(77)
        .with_encryption_key("sampleEncryptKey");
    let (radio, hal) = start_with(config).await;
    radio.set_listen_durations(64, 4_100).await.unwrap();

    radio.listen_mode_send_burst(4, b"up").await.unwrap();

    assert_eq!(radio.mode().await.unwrap(), Some(Mode::Receive));
    assert_eq!(hal.register(REG_SYNCVALUE1), 0x2D);
    assert_eq!(hal.register(REG_SYNCVALUE2), 77);
    assert_eq!(hal.register(REG_FRFMSB), 0x6C);
    assert_eq!(hal.register(REG_BITRATEMSB), RF_BITRATEMSB_55555);
    assert_eq!(hal.register(REG_PALEVEL) & RF_PALEVEL_OUTPUTPOWER_MASK, 22);
    assert_eq!(&hal.aes_key(), b"sampleEncryptKey");
    assert_ne!(hal.register(REG_PACKETCONFIG2) & RF_PACKET2_AES_ON, 0);
    assert_eq!(hal.register(REG_DIOMAPPING1), RF_DIOMAPPING1_DIO0_01);
}

#[tokio::test]
async fn test_burst_then_normal_traffic() {
    let (radio, hal) = start_with(RadioConfig::new(FrequencyBand::Mhz915, 3)).await;
    radio.set_listen_durations(64, 4_100).await.unwrap();
    radio.set_listen_high_speed(false).await.unwrap();

    radio.listen_mode_send_burst(4, b"up").await.unwrap();
    hal.inject_frame(3, 4, 0x00, b"awake");

    let packet = radio
        .wait_for_packet(std::time::Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(packet.data_string(), "awake");
}
