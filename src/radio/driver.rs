//! # RFM69 Packet Radio Driver
//!
//! [`Radio`] is the application-facing handle. It brings the chip up, keeps it
//! listening, and runs a background task that services DIO0 interrupts:
//! frames addressed to this node are queued for the application, ack replies
//! are recorded for waiting senders, and ack requests are answered
//! automatically when auto-acknowledge is on.
//!
//! ## Concurrency
//!
//! All register traffic goes through one async mutex around the chip, so a
//! frame read can never interleave with a transmission. The interrupt callback
//! only pushes an event into a bounded channel; the receive task does the bus
//! work. A sender waiting for its ack does not hold the chip lock, leaving the
//! receive task free to pick the ack up.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rfm69_radio::{FrequencyBand, MockHal, Radio, RadioConfig, SendOptions};
//!
//! # async fn demo() -> Result<(), rfm69_radio::RadioError> {
//! let config = RadioConfig::new(FrequencyBand::Mhz433, 1).with_network_id(100);
//! let radio = Radio::new(MockHal::new(), config).await?;
//!
//! let outcome = radio.send(2, b"hello", SendOptions::default()).await?;
//! println!("{:?}", outcome);
//!
//! for packet in radio.get_packets() {
//!     println!("{} from node {}", packet.data_string(), packet.sender);
//! }
//! radio.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::error::RadioError;
use crate::radio::chip::Chip;
use crate::radio::config::{EncryptionKey, FrequencyBand, RadioConfig, TimingConfig};
use crate::radio::frame::{ControlFlags, FrameKind, ReceivedPacket};
use crate::radio::hal::{Hal, InterruptEvent};
use crate::radio::listen::ListenTiming;
use crate::radio::mode::Mode;
use crate::radio::registers::BROADCAST_ADDRESS;
use crate::radio::stats::{LogThrottle, RadioStats};

const INTERRUPT_QUEUE_DEPTH: usize = 8;
const CSMA_POLL_INTERVAL: Duration = Duration::from_millis(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Retry and acknowledgement policy for [`Radio::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Transmissions before giving up, at least 1
    pub attempts: u32,
    /// How long each attempt waits for the ack
    pub wait: Duration,
    /// Ask the receiver to acknowledge; forced on when `attempts > 1`
    pub require_ack: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            wait: Duration::from_millis(50),
            require_ack: true,
        }
    }
}

impl SendOptions {
    /// One transmission, no ack requested
    pub fn fire_and_forget() -> Self {
        Self {
            attempts: 1,
            wait: Duration::ZERO,
            require_ack: false,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_require_ack(mut self, require_ack: bool) -> Self {
        self.require_ack = require_ack;
        self
    }
}

/// Result of a completed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The receiver acknowledged on attempt `attempts`
    Acknowledged { attempts: u32 },
    /// No ack was requested
    NotRequested,
    /// Every attempt went unacknowledged
    NoAck { attempts: u32 },
}

impl SendOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, SendOutcome::Acknowledged { .. })
    }

    /// Turn [`SendOutcome::NoAck`] into [`RadioError::SendFailed`]
    pub fn into_result(self, to: u8) -> Result<Self, RadioError> {
        match self {
            SendOutcome::NoAck { attempts } => Err(RadioError::SendFailed { to, attempts }),
            other => Ok(other),
        }
    }
}

/// State shared between the handle and the receive task
struct Shared<H: Hal> {
    chip: Mutex<Chip<H>>,
    packets: StdMutex<VecDeque<ReceivedPacket>>,
    packet_arrived: Notify,
    acks: StdMutex<HashSet<u8>>,
    auto_acknowledge: AtomicBool,
    promiscuous: AtomicBool,
    closed: AtomicBool,
    stats: StdMutex<RadioStats>,
    error_throttle: StdMutex<LogThrottle>,
    timing: TimingConfig,
}

impl<H: Hal> Shared<H> {
    async fn chip(&self) -> Result<MutexGuard<'_, Chip<H>>, RadioError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RadioError::Shutdown);
        }
        let chip = self.chip.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(RadioError::Shutdown);
        }
        Ok(chip)
    }

    /// Service one DIO0 edge
    async fn handle_interrupt(&self) -> Result<(), RadioError> {
        let mut chip = self.chip().await?;
        if !chip.payload_ready()? {
            trace!("Interrupt without payload in RX, ignoring");
            return Ok(());
        }
        let owed = self.service_payload(&mut chip).await?;
        chip.begin_receive().await?;
        self.send_owed_acks(&mut chip, owed.into_iter().collect())
            .await
    }

    /// Read the waiting frame and route it.
    ///
    /// Returns the sender when an ack reply is owed; the caller transmits it
    /// once the current operation has released the FIFO.
    async fn service_payload(&self, chip: &mut Chip<H>) -> Result<Option<u8>, RadioError> {
        let promiscuous = self.promiscuous.load(Ordering::Relaxed);
        let Some(frame) = chip.read_frame(promiscuous).await? else {
            lock(&self.stats).frames_ignored += 1;
            return Ok(None);
        };
        lock(&self.stats).frames_received += 1;

        let header = frame.header;
        match header.kind() {
            FrameKind::AckReply => {
                debug!("Incoming ack from node {}", header.sender);
                lock(&self.acks).insert(header.sender);
                lock(&self.stats).acks_received += 1;
                Ok(None)
            }
            kind => {
                debug!(
                    "Incoming packet from node {}: {} bytes, RSSI {} dBm",
                    header.sender,
                    frame.data.len(),
                    frame.rssi
                );
                let packet =
                    ReceivedPacket::new(header.target, header.sender, frame.rssi, frame.data);
                lock(&self.packets).push_back(packet);
                lock(&self.stats).packets_queued += 1;
                self.packet_arrived.notify_one();

                let owed = kind == FrameKind::AckRequest
                    && self.auto_acknowledge.load(Ordering::Relaxed);
                Ok(owed.then_some(header.sender))
            }
        }
    }

    /// Drain a frame that is already waiting, then poll the channel until it
    /// is clear or the CSMA limit passes. Transmits anyway after the limit.
    async fn wait_for_clear_channel(
        &self,
        chip: &mut Chip<H>,
        owed: &mut VecDeque<u8>,
    ) -> Result<(), RadioError> {
        let limit = self.timing.csma_limit();
        let start = Instant::now();
        loop {
            if chip.payload_ready()? {
                owed.extend(self.service_payload(chip).await?);
                chip.begin_receive().await?;
            }
            if chip.can_send().await? {
                return Ok(());
            }
            if start.elapsed() >= limit {
                warn!("Channel busy for {:?}, transmitting anyway", limit);
                return Ok(());
            }
            sleep(CSMA_POLL_INTERVAL).await;
        }
    }

    /// CSMA gate followed by one frame, then any acks owed along the way
    async fn transmit(
        &self,
        chip: &mut Chip<H>,
        to: u8,
        payload: &[u8],
        control: ControlFlags,
        restart_rx: bool,
    ) -> Result<(), RadioError> {
        let mut owed = VecDeque::new();
        if restart_rx {
            if chip.payload_ready()? {
                owed.extend(self.service_payload(chip).await?);
                chip.begin_receive().await?;
            }
            chip.restart_rx()?;
        }
        self.wait_for_clear_channel(chip, &mut owed).await?;
        chip.transmit_frame(to, payload, control).await?;
        self.send_owed_acks(chip, owed).await
    }

    async fn send_owed_acks(
        &self,
        chip: &mut Chip<H>,
        mut owed: VecDeque<u8>,
    ) -> Result<(), RadioError> {
        while let Some(to) = owed.pop_front() {
            self.wait_for_clear_channel(chip, &mut owed).await?;
            chip.transmit_frame(to, &[], ControlFlags::ACK_REPLY).await?;
            lock(&self.stats).acks_sent += 1;
            debug!("Ack sent to node {}", to);
        }
        Ok(())
    }

    /// Consume a recorded ack from `from`
    fn take_ack(&self, from: u8) -> bool {
        lock(&self.acks).remove(&from)
    }

    /// Poll the ack set until `wait` has passed. The chip lock is not held.
    async fn wait_for_ack(&self, from: u8, wait: Duration) -> bool {
        let poll = self.timing.ack_poll_interval();
        let deadline = Instant::now() + wait;
        loop {
            if self.take_ack(from) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(poll.min(deadline - now)).await;
        }
    }
}

/// Receive loop driven by interrupt events
async fn receive_task<H: Hal + 'static>(
    shared: Arc<Shared<H>>,
    mut events: mpsc::Receiver<InterruptEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!("Interrupt handler task started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                trace!("DIO0 edge handled after {:?}", event.at.elapsed());
                match shared.handle_interrupt().await {
                    Ok(()) => {}
                    Err(RadioError::Shutdown) => break,
                    Err(e) => {
                        lock(&shared.stats).receive_errors += 1;
                        // Throttled error logging for bus failures
                        if lock(&shared.error_throttle).allow() {
                            error!("Interrupt handling failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    info!("Interrupt handler task shutting down");
}

/// Handle to a running RFM69
pub struct Radio<H: Hal + 'static> {
    shared: Arc<Shared<H>>,
    receive_task: StdMutex<Option<JoinHandle<()>>>,
    shutdown_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl<H: Hal + 'static> Radio<H> {
    /// Bring the chip up and start listening.
    ///
    /// Runs the reset and sync handshake, loads the register table, applies
    /// AES and output power, calibrates the RC oscillator and enters RX. Fails
    /// without leaving a handle if any step fails.
    pub async fn new(hal: H, config: RadioConfig) -> Result<Self, RadioError> {
        config.validate()?;
        let key = config.encryption_key()?;

        let mut chip = Chip::new(hal, &config)?;
        chip.initialize().await?;
        chip.encrypt(key).await?;
        chip.set_power_level(config.power_percent)?;

        let temperature = chip.read_temperature(0).await?;
        debug!("Chip temperature at start-up: {} °C", temperature);
        chip.calibrate_rc_oscillator().await?;

        let (irq_tx, irq_rx) = mpsc::channel(INTERRUPT_QUEUE_DEPTH);
        chip.hal.enable_interrupt(irq_tx)?;
        chip.begin_receive().await?;

        let shared = Arc::new(Shared {
            chip: Mutex::new(chip),
            packets: StdMutex::new(VecDeque::new()),
            packet_arrived: Notify::new(),
            acks: StdMutex::new(HashSet::new()),
            auto_acknowledge: AtomicBool::new(config.auto_acknowledge),
            promiscuous: AtomicBool::new(config.promiscuous),
            closed: AtomicBool::new(false),
            stats: StdMutex::new(RadioStats::default()),
            error_throttle: StdMutex::new(LogThrottle::new(60_000, 10)),
            timing: config.timing.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(receive_task(Arc::clone(&shared), irq_rx, shutdown_rx));

        info!(
            "RFM69 ready: node {} on network {} at {} MHz",
            config.node_id, config.network_id, config.frequency_band
        );
        Ok(Self {
            shared,
            receive_task: StdMutex::new(Some(handle)),
            shutdown_tx: StdMutex::new(Some(shutdown_tx)),
        })
    }

    /// Send `payload` to node `to`.
    ///
    /// Each attempt waits for a clear channel, transmits, and then waits up to
    /// `options.wait` for the ack. Payloads beyond 61 bytes are truncated.
    pub async fn send(
        &self,
        to: u8,
        payload: &[u8],
        options: SendOptions,
    ) -> Result<SendOutcome, RadioError> {
        if options.attempts == 0 {
            return Err(RadioError::InvalidParameter(
                "send needs at least one attempt".to_string(),
            ));
        }
        let require_ack = options.require_ack || options.attempts > 1;
        let control = ControlFlags::outbound(require_ack, false);

        for attempt in 1..=options.attempts {
            {
                let mut chip = self.shared.chip().await?;
                self.shared
                    .transmit(&mut chip, to, payload, control, true)
                    .await?;
            }
            lock(&self.shared.stats).send_attempts += 1;

            if !require_ack {
                return Ok(SendOutcome::NotRequested);
            }
            if self.shared.wait_for_ack(to, options.wait).await {
                debug!("Ack from node {} on attempt {}", to, attempt);
                return Ok(SendOutcome::Acknowledged { attempts: attempt });
            }
            debug!(
                "No ack from node {} on attempt {}/{}",
                to, attempt, options.attempts
            );
        }

        lock(&self.shared.stats).send_failures += 1;
        Ok(SendOutcome::NoAck {
            attempts: options.attempts,
        })
    }

    /// Send to every node without requesting acks
    pub async fn broadcast(&self, payload: &[u8]) -> Result<SendOutcome, RadioError> {
        self.send(BROADCAST_ADDRESS, payload, SendOptions::fire_and_forget())
            .await
    }

    /// Transmit an ack reply to `to`, optionally carrying a payload
    pub async fn send_ack(&self, to: u8, payload: &[u8]) -> Result<(), RadioError> {
        let mut chip = self.shared.chip().await?;
        self.shared
            .transmit(&mut chip, to, payload, ControlFlags::ACK_REPLY, false)
            .await?;
        lock(&self.shared.stats).acks_sent += 1;
        Ok(())
    }

    pub fn has_received_packet(&self) -> bool {
        !lock(&self.shared.packets).is_empty()
    }

    /// Oldest queued packet
    pub fn get_packet(&self) -> Option<ReceivedPacket> {
        lock(&self.shared.packets).pop_front()
    }

    /// Every queued packet, oldest first
    pub fn get_packets(&self) -> Vec<ReceivedPacket> {
        lock(&self.shared.packets).drain(..).collect()
    }

    /// Wait up to `limit` for the next packet
    pub async fn wait_for_packet(&self, limit: Duration) -> Option<ReceivedPacket> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if let Some(packet) = self.get_packet() {
                return Some(packet);
            }
            let notified = self.shared.packet_arrived.notified();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if timeout(remaining, notified).await.is_err() {
                return self.get_packet();
            }
        }
    }

    /// Last commanded mode
    pub async fn mode(&self) -> Result<Option<Mode>, RadioError> {
        Ok(self.shared.chip().await?.mode)
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<(), RadioError> {
        self.shared.chip().await?.set_mode(mode).await
    }

    pub async fn sleep(&self) -> Result<(), RadioError> {
        self.set_mode(Mode::Sleep).await
    }

    /// Map DIO0 to payload-ready and enter RX
    pub async fn begin_receive(&self) -> Result<(), RadioError> {
        self.shared.chip().await?.begin_receive().await
    }

    /// Program a raw 24-bit frequency word (Fstep = 61.035 Hz)
    pub async fn set_frequency(&self, frf: u32) -> Result<(), RadioError> {
        self.shared.chip().await?.set_frequency(frf)
    }

    /// Move to the centre frequency of another band
    pub async fn set_frequency_band(&self, band: FrequencyBand) -> Result<(), RadioError> {
        let mut chip = self.shared.chip().await?;
        chip.set_frequency(band.frf())?;
        chip.band = band;
        Ok(())
    }

    pub async fn set_network(&self, network_id: u8) -> Result<(), RadioError> {
        self.shared.chip().await?.set_network(network_id)
    }

    pub async fn set_address(&self, address: u8) -> Result<(), RadioError> {
        self.shared.chip().await?.set_address(address)
    }

    pub async fn address(&self) -> Result<u8, RadioError> {
        Ok(self.shared.chip().await?.address)
    }

    pub async fn network_id(&self) -> Result<u8, RadioError> {
        Ok(self.shared.chip().await?.network_id)
    }

    /// Set output power in percent; returns the 5-bit code written
    pub async fn set_power_level(&self, percent: u8) -> Result<u8, RadioError> {
        self.shared.chip().await?.set_power_level(percent)
    }

    pub async fn set_high_power(&self, on: bool) -> Result<(), RadioError> {
        self.shared.chip().await?.set_high_power(on)
    }

    /// Load a new AES key (16 characters or 32 hex digits), or disable AES
    pub async fn set_encryption_key(&self, key: Option<&str>) -> Result<(), RadioError> {
        let key = key.map(EncryptionKey::parse).transpose()?;
        let mut chip = self.shared.chip().await?;
        let previous = chip.mode;
        chip.encrypt(key).await?;
        if previous == Some(Mode::Receive) {
            chip.begin_receive().await?;
        }
        Ok(())
    }

    pub fn set_promiscuous(&self, on: bool) {
        self.shared.promiscuous.store(on, Ordering::Relaxed);
    }

    pub fn set_auto_acknowledge(&self, on: bool) {
        self.shared.auto_acknowledge.store(on, Ordering::Relaxed);
    }

    /// Signal strength in dBm; `force` triggers a fresh measurement
    pub async fn read_rssi(&self, force: bool) -> Result<i16, RadioError> {
        self.shared.chip().await?.read_rssi(force).await
    }

    /// Die temperature in °C plus `calibration`. Resumes RX if it was active.
    pub async fn read_temperature(&self, calibration: i16) -> Result<i16, RadioError> {
        let mut chip = self.shared.chip().await?;
        let previous = chip.mode;
        let temperature = chip.read_temperature(calibration).await?;
        if previous == Some(Mode::Receive) {
            chip.begin_receive().await?;
        }
        Ok(temperature)
    }

    /// Calibrate the RC oscillator used by listen mode timing
    pub async fn calibrate_radio(&self) -> Result<(), RadioError> {
        self.shared.chip().await?.calibrate_rc_oscillator().await
    }

    /// Address/value pairs for registers 0x01..=0x4F
    pub async fn read_registers(&self) -> Result<Vec<(u8, u8)>, RadioError> {
        self.shared.chip().await?.read_registers()
    }

    /// Set the listen cycle a receiving node uses; returns the realized
    /// `(rx_us, idle_us)`. Unrepresentable durations leave the old cycle.
    pub async fn set_listen_durations(
        &self,
        rx_us: u32,
        idle_us: u32,
    ) -> Result<(u32, u32), RadioError> {
        let timing = ListenTiming::new(rx_us, idle_us)?;
        self.shared.chip().await?.listen = timing;
        Ok((timing.rx_duration_us(), timing.idle_duration_us()))
    }

    pub async fn listen_durations(&self) -> Result<(u32, u32), RadioError> {
        let chip = self.shared.chip().await?;
        Ok((chip.listen.rx_duration_us(), chip.listen.idle_duration_us()))
    }

    /// Use 200 kbps bursts instead of the normal bit rate
    pub async fn set_listen_high_speed(&self, on: bool) -> Result<(), RadioError> {
        self.shared.chip().await?.listen_high_speed = on;
        Ok(())
    }

    /// Wake a node in listen mode by repeating `payload` for one full cycle.
    ///
    /// The chip is re-initialized afterwards and resumes RX. Returns the number
    /// of frames sent.
    pub async fn listen_mode_send_burst(&self, to: u8, payload: &[u8]) -> Result<u64, RadioError> {
        let mut chip = self.shared.chip().await?;
        let frames = chip.send_listen_burst(to, payload).await?;
        chip.begin_receive().await?;
        lock(&self.shared.stats).burst_frames += frames;
        Ok(frames)
    }

    pub fn stats(&self) -> RadioStats {
        lock(&self.shared.stats).clone()
    }

    /// Stop the receive task, drop to low power sleep and release the pins.
    ///
    /// Later operations fail with [`RadioError::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), RadioError> {
        info!("Shutting down RFM69 driver");

        if let Some(shutdown_tx) = lock(&self.shutdown_tx).take() {
            if shutdown_tx.send(()).is_err() {
                warn!("Failed to send shutdown signal - task may have already exited");
            }
        }

        // Wait for task to complete gracefully
        let handle = lock(&self.receive_task).take();
        if let Some(handle) = handle {
            if let Err(e) = timeout(SHUTDOWN_GRACE, handle).await {
                warn!("Interrupt task did not shutdown gracefully: {}", e);
            }
        }

        let mut chip = self.shared.chip.lock().await;
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = chip.set_high_power(false) {
            warn!("Failed to disable PA boost during shutdown: {}", e);
        }
        if let Err(e) = chip.set_mode(Mode::Sleep).await {
            warn!("Failed to put radio to sleep during shutdown: {}", e);
        }
        chip.hal.release()?;

        info!("RFM69 driver shutdown completed");
        Ok(())
    }
}

impl<H: Hal + 'static> Drop for Radio<H> {
    fn drop(&mut self) {
        // Send shutdown signal first
        let shutdown_tx = self
            .shutdown_tx
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(shutdown_tx) = shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        // Then abort the task if it doesn't shutdown gracefully
        let handle = self
            .receive_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome_result() {
        assert!(SendOutcome::Acknowledged { attempts: 2 }
            .into_result(4)
            .is_ok());
        assert!(SendOutcome::NotRequested.into_result(4).is_ok());
        assert!(matches!(
            SendOutcome::NoAck { attempts: 3 }.into_result(4),
            Err(RadioError::SendFailed { to: 4, attempts: 3 })
        ));
    }

    #[test]
    fn test_send_options() {
        let defaults = SendOptions::default();
        assert_eq!(defaults.attempts, 3);
        assert_eq!(defaults.wait, Duration::from_millis(50));
        assert!(defaults.require_ack);

        let once = SendOptions::fire_and_forget();
        assert_eq!(once.attempts, 1);
        assert!(!once.require_ack);
    }
}
