//! # Driver Statistics and Log Throttling
//!
//! Counters for monitoring a running radio, and a small rate limiter used so a
//! misbehaving bus cannot flood the log from the receive task.

use std::time::Instant;

use serde::Serialize;

/// Packet and protocol counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RadioStats {
    /// Frames read out of the FIFO that passed the address filter
    pub frames_received: u64,
    /// Frames dropped by the address filter
    pub frames_ignored: u64,
    /// Data frames handed to the receive queue
    pub packets_queued: u64,
    /// Ack replies recorded in the pending ack set
    pub acks_received: u64,
    /// Ack replies transmitted by the receive path
    pub acks_sent: u64,
    /// Frames transmitted by `send`
    pub send_attempts: u64,
    /// Sends that ran out of attempts without an ack
    pub send_failures: u64,
    /// Errors raised while servicing an interrupt
    pub receive_errors: u64,
    /// Frames transmitted during listen mode bursts
    pub burst_frames: u64,
}

/// Log throttling to prevent log spam in production
#[derive(Debug)]
pub struct LogThrottle {
    window_ms: u64,
    cap: u32,
    count: u32,
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with window and message cap
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        self.count += 1;
        self.count <= self.cap
    }
}
