//! # Radio Error Handling
//!
//! This module defines the RadioError enum, which represents the different error
//! types that can occur while driving the transceiver.

use std::time::Duration;

use thiserror::Error;

use crate::radio::hal::HalError;

/// Represents the different error types that can occur in the radio crate.
#[derive(Debug, Error)]
pub enum RadioError {
    /// The chip did not answer the sync handshake or never reported mode-ready
    /// while being brought up.
    #[error("Radio initialization timed out during {stage}")]
    InitializationTimeout { stage: &'static str },

    /// A bounded poll on a chip status flag expired.
    #[error("Timeout after {waited:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },

    /// A listen mode window does not fit any resolution/coefficient pair.
    #[error("Duration of {micros} us cannot be represented by any listen resolution")]
    UnrepresentableDuration { micros: u32 },

    /// Every send attempt went unacknowledged.
    #[error("No acknowledgement from node {to} after {attempts} attempt(s)")]
    SendFailed { to: u8, attempts: u32 },

    /// A caller-supplied value is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The bus or pin adapter failed.
    #[error("Bus error: {0}")]
    Bus(#[from] HalError),

    /// The driver has already been shut down.
    #[error("Radio has been shut down")]
    Shutdown,
}

impl RadioError {
    /// True for the errors produced by an expired bounded wait.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RadioError::Timeout { .. } | RadioError::InitializationTimeout { .. }
        )
    }
}
