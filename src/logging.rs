use log::{debug, error, info, log_enabled, warn, Level};

use crate::radio::frame::ReceivedPacket;

/// Initializes the logger with the `env_logger` crate.
///
/// Honors `RUST_LOG`; does nothing if a logger is already installed.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Initializes the logger with `level` as the default filter.
///
/// `RUST_LOG` still takes precedence when set.
pub fn init_logger_with_level(level: &str) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init()
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

/// Logs a received packet at info level.
pub fn log_packet(packet: &ReceivedPacket) {
    if log_enabled!(Level::Info) {
        info!(
            "Packet from node {} to {} ({} dBm): {:?}",
            packet.sender,
            packet.target,
            packet.rssi,
            packet.data_string()
        );
    }
}
