//! Unit tests for the logging helpers in the `rfm69-radio` crate.

use rfm69_radio::logging::{
    init_logger, init_logger_with_level, log_debug, log_error, log_info, log_packet, log_warn,
};
use rfm69_radio::ReceivedPacket;

/// Tests that the logging helpers do not panic, with or without a logger.
#[test]
fn test_logging() {
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
    log_packet(&ReceivedPacket::new(1, 2, -60, b"hello".to_vec()));
}

/// Tests that repeated initialization is harmless.
#[test]
fn test_init_logger() {
    init_logger();
    init_logger();
    // A logger is already installed by now
    assert!(init_logger_with_level("debug").is_err());
}
