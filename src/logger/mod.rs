//! Logger module
//!
//! Provides logging utilities for the relay:
//! - Server lifecycle logging
//! - Relay diagnostics (payloads, predictions, upstream failures)
//! - Access logging with multiple formats
//! - Error and warning logging, optionally to files

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{Config, LogLevel};
use crate::upstream::UpstreamFailure;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
        config.logging.level,
    )
}

/// Lines pass until the writer is installed with a threshold
fn enabled(level: LogLevel) -> bool {
    writer::get().map_or(true, |w| w.enabled(level))
}

/// Write to info/access log
fn write_info(message: &str) {
    if !enabled(LogLevel::Info) {
        return;
    }
    write_access(message);
}

/// Write to access log, regardless of level
fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

/// Write to error log at the given severity
fn write_error(level: LogLevel, message: &str) {
    if !enabled(level) {
        return;
    }
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    write_info("======================================");
    write_info(&format!("Backend running on http://{addr}"));
    write_info(&format!("Relaying POST /api/recommend -> {}", config.upstream.url));
    write_info(&format!("Upstream timeout: {}ms", config.upstream.timeout_ms));
    write_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(max) = config.performance.max_connections {
        write_info(&format!("Max connections: {max}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_info(message: &str) {
    write_info(message);
}

pub fn log_debug(message: &str) {
    if enabled(LogLevel::Debug) {
        write_access(&format!("[DEBUG] {message}"));
    }
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    log_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(
        LogLevel::Error,
        &format!("[ERROR] Failed to serve connection: {err:?}"),
    );
}

pub fn log_error(message: &str) {
    write_error(LogLevel::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(LogLevel::Warn, &format!("[WARN] {message}"));
}

/// Inbound payload as received from the client
pub fn log_inbound_payload(body: &[u8]) {
    write_info(&format!(
        "[Relay] Received data from frontend: {}",
        String::from_utf8_lossy(body)
    ));
}

/// Prediction returned by the upstream
pub fn log_prediction(prediction: &serde_json::Value) {
    write_info(&format!("[Relay] Received prediction from AI: {prediction}"));
}

/// Upstream failure with its full cause chain
pub fn log_upstream_failure(err: &UpstreamFailure) {
    let mut message = format!("[Relay] Error connecting to AI model: {err}");
    // Display already renders the direct cause
    let mut source = std::error::Error::source(err).and_then(|e| e.source());
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    write_error(LogLevel::Error, &message);
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}
