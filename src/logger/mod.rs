//! Logger module
//!
//! Provides logging utilities for the gateway server:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error, warning and debug logging gated by `logging.level`
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::Level;

use crate::config::Config;
use std::net::SocketAddr;

/// Initialize the global writer from configuration.
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        Level::parse(&config.logging.level),
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

fn enabled(level: Level) -> bool {
    writer::get().map_or(level <= Level::Info, |w| level <= w.level())
}

fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

/// Sink for completed request records
pub trait AccessLogger: Send + Sync {
    fn info(&self, line: &str);
}

/// [`AccessLogger`] writing formatted lines to the global access target
#[derive(Debug, Clone, Default)]
pub struct WriterAccessLog;

impl AccessLogger for WriterAccessLog {
    fn info(&self, line: &str) {
        write_info(line);
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, modules: &[&str]) {
    write_info("======================================");
    write_info(&format!("{} started", config.server.software));
    write_info(&format!("Listening on: http://{addr}"));
    write_info(&format!("Document root: {}", config.server.document_root));
    write_info(&format!(
        "FastCGI backend: {}:{}",
        config.gateway.host, config.gateway.port
    ));
    write_info(&format!("Modules: {}", modules.join(", ")));
    write_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    if enabled(Level::Debug) {
        write_info(&format!("[Connection] Accepted from: {peer_addr}"));
    }
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    write_error(&format!("[ERROR] Failed to serve connection: {err}"));
}

pub fn log_info(message: &str) {
    if enabled(Level::Info) {
        write_info(message);
    }
}

pub fn log_debug(message: &str) {
    if enabled(Level::Debug) {
        write_info(&format!("[DEBUG] {message}"));
    }
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    if enabled(Level::Warn) {
        write_error(&format!("[WARN] {message}"));
    }
}

pub fn log_shutdown_started(active: usize) {
    write_info(&format!(
        "\n[Shutdown] Signal received, draining {active} connection(s)"
    ));
}

pub fn log_shutdown_complete(remaining: usize) {
    if remaining == 0 {
        write_info("[Shutdown] All connections closed");
    } else {
        log_warning(&format!(
            "[Shutdown] Drain deadline reached with {remaining} connection(s) open"
        ));
    }
}
