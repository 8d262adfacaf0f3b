// Signal handling module
//
// SIGTERM and SIGINT (Ctrl+C) request a graceful shutdown: the server loop
// stops accepting and drains open connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::logger;

/// Shutdown request shared between the signal task and the server loop
#[derive(Debug, Default)]
pub struct SignalHandler {
    pub shutdown: Notify,
    shutdown_requested: AtomicBool,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        // notify_one stores a permit if the loop is not waiting yet
        self.shutdown.notify_one();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

/// Spawn the task translating process signals into a shutdown request
#[cfg(unix)]
pub fn start_signal_handler(handler: Arc<SignalHandler>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(err), _) | (_, Err(err)) => {
                    logger::log_error(&format!("Failed to register signal handlers: {err}"));
                    return;
                }
            };
        logger::log_debug(&format!(
            "[Signal] SIGTERM/SIGINT handlers registered for pid {}",
            std::process::id()
        ));

        tokio::select! {
            _ = sigterm.recv() => logger::log_info("[Signal] SIGTERM received"),
            _ = sigint.recv() => logger::log_info("[Signal] SIGINT received"),
        }
        handler.request_shutdown();
    });
}

/// Only Ctrl+C is available off Unix
#[cfg(not(unix))]
pub fn start_signal_handler(handler: Arc<SignalHandler>) {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            logger::log_info("[Signal] Ctrl+C received");
            handler.request_shutdown();
        }
    });
}
