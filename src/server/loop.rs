// Server loop module
// Accepts connections until a shutdown is requested, then drains

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::signal::SignalHandler;
use crate::config::ServerContext;
use crate::logger;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept loop.
///
/// Returns after a shutdown request once every open connection has finished
/// or `drain_timeout` has passed, whichever is first.
pub async fn start_server_loop(
    listener: TcpListener,
    server: ServerContext,
    active_connections: Arc<AtomicUsize>,
    signals: Arc<SignalHandler>,
    drain_timeout: Duration,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &server, &active_connections);
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = signals.shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_shutdown_started(active_connections.load(Ordering::SeqCst));

    let deadline = tokio::time::Instant::now() + drain_timeout;
    while active_connections.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    logger::log_shutdown_complete(active_connections.load(Ordering::SeqCst));
}
