// Connection module
// Accepts a TCP connection and serves it on its own task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;

use crate::config::ServerContext;
use crate::connection::ConnectionHandler;
use crate::logger;
use crate::transport::Connection;

/// Admit a connection unless `performance.max_connections` is reached, then
/// serve it on a spawned task.
///
/// The counter is incremented before the limit check so concurrent accepts
/// cannot both slip under the limit.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: &ServerContext,
    conn_counter: &Arc<AtomicUsize>,
) {
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = server.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, server.clone(), Arc::clone(conn_counter));
}

fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: ServerContext,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let local_addr = stream.local_addr();
        let mut connection =
            Connection::new(stream, peer_addr).with_write_timeout(server.config.write_timeout());
        match local_addr {
            Ok(addr) => connection = connection.with_local_addr(addr),
            Err(err) => logger::log_connection_error(&err),
        }

        ConnectionHandler::new(server).handle(&mut connection).await;

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
