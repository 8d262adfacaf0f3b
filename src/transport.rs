//! Transport layer
//!
//! Wraps a client byte stream (TCP socket, or any `AsyncRead + AsyncWrite`
//! stream in tests) with the line-oriented read operations the connection
//! handler needs. Every read is bounded by a timeout.

use bytes::Bytes;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Failures of the underlying byte stream.
///
/// All of them abort the per-connection loop without a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection reset by peer")]
    Reset,
    #[error("transport failure: {0}")]
    Server(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::Reset,
            io::ErrorKind::TimedOut => Self::Timeout(Duration::ZERO),
            _ => Self::Server(err),
        }
    }
}

/// A client connection borrowed by the connection handler for its lifetime
pub struct Connection<S> {
    stream: BufReader<S>,
    peer_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    write_timeout: Duration,
    closed: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer_addr: SocketAddr) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer_addr,
            local_addr: None,
            write_timeout: Duration::from_secs(30),
            closed: false,
        }
    }

    #[must_use]
    pub const fn with_local_addr(mut self, local_addr: SocketAddr) -> Self {
        self.local_addr = Some(local_addr);
        self
    }

    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Remote IP address
    pub const fn address(&self) -> IpAddr {
        self.peer_addr.ip()
    }

    /// Remote port
    pub const fn port(&self) -> u16 {
        self.peer_addr.port()
    }

    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read one line including its terminator.
    ///
    /// Stops after `\n` or once `max_len` bytes were read, whichever comes
    /// first; the caller detects a truncated line by the missing terminator.
    /// End of stream before a terminator is reported as a reset.
    pub async fn read_line(
        &mut self,
        max_len: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        tokio::time::timeout(timeout, self.read_line_inner(max_len))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn read_line_inner(&mut self, max_len: Option<usize>) -> Result<Vec<u8>, TransportError> {
        let limit = max_len.unwrap_or(usize::MAX);
        let mut line = Vec::new();

        loop {
            let available = self.stream.fill_buf().await?;
            if available.is_empty() {
                return Err(TransportError::Reset);
            }

            let room = limit - line.len();
            let window = &available[..available.len().min(room)];
            let (taken, done) = match window.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (window.len(), line.len() + window.len() >= limit),
            };

            line.extend_from_slice(&window[..taken]);
            self.stream.consume(taken);

            if done {
                return Ok(line);
            }
        }
    }

    /// Read exactly `len` bytes (request body)
    pub async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(timeout, self.stream.read_exact(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(Bytes::from(buf))
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let timeout = self.write_timeout;
        tokio::time::timeout(timeout, self.stream.get_mut().write_all(data))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(())
    }

    /// Stream a body buffer to the peer
    pub async fn copy_stream(&mut self, body: &[u8]) -> Result<(), TransportError> {
        for chunk in body.chunks(64 * 1024) {
            self.write(chunk).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        let timeout = self.write_timeout;
        tokio::time::timeout(timeout, self.stream.get_mut().flush())
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(())
    }

    /// Shut down the write side; safe to call more than once
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Peer may already be gone
        let _ = self.stream.get_mut().shutdown().await;
    }
}
