//! FastCGI responder client
//!
//! One request per backend connection: BEGIN_REQUEST, PARAMS, STDIN, then read
//! STDOUT and STDERR until END_REQUEST.

use super::environment::FastCgiEnvironment;
use super::error::GatewayError;
use super::record::{self, ProtocolStatus, RecordHeader, RecordType, HEADER_LEN};
use crate::logger;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend address plus the bound on a whole round trip
#[derive(Debug, Clone)]
pub struct FastCgiClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl FastCgiClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn connect(&self) -> Result<FastCgiConnection<TcpStream>, GatewayError> {
        let addr = self.address();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| GatewayError::Connect {
                addr: addr.clone(),
                source,
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            logger::log_warning(&format!("[FastCGI] Cannot set TCP_NODELAY on {addr}: {err}"));
        }
        Ok(FastCgiConnection::new(stream))
    }

    /// Connect and run one request, the whole exchange bounded by the timeout
    pub async fn execute(
        &self,
        env: FastCgiEnvironment,
        body: Bytes,
    ) -> Result<FastCgiResponse, GatewayError> {
        let exchange = async {
            let mut connection = self.connect().await?;
            let request = connection.new_request(env, body);
            connection.request(request).await
        };
        timeout(self.timeout, exchange)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
    }
}

/// A prepared request bound to a request id
#[derive(Debug, Clone)]
pub struct FastCgiRequest {
    id: u16,
    env: FastCgiEnvironment,
    stdin: Bytes,
}

impl FastCgiRequest {
    pub const fn id(&self) -> u16 {
        self.id
    }

    pub const fn env(&self) -> &FastCgiEnvironment {
        &self.env
    }

    /// All records of the request, ready to write
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        record::put_begin_request(&mut buf, self.id);
        record::put_stream(&mut buf, RecordType::Params, self.id, &self.env.encode());
        record::put_stream(&mut buf, RecordType::Stdin, self.id, &self.stdin);
        buf
    }
}

/// Output of a completed request
#[derive(Debug, Clone, Default)]
pub struct FastCgiResponse {
    /// Raw STDOUT: CGI headers, blank line, body
    pub content: Bytes,
    /// Raw STDERR
    pub errors: Bytes,
    pub app_status: u32,
}

pub struct FastCgiConnection<S> {
    stream: S,
    next_id: u16,
}

impl<S> FastCgiConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub const fn new(stream: S) -> Self {
        Self { stream, next_id: 1 }
    }

    pub fn new_request(&mut self, env: FastCgiEnvironment, stdin: Bytes) -> FastCgiRequest {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        FastCgiRequest { id, env, stdin }
    }

    pub async fn request(&mut self, request: FastCgiRequest) -> Result<FastCgiResponse, GatewayError> {
        self.stream.write_all(&request.encode()).await?;
        self.stream.flush().await?;

        let mut content = BytesMut::new();
        let mut errors = BytesMut::new();
        let mut header = [0u8; HEADER_LEN];

        loop {
            if let Err(err) = self.stream.read_exact(&mut header).await {
                return Err(eof_as_protocol(err));
            }
            let header = RecordHeader::parse(&header)
                .ok_or_else(|| GatewayError::Protocol("short record header".to_string()))?;
            if header.version != record::VERSION_1 {
                return Err(GatewayError::Protocol(format!(
                    "unsupported record version {}",
                    header.version
                )));
            }

            let mut body = vec![0u8; header.body_len()];
            if let Err(err) = self.stream.read_exact(&mut body).await {
                return Err(eof_as_protocol(err));
            }
            body.truncate(usize::from(header.content_length));

            if header.request_id != request.id {
                continue;
            }

            match header.record_type {
                RecordType::Stdout => content.extend_from_slice(&body),
                RecordType::Stderr => errors.extend_from_slice(&body),
                RecordType::EndRequest => {
                    let (app_status, protocol_status) = record::parse_end_request(&body)
                        .ok_or_else(|| {
                            GatewayError::Protocol("truncated END_REQUEST body".to_string())
                        })?;
                    if protocol_status != ProtocolStatus::RequestComplete {
                        return Err(GatewayError::Refused(protocol_status));
                    }
                    return Ok(FastCgiResponse {
                        content: content.freeze(),
                        errors: errors.freeze(),
                        app_status,
                    });
                }
                _ => {}
            }
        }
    }
}

fn eof_as_protocol(err: io::Error) -> GatewayError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        GatewayError::Protocol("backend closed the connection before END_REQUEST".to_string())
    } else {
        GatewayError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tokio::io::duplex;

    fn stdout_record(buf: &mut BytesMut, id: u16, data: &[u8]) {
        record::put_stream(buf, RecordType::Stdout, id, data);
    }

    fn end_request(buf: &mut BytesMut, id: u16, protocol_status: u8) {
        buf.put_slice(&[1, 3]);
        buf.put_u16(id);
        buf.put_u16(8);
        buf.put_slice(&[0, 0]);
        buf.put_slice(&[0, 0, 0, 0, protocol_status, 0, 0, 0]);
    }

    /// Read the full request from the client side and return its records
    async fn read_request(server: &mut tokio::io::DuplexStream) -> Vec<RecordHeader> {
        let mut headers = Vec::new();
        let mut stdin_done = false;
        while !stdin_done {
            let mut raw = [0u8; HEADER_LEN];
            server.read_exact(&mut raw).await.unwrap();
            let header = RecordHeader::parse(&raw).unwrap();
            let mut body = vec![0u8; header.body_len()];
            server.read_exact(&mut body).await.unwrap();
            stdin_done = header.record_type == RecordType::Stdin && header.content_length == 0;
            headers.push(header);
        }
        headers
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (client, mut server) = duplex(1 << 20);
        let backend = tokio::spawn(async move {
            let records = read_request(&mut server).await;
            let mut reply = BytesMut::new();
            // Stray record for another request id
            stdout_record(&mut reply, 9, b"ignored");
            stdout_record(&mut reply, 1, b"Content-Type: text/plain\r\n\r\nok");
            record::put_stream(&mut reply, RecordType::Stderr, 1, b"notice");
            end_request(&mut reply, 1, 0);
            server.write_all(&reply).await.unwrap();
            records
        });

        let mut connection = FastCgiConnection::new(client);
        let env: FastCgiEnvironment = [("REQUEST_METHOD", "POST")].into_iter().collect();
        let request = connection.new_request(env, Bytes::from_static(b"a=1"));
        let response = connection.request(request).await.unwrap();

        assert_eq!(&response.content[..], b"Content-Type: text/plain\r\n\r\nok");
        assert_eq!(&response.errors[..], b"notice");

        let records = backend.await.unwrap();
        let types: Vec<RecordType> = records.iter().map(|r| r.record_type).collect();
        assert_eq!(
            types,
            vec![
                RecordType::BeginRequest,
                RecordType::Params,
                RecordType::Params,
                RecordType::Stdin,
                RecordType::Stdin,
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_before_end_request() {
        let (client, mut server) = duplex(1 << 20);
        tokio::spawn(async move {
            read_request(&mut server).await;
            let mut reply = BytesMut::new();
            stdout_record(&mut reply, 1, b"partial");
            server.write_all(&reply).await.unwrap();
        });

        let mut connection = FastCgiConnection::new(client);
        let request = connection.new_request(FastCgiEnvironment::new(), Bytes::new());
        let err = connection.request(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_refused_request() {
        let (client, mut server) = duplex(1 << 20);
        tokio::spawn(async move {
            read_request(&mut server).await;
            let mut reply = BytesMut::new();
            end_request(&mut reply, 1, 2);
            server.write_all(&reply).await.unwrap();
        });

        let mut connection = FastCgiConnection::new(client);
        let request = connection.new_request(FastCgiEnvironment::new(), Bytes::new());
        let err = connection.request(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Refused(ProtocolStatus::Overloaded)));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = FastCgiClient::new("127.0.0.1", port);
        let err = client
            .execute(FastCgiEnvironment::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connect { .. }));
    }
}
