//! Shared fixtures for the integration tests
#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use rust_gateway_server::config::{Config, ServerContext};
use rust_gateway_server::connection::ConnectionHandler;
use rust_gateway_server::modules::fastcgi::record::{self, RecordHeader, RecordType, HEADER_LEN};
use rust_gateway_server::transport::Connection;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const PEER: &str = "203.0.113.7:51234";

pub fn config(toml: &str) -> Config {
    Config::from_toml_str(toml).unwrap()
}

/// Fresh document root under the temp dir
pub fn docroot(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("gw-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    root
}

/// Serve `input` on an in-memory connection and return everything written
/// back until the handler closes it
pub async fn exchange(server: ServerContext, input: &[u8]) -> Vec<u8> {
    let (mut client, server_side) = duplex(1 << 20);
    let task = tokio::spawn(async move {
        let mut connection = Connection::new(server_side, PEER.parse().unwrap());
        ConnectionHandler::new(server).handle(&mut connection).await;
    });

    client.write_all(input).await.unwrap();
    let mut output = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), client.read_to_end(&mut output))
        .await
        .unwrap()
        .unwrap();
    task.await.unwrap();
    output
}

/// Split a byte stream of pipelined responses into (head, body) pairs using
/// their `Content-Length`
pub fn split_responses(mut raw: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    while let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        let head = String::from_utf8_lossy(&raw[..end]).to_string();
        let length = header(&head, "content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = end + 4;
        let body_end = (body_start + length).min(raw.len());
        out.push((head, raw[body_start..body_end].to_vec()));
        raw = &raw[body_end..];
    }
    out
}

/// First value of a header in a raw response head
pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    headers(head, name).into_iter().next()
}

pub fn headers<'a>(head: &'a str, name: &str) -> Vec<&'a str> {
    head.lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .collect()
}

/// What the mock backend saw of one request
#[derive(Debug, Default)]
pub struct BackendRequest {
    pub params: BTreeMap<String, String>,
    pub stdin: Vec<u8>,
}

/// FastCGI responder on a loopback port answering one request with `stdout`
pub async fn spawn_backend(stdout: &'static [u8]) -> (SocketAddr, JoinHandle<BackendRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = BackendRequest::default();
        let mut params = Vec::new();
        let mut request_id = 1;

        loop {
            let mut raw = [0u8; HEADER_LEN];
            stream.read_exact(&mut raw).await.unwrap();
            let header = RecordHeader::parse(&raw).unwrap();
            let mut body = vec![0u8; header.body_len()];
            stream.read_exact(&mut body).await.unwrap();
            let content = &body[..usize::from(header.content_length)];

            match header.record_type {
                RecordType::BeginRequest => request_id = header.request_id,
                RecordType::Params => params.extend_from_slice(content),
                RecordType::Stdin if content.is_empty() => break,
                RecordType::Stdin => seen.stdin.extend_from_slice(content),
                _ => {}
            }
        }

        for (name, value) in record::decode_name_values(&params).unwrap() {
            seen.params.insert(
                String::from_utf8_lossy(&name).to_string(),
                String::from_utf8_lossy(&value).to_string(),
            );
        }

        let mut reply = BytesMut::new();
        record::put_stream(&mut reply, RecordType::Stdout, request_id, stdout);
        reply.put_slice(&[1, 3]);
        reply.put_u16(request_id);
        reply.put_u16(8);
        reply.put_slice(&[0, 0]);
        reply.put_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        stream.write_all(&reply).await.unwrap();
        seen
    });

    (addr, task)
}
