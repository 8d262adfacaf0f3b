//! FastCGI/1 record layout
//!
//! Every record is an 8-byte header followed by at most 65535 content bytes and
//! padding up to an 8-byte boundary.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const VERSION_1: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const MAX_CONTENT_LEN: usize = 0xffff;

/// Record types used by a responder exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
    Other(u8),
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            other => Self::Other(other),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::BeginRequest => 1,
            RecordType::AbortRequest => 2,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Stderr => 7,
            RecordType::Data => 8,
            RecordType::GetValues => 9,
            RecordType::GetValuesResult => 10,
            RecordType::UnknownType => 11,
            RecordType::Other(other) => other,
        }
    }
}

pub const ROLE_RESPONDER: u16 = 1;

/// `protocolStatus` of an END_REQUEST body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    RequestComplete,
    CantMultiplexConnections,
    Overloaded,
    UnknownRole,
    Other(u8),
}

impl From<u8> for ProtocolStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::RequestComplete,
            1 => Self::CantMultiplexConnections,
            2 => Self::Overloaded,
            3 => Self::UnknownRole,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u8,
    pub record_type: RecordType,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
}

impl RecordHeader {
    pub fn parse(mut raw: &[u8]) -> Option<Self> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        let version = raw.get_u8();
        let record_type = RecordType::from(raw.get_u8());
        let request_id = raw.get_u16();
        let content_length = raw.get_u16();
        let padding_length = raw.get_u8();
        Some(Self {
            version,
            record_type,
            request_id,
            content_length,
            padding_length,
        })
    }

    /// Content plus padding that follows the header
    pub fn body_len(&self) -> usize {
        usize::from(self.content_length) + usize::from(self.padding_length)
    }
}

/// Append one record; `content` must not exceed [`MAX_CONTENT_LEN`]
fn put_record(buf: &mut BytesMut, record_type: RecordType, request_id: u16, content: &[u8]) {
    let content_length = u16::try_from(content.len()).unwrap_or(u16::MAX);
    let padding = (8 - content.len() % 8) % 8;

    buf.put_u8(VERSION_1);
    buf.put_u8(record_type.into());
    buf.put_u16(request_id);
    buf.put_u16(content_length);
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(padding as u8);
    buf.put_u8(0);
    buf.put_slice(&content[..usize::from(content_length)]);
    buf.put_bytes(0, padding);
}

/// BEGIN_REQUEST for the responder role; flags 0 so the backend closes the
/// connection when done
pub fn put_begin_request(buf: &mut BytesMut, request_id: u16) {
    let mut body = [0u8; 8];
    body[..2].copy_from_slice(&ROLE_RESPONDER.to_be_bytes());
    put_record(buf, RecordType::BeginRequest, request_id, &body);
}

/// Split a stream into records and terminate it with an empty record
pub fn put_stream(buf: &mut BytesMut, record_type: RecordType, request_id: u16, data: &[u8]) {
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        put_record(buf, record_type, request_id, chunk);
    }
    put_record(buf, record_type, request_id, &[]);
}

fn put_length(buf: &mut BytesMut, len: usize) {
    if len > 127 {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(len as u32 | 0x8000_0000);
    } else {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(len as u8);
    }
}

/// Encode one name-value pair (1-byte lengths up to 127, else 4-byte)
pub fn encode_name_value(buf: &mut BytesMut, name: &[u8], value: &[u8]) {
    put_length(buf, name.len());
    put_length(buf, value.len());
    buf.put_slice(name);
    buf.put_slice(value);
}

fn get_length(buf: &mut &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    if first & 0x80 == 0 {
        buf.advance(1);
        Some(usize::from(first))
    } else {
        if buf.len() < 4 {
            return None;
        }
        usize::try_from(buf.get_u32() & 0x7fff_ffff).ok()
    }
}

/// Decode a block of name-value pairs; `None` on truncation
pub fn decode_name_values(mut buf: &[u8]) -> Option<Vec<(Bytes, Bytes)>> {
    let mut pairs = Vec::new();
    while !buf.is_empty() {
        let name_len = get_length(&mut buf)?;
        let value_len = get_length(&mut buf)?;
        if buf.len() < name_len + value_len {
            return None;
        }
        let name = Bytes::copy_from_slice(&buf[..name_len]);
        let value = Bytes::copy_from_slice(&buf[name_len..name_len + value_len]);
        buf.advance(name_len + value_len);
        pairs.push((name, value));
    }
    Some(pairs)
}

/// END_REQUEST body: application status and protocol status
pub fn parse_end_request(mut body: &[u8]) -> Option<(u32, ProtocolStatus)> {
    if body.len() < 5 {
        return None;
    }
    let app_status = body.get_u32();
    let protocol_status = ProtocolStatus::from(body.get_u8());
    Some((app_status, protocol_status))
}
