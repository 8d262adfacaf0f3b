//! HTTP/1.x request parser
//!
//! Wraps `httparse` for the start line and the raw header block read by the
//! connection handler. Every failure carries the status code to answer with.

use super::request::Request;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, StatusCode};
use thiserror::Error;

/// Header fields accepted in one request
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request line '{0}'")]
    BadStartLine(String),
    #[error("request line exceeds {0} bytes")]
    StartLineTooLong(usize),
    #[error("unsupported protocol version '{0}'")]
    UnsupportedVersion(String),
    #[error("malformed header block: {0}")]
    BadHeader(String),
    #[error("request header fields exceed {0} bytes")]
    HeadersTooLarge(usize),
    #[error("more than {0} request header fields")]
    TooManyHeaders(usize),
    #[error("invalid Content-Length '{0}'")]
    BadContentLength(String),
    #[error("request body of {size} bytes exceeds the limit of {max} bytes")]
    BodyTooLarge { size: u64, max: u64 },
    #[error("transfer-encoded request bodies are not supported")]
    UnsupportedTransferEncoding,
}

impl ParseError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadStartLine(_) | Self::BadHeader(_) | Self::BadContentLength(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::StartLineTooLong(_) => StatusCode::URI_TOO_LONG,
            Self::UnsupportedVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Self::HeadersTooLarge(_) | Self::TooManyHeaders(_) => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

/// Whether a raw line is the empty line terminating a header block
pub fn is_blank_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

/// Last of exactly three start line tokens, when it names some HTTP version
fn claimed_version(line: &[u8]) -> Option<String> {
    let mut tokens = line.trim_ascii_end().split(|b| *b == b' ');
    let token = tokens.nth(2)?;
    (tokens.next().is_none() && token.starts_with(b"HTTP/"))
        .then(|| String::from_utf8_lossy(token).into_owned())
}

/// Parse `METHOD SP request-target SP HTTP-version CRLF`.
///
/// A line without terminator was cut at `max_len` by the reader.
pub fn parse_start_line(line: &[u8], max_len: usize) -> Result<Request, ParseError> {
    if !line.ends_with(b"\n") {
        return Err(ParseError::StartLineTooLong(max_len));
    }
    let bad = || ParseError::BadStartLine(String::from_utf8_lossy(line.trim_ascii_end()).into_owned());

    // The start line followed by an empty header block
    let mut head = Vec::with_capacity(line.len() + 2);
    head.extend_from_slice(line);
    head.extend_from_slice(b"\r\n");

    let mut no_headers = [httparse::EMPTY_HEADER; 0];
    let mut parsed = httparse::Request::new(&mut no_headers);
    match parsed.parse(&head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(bad()),
        Err(httparse::Error::Version) => {
            return Err(claimed_version(line).map_or_else(bad, ParseError::UnsupportedVersion));
        }
        Err(_) => return Err(bad()),
    }

    let (Some(method), Some(path), Some(minor)) = (parsed.method, parsed.path, parsed.version) else {
        return Err(bad());
    };
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| bad())?;
    let version = if minor == 0 { "HTTP/1.0" } else { "HTTP/1.1" };
    Ok(Request::new(method, path, version))
}

/// Parse a raw header block (`Name: value` lines, without the terminating
/// empty line) into the request
pub fn parse_headers(raw: &[u8], request: &mut Request) -> Result<(), ParseError> {
    let mut block = Vec::with_capacity(raw.len() + 2);
    block.extend_from_slice(raw);
    block.extend_from_slice(b"\r\n");

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let parsed = match httparse::parse_headers(&block, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) => parsed,
        Ok(httparse::Status::Partial) => {
            return Err(ParseError::BadHeader("unterminated header block".to_string()));
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::TooManyHeaders(MAX_HEADERS)),
        Err(err) => return Err(ParseError::BadHeader(err.to_string())),
    };

    for header in parsed {
        let bad = || ParseError::BadHeader(format!("invalid field '{}'", header.name));
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| bad())?;
        // Values keep obs-text bytes as sent
        let value = HeaderValue::from_bytes(header.value.trim_ascii()).map_err(|_| bad())?;
        request.headers_mut().append(name, value);
    }
    Ok(())
}
