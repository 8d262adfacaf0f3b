//! HTTP response model and serialization
//!
//! The response is fully buffered; the connection handler writes the status
//! line, the header block and the body in that order.

use crate::logger;
use bytes::BytesMut;
use hyper::header::{
    AsHeaderName, HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, DATE, TRANSFER_ENCODING,
};
use hyper::StatusCode;
use thiserror::Error;

/// Whether a module has fully produced the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    #[default]
    Pending,
    Dispatched,
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("invalid header name '{0}'")]
    InvalidName(String),
    #[error("invalid value for header '{0}'")]
    InvalidValue(String),
    #[error("invalid status line '{0}'")]
    InvalidStatus(String),
}

/// A buffered HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    body: BytesMut,
    state: ResponseState,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            state: ResponseState::Pending,
        }
    }
}

impl Response {
    /// Create a response pre-populated with default headers.
    ///
    /// Defaults that are not valid header text are skipped with a warning.
    pub fn with_default_headers(defaults: &[(String, String)]) -> Self {
        let mut response = Self::default();
        for (name, value) in defaults {
            if let Err(err) = response.add_header(name, value, false) {
                logger::log_warning(&format!("Ignoring default header '{name}': {err}"));
            }
        }
        response
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the status code and reset the reason phrase to the canonical one
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.reason = None;
    }

    /// Set status code and custom reason phrase from a status line value such
    /// as `404 Not Found` or `299`
    pub fn set_status_line(&mut self, line: &str) -> Result<(), HeaderError> {
        let line = line.trim();
        let (code, reason) = line.split_once(' ').unwrap_or((line, ""));
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| HeaderError::InvalidStatus(line.to_string()))?;
        self.status = status;
        let reason = reason.trim();
        self.reason = (!reason.is_empty()).then(|| reason.to_string());
        Ok(())
    }

    /// Reason phrase: custom when set, else the canonical one
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("Unknown")
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool {
        self.headers.contains_key(name)
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace all values of a header
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Add one more value for a header (e.g. `Set-Cookie`)
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Add a header from text, replacing (`append == false`) or appending
    pub fn add_header(&mut self, name: &str, value: &str, append: bool) -> Result<(), HeaderError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HeaderError::InvalidName(name.to_string()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| HeaderError::InvalidValue(name.to_string()))?;
        if append {
            self.append_header(header_name, header_value);
        } else {
            self.insert_header(header_name, header_value);
        }
        Ok(())
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) {
        self.headers.remove(name);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    pub const fn state(&self) -> ResponseState {
        self.state
    }

    pub fn set_state(&mut self, state: ResponseState) {
        self.state = state;
    }

    pub fn is_dispatched(&self) -> bool {
        self.state == ResponseState::Dispatched
    }

    /// Finalize headers for delivery: `Date`, identity framing and `Content-Length`
    pub fn prepare_headers(&mut self) {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        if let Ok(value) = HeaderValue::from_str(&date) {
            self.headers.insert(DATE, value);
        }
        // The body is sent in one piece
        self.headers.remove(TRANSFER_ENCODING);
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
    }

    /// `HTTP/1.1 <code> <reason>\r\n`
    pub fn status_line(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.reason_phrase()
        )
    }

    /// Header block terminated by the empty line; repeated headers become one
    /// line per value
    pub fn header_string(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(&canonical_header_name(name.as_str()));
            out.push_str(": ");
            out.push_str(&String::from_utf8_lossy(value.as_bytes()));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }

    /// Whether the body goes on the wire for this status
    pub fn allows_body(&self) -> bool {
        !(self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED)
    }
}

/// `set-cookie` → `Set-Cookie`
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper = c == '-';
    }
    out
}
