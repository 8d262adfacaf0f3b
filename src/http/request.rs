//! HTTP request model
//!
//! Holds the parsed start line, headers, body and parameters of one request.

use bytes::Bytes;
use std::borrow::Cow;
use hyper::header::{HeaderMap, HeaderName, AsHeaderName};
use hyper::Method;

/// One part of a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A parsed HTTP/1.x request
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    version: String,
    headers: HeaderMap,
    body: Bytes,
    params: Vec<(String, String)>,
    parts: Vec<FormPart>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Vec::new(),
            parts: Vec::new(),
        }
    }
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request target, query string included
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Request target without the query string
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }

    /// Query string without the leading `?` (empty when absent)
    pub fn query_string(&self) -> &str {
        self.uri.split_once('?').map_or("", |(_, query)| query)
    }

    /// Version token as sent, e.g. `HTTP/1.1`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool {
        self.headers.contains_key(name)
    }

    /// First value of a header as text, decoded lossily
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    /// All values of a header joined by `separator`.
    ///
    /// Bytes outside visible ASCII are decoded lossily rather than dropped.
    pub fn header_joined(&self, name: &HeaderName, separator: &str) -> Option<String> {
        let values: Vec<Cow<'_, str>> = self
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(separator))
        }
    }

    /// Body bytes, always readable from the start
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First parameter with the given name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add_params(&mut self, params: impl IntoIterator<Item = (String, String)>) {
        self.params.extend(params);
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn add_parts(&mut self, parts: impl IntoIterator<Item = FormPart>) {
        self.parts.extend(parts);
    }
}
