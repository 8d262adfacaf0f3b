//! Demultiplexing of the backend's STDOUT into status, headers and body

use super::error::GatewayError;
use crate::http::Response;
use crate::logger;
use bytes::Bytes;
use hyper::StatusCode;

/// Header value as parsed: repeated names accumulate into a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => {
                *self = Self::Multiple(vec![std::mem::take(first), value]);
            }
            Self::Multiple(values) => values.push(value),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Parsed CGI response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRawResponse {
    pub status_code: u16,
    /// `Status` line value, e.g. `404 Not Found`
    pub status: String,
    /// Lowercased names in first-seen order; always contains `status`
    pub headers: Vec<(String, FieldValue)>,
    pub body: Bytes,
}

const STATUS: &str = "status";

impl GatewayRawResponse {
    /// Split raw STDOUT at the first CRLFCRLF (LFLF accepted) and parse it
    pub fn parse(stdout: &[u8]) -> Result<Self, GatewayError> {
        let (head, body) = split_head(stdout).ok_or(GatewayError::MissingHeaderTerminator)?;
        let head = String::from_utf8_lossy(head);

        let mut code = "200".to_string();
        let mut status = "200 OK".to_string();
        let mut headers: Vec<(String, FieldValue)> = Vec::new();

        for line in head.split('\n') {
            let Some((name, value)) = parse_header_line(line) else {
                continue;
            };
            if name == STATUS {
                status.clone_from(&value);
                code = value
                    .split_once(' ')
                    .map_or(value.as_str(), |(c, _)| c)
                    .to_string();
            }
            match headers.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => existing.push(value),
                None => headers.push((name, FieldValue::Single(value))),
            }
        }

        // The status entry always carries the final status line
        match headers.iter_mut().find(|(n, _)| n == STATUS) {
            Some((_, existing)) => *existing = FieldValue::Single(status.clone()),
            None => headers.push((STATUS.to_string(), FieldValue::Single(status.clone()))),
        }

        let status_code = code
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| code.parse::<u16>().ok())
            .flatten()
            .filter(|c| StatusCode::from_u16(*c).is_ok())
            .ok_or_else(|| GatewayError::UnrecognizableStatus(code.clone()))?;

        Ok(Self {
            status_code,
            status,
            headers,
            body: Bytes::copy_from_slice(body.trim_ascii()),
        })
    }

    pub fn header(&self, name: &str) -> Option<&FieldValue> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Copy status, body and headers onto the client response.
    ///
    /// The `status` pseudo-header only drives the status line. Values that are
    /// not valid header text are dropped with a warning.
    pub fn apply_to(&self, response: &mut Response) -> Result<(), GatewayError> {
        if response.set_status_line(&self.status).is_err() {
            let status = StatusCode::from_u16(self.status_code)
                .map_err(|_| GatewayError::UnrecognizableStatus(self.status_code.to_string()))?;
            response.set_status(status);
        }
        response.append_body(&self.body);

        for (name, value) in &self.headers {
            if name == STATUS {
                continue;
            }
            let result = match value {
                FieldValue::Single(v) => response.add_header(name, v, false),
                FieldValue::Multiple(values) => values
                    .iter()
                    .try_for_each(|v| response.add_header(name, v, true)),
            };
            if let Err(err) = result {
                logger::log_warning(&format!("Dropping backend header: {err}"));
            }
        }
        Ok(())
    }
}

fn split_head(stdout: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(stdout, b"\r\n\r\n") {
        return Some((&stdout[..pos], &stdout[pos + 4..]));
    }
    find(stdout, b"\n\n").map(|pos| (&stdout[..pos], &stdout[pos + 2..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// `name: value` where the name is the run of word characters and `-` right
/// before a colon; the name is lowercased and the value trimmed
fn parse_header_line(line: &str) -> Option<(String, String)> {
    line.match_indices(':').find_map(|(colon, _)| {
        let before = &line[..colon];
        let start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_name_char(*c))
            .last()
            .map(|(i, _)| i)?;
        let name = before[start..].to_ascii_lowercase();
        let value = line[colon + 1..].trim().to_string();
        Some((name, value))
    })
}
