//! Access log line formatting
//!
//! `combined`, `common` and `json` are built in; any other format string is a
//! pattern with `$variable` substitution.

use chrono::{DateTime, Local};
use serde::Serialize;

const CLF_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One completed request cycle as seen by the access log
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub remote_addr: String,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Local>,
    pub method: String,
    /// Request target as sent, query string included
    pub uri: String,
    /// Version token as sent, e.g. `HTTP/1.1`
    pub version: String,
    pub status: u16,
    /// `Content-Length` of the response; `-` when unknown
    pub content_length: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub request_time_us: u64,
}

fn serialize_time<S: serde::Serializer>(time: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&time.to_rfc3339())
}

impl AccessLogEntry {
    pub fn new(remote_addr: impl Into<String>, method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            time: Local::now(),
            method: method.into(),
            uri: uri.into(),
            version: "HTTP/1.1".to_string(),
            status: 200,
            content_length: None,
            referer: None,
            user_agent: None,
            request_time_us: 0,
        }
    }

    pub fn format(&self, format: &str) -> String {
        match format {
            "combined" => self.format_combined(),
            "common" => self.format_common(),
            "json" => self.format_json(),
            custom => self.format_custom(custom),
        }
    }

    fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.uri, self.version)
    }

    fn length(&self) -> &str {
        self.content_length.as_deref().unwrap_or("-")
    }

    /// `$remote_addr - - [$time_local] "$request" $status $content_length "$http_referer" "$http_user_agent"`
    fn format_combined(&self) -> String {
        format!(
            "{} \"{}\" \"{}\"",
            self.format_common(),
            self.referer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }

    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{}\" {} {}",
            self.remote_addr,
            self.time.format(CLF_TIME),
            self.request_line(),
            self.status,
            self.length(),
        )
    }

    fn format_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Supported variables: `$remote_addr`, `$time_local`, `$time_iso8601`,
    /// `$request`, `$request_method`, `$request_uri`, `$request_time`,
    /// `$status`, `$content_length`, `$http_referer`, `$http_user_agent`
    fn format_custom(&self, pattern: &str) -> String {
        #[allow(clippy::cast_precision_loss)]
        let request_time = self.request_time_us as f64 / 1_000_000.0;

        // Longer names first: `$request_time` before `$request`
        pattern
            .replace("$remote_addr", &self.remote_addr)
            .replace("$time_local", &self.time.format(CLF_TIME).to_string())
            .replace("$time_iso8601", &self.time.to_rfc3339())
            .replace("$request_time", &format!("{request_time:.3}"))
            .replace("$request_method", &self.method)
            .replace("$request_uri", &self.uri)
            .replace("$request", &self.request_line())
            .replace("$status", &self.status.to_string())
            .replace("$content_length", self.length())
            .replace("$http_referer", self.referer.as_deref().unwrap_or("-"))
            .replace("$http_user_agent", self.user_agent.as_deref().unwrap_or("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new("192.168.1.1", "GET", "/index.php?page=1");
        entry.version = "HTTP/1.0".to_string();
        entry.status = 404;
        entry.content_length = Some("1234".to_string());
        entry.referer = Some("https://example.com".to_string());
        entry.user_agent = Some("Mozilla/5.0".to_string());
        entry.request_time_us = 1_250_000;
        entry
    }

    #[test]
    fn test_format_combined() {
        let log = entry().format("combined");
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(log.contains("\"GET /index.php?page=1 HTTP/1.0\" 404 1234"));
        assert!(log.ends_with("\"https://example.com\" \"Mozilla/5.0\""));
    }

    #[test]
    fn test_missing_values_print_dash() {
        let mut entry = entry();
        entry.content_length = None;
        entry.referer = None;
        entry.user_agent = None;
        let log = entry.format("combined");
        assert!(log.ends_with("404 - \"-\" \"-\""));
    }

    #[test]
    fn test_format_common() {
        let log = entry().format("common");
        assert!(log.ends_with("\"GET /index.php?page=1 HTTP/1.0\" 404 1234"));
        assert!(!log.contains("https://example.com"));
    }

    #[test]
    fn test_format_json() {
        let log = entry().format("json");
        let value: serde_json::Value = serde_json::from_str(&log).unwrap();
        assert_eq!(value["remote_addr"], "192.168.1.1");
        assert_eq!(value["uri"], "/index.php?page=1");
        assert_eq!(value["status"], 404);
        assert_eq!(value["content_length"], "1234");
    }

    #[test]
    fn test_format_custom() {
        let log = entry().format("$remote_addr $request_method $status $request_time");
        assert_eq!(log, "192.168.1.1 GET 404 1.250");
    }
}
