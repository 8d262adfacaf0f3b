//! Fatal-error recovery collaborators

use crate::http::Response;
use crate::logger;
use hyper::header::{HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use std::any::Any;
use thiserror::Error;

/// Process hosting the connection; told to recycle itself after a fatal error
pub trait Worker: Send + Sync {
    fn shutdown(&self);
}

/// Headers already emitted by the failing code path, re-applied on recovery
pub trait FlushedHeaders: Send + Sync {
    /// Raw `Name: value` lines
    fn flushed_headers(&self) -> Vec<String>;
}

/// A panic captured while a request cycle was running
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FatalError {
    pub message: String,
}

impl FatalError {
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown fatal error".to_string());
        Self {
            message: format!("Fatal error: {message}"),
        }
    }
}

/// Keep error output of a failed script out of caches
pub fn apply_anti_cache_headers(response: &mut Response) {
    response.insert_header(EXPIRES, HeaderValue::from_static("19 Nov 1981 08:52:00 GMT"));
    response.insert_header(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, post-check=0, pre-check=0"),
    );
    response.insert_header(PRAGMA, HeaderValue::from_static("no-cache"));
}

/// Apply `Name: value` lines; `Status` sets the status line instead of a header
pub fn apply_flushed_headers(response: &mut Response, lines: &[String]) {
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        let result = if name.eq_ignore_ascii_case("status") {
            response.set_status_line(value)
        } else {
            response.add_header(name, value, false)
        };
        if let Err(err) = result {
            logger::log_warning(&format!("Ignoring flushed header '{line}': {err}"));
        }
    }
}
