use super::record::ProtocolStatus;
use crate::module::ModuleError;
use hyper::StatusCode;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of a backend round trip
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to fastcgi backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("fastcgi backend i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("fastcgi backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("fastcgi protocol error: {0}")]
    Protocol(String),
    #[error("fastcgi backend refused the request: {0:?}")]
    Refused(ProtocolStatus),
    #[error("fastcgi response has no header terminator")]
    MissingHeaderTerminator,
    #[error("Unrecognizable status code returned from fastcgi: {0}")]
    UnrecognizableStatus(String),
}

impl GatewayError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<GatewayError> for ModuleError {
    fn from(err: GatewayError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}
