//! Connection handling
//!
//! One [`ConnectionHandler`] serves all requests of a client connection:
//! parsing, module phases, error pages, keep-alive and fatal-error recovery.

pub mod error_page;
mod handler;
mod keep_alive;
mod shutdown;

pub use handler::{ConnectionHandler, HandlerError};
pub use keep_alive::KeepAlive;
pub use shutdown::{apply_anti_cache_headers, apply_flushed_headers, FatalError, FlushedHeaders, Worker};
