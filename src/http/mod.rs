//! HTTP protocol layer module
//!
//! Request/response model, HTTP/1.x wire parsing and body parameter parsing,
//! decoupled from the connection handling and the modules.

pub mod body;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use parser::ParseError;
pub use request::{FormPart, Request};
pub use response::{HeaderError, Response, ResponseState};
