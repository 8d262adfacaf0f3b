//! Embeddable HTTP/1.x server core with a FastCGI gateway.
//!
//! A [`connection::ConnectionHandler`] reads requests off a client
//! [`transport::Connection`], runs them through the [`module::ModulePipeline`]
//! phase by phase and writes the responses back. The built-in modules in
//! [`modules`] map requests onto the document root, serve static files and
//! forward scripts to a FastCGI backend.

pub mod config;
pub mod connection;
pub mod context;
pub mod http;
pub mod logger;
pub mod module;
pub mod modules;
pub mod server;
pub mod transport;
