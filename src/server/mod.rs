// Server module entry point
// Listener setup, accept loop, per-connection tasks and signal handling

pub mod connection;
pub mod listener;
pub mod signal;
pub mod worker;

// `loop` is a keyword, so the file is mounted under another name
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
pub use signal::{start_signal_handler, SignalHandler};
pub use worker::TaskWorker;
