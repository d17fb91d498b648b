//! Server module
//!
//! Listener creation, the accept loop, per-connection serving and
//! shutdown signals.

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module file is mapped to `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

// Re-export commonly used items
pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
