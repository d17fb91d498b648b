//! Request handler module
//!
//! Responsible for request routing dispatch and the relay itself.

pub mod relay;
pub mod router;

// Re-export main entry point
pub use router::handle_request;
