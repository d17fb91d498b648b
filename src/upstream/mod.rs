//! Upstream module
//!
//! Outbound side of the relay: the pooled HTTP client that talks to the
//! prediction service and the single error kind its calls can produce.

mod client;
mod error;

pub use client::UpstreamClient;
pub use error::UpstreamFailure;
