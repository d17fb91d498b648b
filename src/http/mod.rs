//! HTTP protocol layer module
//!
//! Provides response builders shared by the router and the relay handler,
//! decoupled from routing decisions.

pub mod response;

// Re-export commonly used types
pub use response::{
    apply_common_headers, build_404_response, build_405_response, build_413_response,
    build_error_response, build_health_response, build_json_response, build_options_response,
};
