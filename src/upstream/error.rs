//! Upstream failure kind
//!
//! Every way an upstream call can go wrong collapses into [`UpstreamFailure`].
//! Callers only see the generic error body; the variant is kept for logging.

use hyper::StatusCode;
use std::fmt;
use std::time::Duration;

/// Failure while contacting the prediction service or reading its answer
#[derive(Debug)]
pub enum UpstreamFailure {
    /// Outbound request could not be built
    Build(hyper::http::Error),
    /// Connection refused, reset, or protocol error
    Request(hyper_util::client::legacy::Error),
    /// No complete response within the configured bound
    Timeout(Duration),
    /// Upstream answered with a non-2xx status
    Status(StatusCode),
    /// Response body could not be read
    Body(hyper::Error),
    /// Response body is not valid JSON
    MalformedJson(serde_json::Error),
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(e) => write!(f, "failed to build upstream request: {e}"),
            Self::Request(e) => write!(f, "upstream request failed: {e}"),
            Self::Timeout(d) => write!(f, "upstream timed out after {}ms", d.as_millis()),
            Self::Status(s) => write!(f, "upstream returned status {s}"),
            Self::Body(e) => write!(f, "failed to read upstream body: {e}"),
            Self::MalformedJson(e) => write!(f, "upstream body is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for UpstreamFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Build(e) => Some(e),
            Self::Request(e) => Some(e),
            Self::Body(e) => Some(e),
            Self::MalformedJson(e) => Some(e),
            Self::Timeout(_) | Self::Status(_) => None,
        }
    }
}
