//! Upstream HTTP client
//!
//! Forwards a request body to the prediction service and hands back the
//! parsed JSON answer, or the reason it could not.

use super::error::UpstreamFailure;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::time::Duration;

/// Pooled client bound to a single upstream URL
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Full<Bytes>>,
    uri: Uri,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(uri: Uri, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            uri,
            timeout,
        }
    }

    /// POST `body` unchanged to the upstream and parse the reply as JSON.
    ///
    /// The whole exchange, including reading the response body, is bounded
    /// by the configured timeout.
    pub async fn forward(&self, body: Bytes) -> Result<Value, UpstreamFailure> {
        tokio::time::timeout(self.timeout, self.exchange(body))
            .await
            .unwrap_or(Err(UpstreamFailure::Timeout(self.timeout)))
    }

    async fn exchange(&self, body: Bytes) -> Result<Value, UpstreamFailure> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(UpstreamFailure::Build)?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(UpstreamFailure::Request)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamFailure::Status(status));
        }

        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(UpstreamFailure::Body)?
            .to_bytes();

        serde_json::from_slice(&bytes).map_err(UpstreamFailure::MalformedJson)
    }
}
