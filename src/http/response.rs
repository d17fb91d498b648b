//! HTTP response building module
//!
//! Provides builders for the JSON responses the relay emits. Builder
//! failures never panic; they are logged and replaced by a bare response.

use crate::config::HttpConfig;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, SERVER};
use hyper::{Response, StatusCode};
use serde_json::Value;

/// Methods accepted by the relay endpoint
pub const RELAY_ALLOW: &str = "POST, OPTIONS";

/// Methods accepted by the informational endpoints
pub const INFO_ALLOW: &str = "GET, HEAD, OPTIONS";

/// Build a JSON response from an already-parsed document
pub fn build_json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let json = match serde_json::to_vec(body) {
        Ok(j) => j,
        Err(e) => {
            crate::logger::log_error(&format!("Failed to serialize response: {e}"));
            return build_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build `{"error": message}` with the given status
pub fn build_error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Build 405 Method Not Allowed response
pub fn build_405_response(allow: &str) -> Response<Full<Bytes>> {
    let mut resp = build_error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    match HeaderValue::from_str(allow) {
        Ok(v) => {
            resp.headers_mut().insert("Allow", v);
        }
        Err(e) => crate::logger::log_error(&format!("Invalid Allow header '{allow}': {e}")),
    }
    resp
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool, allow: &str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(204).header("Allow", allow);

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Methods", allow)
            .header("Access-Control-Allow-Headers", "Content-Type")
            .header("Access-Control-Max-Age", "86400");
    }

    builder.body(Full::new(Bytes::new())).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build health check response
pub fn build_health_response(status: &str) -> Response<Full<Bytes>> {
    build_json_response(StatusCode::OK, &serde_json::json!({ "status": status }))
}

/// Stamp the headers every response carries: `Server`, plus CORS when enabled
pub fn apply_common_headers(resp: &mut Response<Full<Bytes>>, http: &HttpConfig) {
    let headers = resp.headers_mut();
    match HeaderValue::from_str(&http.server_name) {
        Ok(v) => {
            headers.insert(SERVER, v);
        }
        Err(e) => log_build_error("Server header", &hyper::http::Error::from(e)),
    }
    if http.enable_cors {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
