//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: body limits, route matching,
//! dispatch, common headers and access logging.

use crate::config::{AppState, HealthConfig};
use crate::handler::relay;
use crate::http;
use crate::http::response::{INFO_ALLOW, RELAY_ALLOW};
use crate::logger::{self, AccessLogEntry};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let access_log = state.config.logging.access_log;
    let entry = access_log.then(|| access_entry(&parts, peer_addr));

    let mut response = route_request(&parts, body, &state).await;
    http::apply_common_headers(&mut response, &state.config.http);

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Route request based on path and method
async fn route_request<B>(parts: &Parts, body: B, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let path = parts.uri.path();
    let method = &parts.method;
    let enable_cors = state.config.http.enable_cors;

    if path == relay::RELAY_PATH {
        return match *method {
            Method::POST => {
                let max_body_size = state.config.http.max_body_size;
                if let Some(resp) = check_body_size(parts, max_body_size) {
                    return resp;
                }
                match read_body(body, max_body_size).await {
                    Ok(bytes) => {
                        let content_type = parts
                            .headers
                            .get(hyper::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok());
                        relay::handle_recommend(bytes, content_type, state).await
                    }
                    Err(resp) => resp,
                }
            }
            Method::OPTIONS => http::build_options_response(enable_cors, RELAY_ALLOW),
            _ => method_not_allowed(method, path, RELAY_ALLOW),
        };
    }

    if path == "/" || is_health_path(path, &state.config.routes.health) {
        return match *method {
            Method::GET | Method::HEAD if path == "/" => http::build_json_response(
                StatusCode::OK,
                &serde_json::json!({ "message": state.config.http.banner }),
            ),
            // Readiness does not probe the upstream; the relay itself is up
            Method::GET | Method::HEAD => http::build_health_response("ok"),
            Method::OPTIONS => http::build_options_response(enable_cors, INFO_ALLOW),
            _ => method_not_allowed(method, path, INFO_ALLOW),
        };
    }

    if *method == Method::OPTIONS {
        return http::build_options_response(enable_cors, INFO_ALLOW);
    }
    http::build_404_response()
}

fn is_health_path(path: &str, health: &HealthConfig) -> bool {
    health.enabled && (path == health.liveness_path || path == health.readiness_path)
}

fn method_not_allowed(method: &Method, path: &str, allow: &str) -> Response<Full<Bytes>> {
    logger::log_warning(&format!("Method not allowed: {method} {path}"));
    http::build_405_response(allow)
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(parts: &Parts, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = parts.headers.get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Collect the body, enforcing the size limit while streaming
async fn read_body<B>(body: B, max_body_size: u64) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_error(&format!(
                "Request body exceeded {max_body_size} bytes while reading"
            ));
            Err(http::build_413_response())
        }
        Err(e) => {
            logger::log_error(&format!("Failed to read request body: {e}"));
            Err(http::build_error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ))
        }
    }
}

fn access_entry(parts: &Parts, peer_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(ToString::to_string);
    entry.http_version = match parts.version {
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry
}
