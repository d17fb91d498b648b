//! Relay handler
//!
//! Forwards the inbound JSON body to the prediction service and answers
//! with its JSON, or with the generic model error when anything upstream
//! goes wrong.

use crate::config::AppState;
use crate::http;
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

/// Path of the relay endpoint
pub const RELAY_PATH: &str = "/api/recommend";

/// Body message returned for every upstream failure
pub const MODEL_ERROR: &str = "AI model error";

/// Body message returned when the inbound body is not JSON
pub const INVALID_JSON: &str = "Invalid JSON body";

/// Handle `POST /api/recommend` with an already-collected body
pub async fn handle_recommend(
    body: Bytes,
    content_type: Option<&str>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let payload = match prepare_payload(content_type, body) {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!("Rejecting non-JSON request body: {e}"));
            return http::build_error_response(StatusCode::BAD_REQUEST, INVALID_JSON);
        }
    };

    let log_payloads = state.config.logging.log_payloads;
    if log_payloads {
        logger::log_inbound_payload(&payload);
    }

    match state.upstream.forward(payload).await {
        Ok(prediction) => {
            if log_payloads {
                logger::log_prediction(&prediction);
            }
            http::build_json_response(StatusCode::OK, &prediction)
        }
        Err(err) => {
            logger::log_upstream_failure(&err);
            http::build_error_response(StatusCode::INTERNAL_SERVER_ERROR, MODEL_ERROR)
        }
    }
}

/// Decide what goes upstream, following strict JSON body-parser rules.
///
/// - a body not declared as `application/json`, or an empty one, becomes `{}`
/// - the top-level value must be an object or array
/// - otherwise the inbound bytes are forwarded untouched once they parse
///
/// No field is looked at.
fn prepare_payload(content_type: Option<&str>, body: Bytes) -> Result<Bytes, serde_json::Error> {
    if !is_json_content_type(content_type) || body.is_empty() {
        return Ok(Bytes::from_static(b"{}"));
    }

    match body.iter().copied().find(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
        Some(b'{' | b'[') => {}
        _ => {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "top-level value must be an object or array",
            ))
        }
    }

    serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;
    Ok(body)
}

/// `application/json`, any case, parameters ignored
fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}
