//! Test helpers: a throwaway prediction service on a loopback port

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::{AppState, Config};

/// A request as the mock upstream saw it
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Serve `body` with `status` to every request after waiting `delay`
pub async fn spawn_upstream(status: StatusCode, body: &'static str, delay: Duration) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let content_type = req
                            .headers()
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .map(ToString::to_string);
                        let received = req.into_body().collect().await.unwrap().to_bytes();
                        recorder.lock().unwrap().push(SeenRequest {
                            method,
                            path,
                            content_type,
                            body: received,
                        });
                        tokio::time::sleep(delay).await;
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header("Content-Type", "application/json")
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    MockUpstream { addr, seen }
}

/// A loopback address nothing is listening on
pub fn unreachable_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// State with default config, relaying to `upstream_url`
pub fn test_state(upstream_url: &str) -> AppState {
    let mut cfg = Config::load_with(config::File::from_str("", config::FileFormat::Toml)).unwrap();
    cfg.upstream.url = upstream_url.to_string();
    cfg.upstream.timeout_ms = 2_000;
    cfg.logging.access_log = false;
    AppState::new(&cfg).unwrap()
}

/// Collect a response body and parse it as JSON
pub async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
