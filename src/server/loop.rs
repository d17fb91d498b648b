// Server loop module
// Accepts connections until shutdown is requested, then drains in-flight ones

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// How long in-flight connections get to finish after shutdown is requested
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Main accept loop. Must run inside a `LocalSet`.
#[allow(clippy::ignored_unit_patterns)]
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            _ = shutdown.notified() => {
                logger::log_info("[SHUTDOWN] No longer accepting connections");
                break;
            }
        }
    }

    drop(listener);
    drain_connections(&active_connections, DRAIN_GRACE).await;
    Ok(())
}

/// Wait until every connection task has released its slot, or `grace` passes
async fn drain_connections(active: &AtomicUsize, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;

    loop {
        let remaining = active.load(Ordering::SeqCst);
        if remaining == 0 {
            logger::log_info("[SHUTDOWN] All connections closed");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutdown grace period elapsed with {remaining} connection(s) still open"
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::create_reusable_listener;
    use crate::testutil::{spawn_upstream, test_state};
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::{Method, Request, StatusCode};
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;

    fn relay_request(addr: std::net::SocketAddr, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(format!("http://{addr}/api/recommend"))
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_relays_over_tcp_and_shuts_down() {
        let upstream = spawn_upstream(StatusCode::OK, r#"{"prediction":"A"}"#, Duration::ZERO).await;
        let state = Arc::new(test_state(&format!("http://{}/predict", upstream.addr)));
        let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server =
                    tokio::task::spawn_local(start_server_loop(listener, state, Arc::clone(&shutdown)));

                let client = Client::builder(TokioExecutor::new()).build_http();
                let resp = client
                    .request(relay_request(addr, r#"{"features":[1,2,3]}"#))
                    .await
                    .unwrap();
                assert_eq!(resp.status(), StatusCode::OK);
                let body = resp.into_body().collect().await.unwrap().to_bytes();
                assert_eq!(&body[..], br#"{"prediction":"A"}"#);
                drop(client);

                shutdown.notify_one();
                let result = tokio::time::timeout(Duration::from_secs(10), server)
                    .await
                    .unwrap()
                    .unwrap();
                assert!(result.is_ok());
            })
            .await;
    }

    #[tokio::test]
    async fn test_rejects_over_connection_limit() {
        let mut state = test_state("http://127.0.0.1:5001/predict");
        state.config.performance.max_connections = Some(0);
        let state = Arc::new(state);
        let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                tokio::task::spawn_local(start_server_loop(listener, state, Arc::clone(&shutdown)));

                let client = Client::builder(TokioExecutor::new()).build_http();
                let result = client.request(relay_request(addr, "{}")).await;
                assert!(result.is_err());

                shutdown.notify_one();
            })
            .await;
    }

    #[tokio::test]
    async fn test_drain_returns_when_idle() {
        let active = AtomicUsize::new(0);
        tokio::time::timeout(
            Duration::from_secs(1),
            drain_connections(&active, Duration::from_secs(30)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_grace() {
        let active = AtomicUsize::new(2);
        drain_connections(&active, Duration::from_millis(200)).await;
        assert_eq!(active.load(Ordering::SeqCst), 2);
    }
}
