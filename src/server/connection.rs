//! Connection handling module
//!
//! Accepts a single TCP connection and serves it with the request router.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept a connection unless the configured limit is reached, in which
/// case it is dropped straight away.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
) {
    // Increment first, then compare, so two accepts cannot both slip under the limit
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    serve_connection(stream, peer_addr, Arc::clone(state), Arc::clone(conn_counter));
}

/// Serve one connection on the current `LocalSet`.
///
/// Only reading a request head is time-bounded. A request that is being
/// relayed always runs to its answer, which the upstream timeout caps.
/// The counter is released when the connection ends, however it ends.
fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(state.config.header_read_timeout())
            .keep_alive(state.config.performance.keep_alive_timeout > 0);

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let state = Arc::clone(&service_state);
                async move { handler::handle_request(req, state, peer_addr).await }
            }),
        );

        match conn.await {
            Ok(()) => {}
            Err(err) if err.is_timeout() => logger::log_debug(&format!(
                "Connection from {peer_addr} closed: no request head within {}s",
                state.config.performance.read_timeout
            )),
            Err(err) => logger::log_connection_error(&err),
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{spawn_upstream, test_state};
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::{Method, Request, StatusCode};
    use std::time::Duration;

    fn recommend(body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/recommend")
            .header("host", "127.0.0.1")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_late_keep_alive_request_still_answered() {
        // Each relay takes 700ms, so the second one ends well past the 1s read bound
        let upstream = spawn_upstream(
            StatusCode::OK,
            r#"{"prediction":"A"}"#,
            Duration::from_millis(700),
        )
        .await;
        let mut state = test_state(&format!("http://{}/predict", upstream.addr));
        state.config.performance.read_timeout = 1;
        let state = Arc::new(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_counter = Arc::clone(&counter);
                tokio::task::spawn_local(async move {
                    let (stream, peer) = listener.accept().await.unwrap();
                    accept_connection(stream, peer, &state, &server_counter);
                });

                let stream = TcpStream::connect(addr).await.unwrap();
                let (mut sender, conn) =
                    hyper::client::conn::http1::handshake(TokioIo::new(stream))
                        .await
                        .unwrap();
                tokio::task::spawn_local(conn);

                for i in 0..2 {
                    let resp = sender.send_request(recommend("{}")).await.unwrap();
                    assert_eq!(resp.status(), StatusCode::OK, "request {i}");
                    let body = resp.into_body().collect().await.unwrap().to_bytes();
                    assert_eq!(&body[..], br#"{"prediction":"A"}"#, "request {i}");
                }
                assert_eq!(upstream.requests().len(), 2);
                assert_eq!(counter.load(Ordering::SeqCst), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_idle_connection_released() {
        let mut state = test_state("http://127.0.0.1:5001/predict");
        state.config.performance.read_timeout = 1;
        let state = Arc::new(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_counter = Arc::clone(&counter);
                tokio::task::spawn_local(async move {
                    let (stream, peer) = listener.accept().await.unwrap();
                    accept_connection(stream, peer, &state, &server_counter);
                });

                // Connect and never send a request head
                let _idle = TcpStream::connect(addr).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1500)).await;
                assert_eq!(counter.load(Ordering::SeqCst), 0);
            })
            .await;
    }
}
