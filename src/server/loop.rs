// Server loop module
// Accepts connections until shutdown, then drains live connections

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::{accept_connection, ConnectionTracker};
use super::signal::SignalHandler;
use crate::config::AppState;
use crate::logger;

/// Run the accept loop on `listener` until `signals` requests shutdown.
///
/// After shutdown the listener is closed at once; live connections get
/// `performance.shutdown_grace` seconds to finish their current request.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    signals: Arc<SignalHandler>,
) -> std::io::Result<()> {
    let tracker = Arc::new(ConnectionTracker::default());

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &tracker, &signals);
                    }
                    Err(e) => {
                        // Per-connection failures (e.g. reset before accept) keep the loop alive
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = signals.wait() => break,
        }
    }

    drop(listener);
    logger::log_shutdown_started(tracker.active());

    let grace = Duration::from_secs(state.config.performance.shutdown_grace);
    if tokio::time::timeout(grace, tracker.wait_idle()).await.is_err() {
        logger::log_debug("Shutdown grace period elapsed");
    }
    logger::log_shutdown_finished(tracker.active());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::create_listener;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn raw_request(addr: std::net::SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn test_serves_over_tcp_and_shuts_down() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>Digital Book</h1>").unwrap();
        let mut state = AppState::for_root(dir.path());
        state.config.logging.access_log = false;
        state.config.performance.shutdown_grace = 1;

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let signals = Arc::new(SignalHandler::new());
        let server = tokio::spawn(start_server_loop(
            listener,
            Arc::new(state),
            Arc::clone(&signals),
        ));

        let resp = raw_request(
            addr,
            "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
        assert!(resp.contains("access-control-allow-origin: *\r\n"), "{resp}");
        assert!(resp.ends_with("<h1>Digital Book</h1>"), "{resp}");

        let resp = raw_request(
            addr,
            "GET /../../etc/passwd HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(resp.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{resp}");
        assert!(!resp.contains("root:"), "{resp}");

        signals.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
