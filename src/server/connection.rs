// Connection handling module
// Accepts a TCP connection, enforces the connection limit and serves it with hyper

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::sync::Notify;

use super::signal::SignalHandler;
use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Counts live connections so shutdown can wait for them
#[derive(Default)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Register a connection unless `max` are already live
    pub fn try_acquire(self: &Arc<Self>, max: Option<u64>) -> Option<ConnectionGuard> {
        // Increment first, then check limit (prevents race condition)
        let prev = self.active.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = max {
            if prev >= usize::try_from(max).unwrap_or(usize::MAX) {
                self.release();
                return None;
            }
        }
        Some(ConnectionGuard(Arc::clone(self)))
    }

    fn release(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Resolve once no connection is live
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Live connection slot, released on drop
pub struct ConnectionGuard(Arc<ConnectionTracker>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Accept and process a connection, checking limits and logging.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
    tracker: &Arc<ConnectionTracker>,
    signals: &Arc<SignalHandler>,
) {
    let max_conn = state.config.performance.max_connections;
    let Some(guard) = tracker.try_acquire(max_conn) else {
        logger::log_warning(&format!(
            "Max connections reached: {}/{}. Connection from {peer_addr} rejected.",
            tracker.active(),
            max_conn.unwrap_or_default()
        ));
        drop(stream);
        return;
    };

    logger::log_connection_accepted(&peer_addr);
    if let Err(e) = stream.set_nodelay(true) {
        logger::log_debug(&format!("Failed to set TCP_NODELAY for {peer_addr}: {e}"));
    }

    tokio::spawn(handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(signals),
        guard,
    ));
}

/// Serve a single connection until it closes, times out or shutdown finishes it.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: Arc<AppState>,
    signals: Arc<SignalHandler>,
    _guard: ConnectionGuard,
) {
    let io = TokioIo::new(stream);
    let perf = &state.config.performance;
    let timeout_duration =
        Duration::from_secs(std::cmp::max(perf.read_timeout, perf.write_timeout));

    let mut builder = http1::Builder::new();
    builder.keep_alive(perf.keep_alive);

    let service_state = Arc::clone(&state);
    let conn = builder.serve_connection(
        io,
        service_fn(move |req| {
            let state = Arc::clone(&service_state);
            async move { handler::handle_request(req, state, Some(peer_addr)).await }
        }),
    );
    tokio::pin!(conn);

    let served = async {
        tokio::select! {
            res = conn.as_mut() => res,
            () = signals.wait() => {
                // Finish the in-flight request, then close
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        }
    };

    match tokio::time::timeout(timeout_duration, served).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => logger::log_connection_error(&err),
        Err(_) => logger::log_debug(&format!(
            "Connection from {peer_addr} closed after {}s timeout",
            timeout_duration.as_secs()
        )),
    }
}
