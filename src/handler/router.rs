//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: preflight, method policy, then
//! static file resolution. Writes one access log line per request.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: Option<SocketAddr>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let response = respond(req.method(), req.uri().path(), &state).await;

    if state.config.logging.access_log {
        let entry = access_entry(&req, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Produce the response for a method and raw URI path
pub async fn respond(method: &Method, path: &str, state: &AppState) -> Response<Full<Bytes>> {
    let http_config = &state.config.http;

    // Preflight never touches the filesystem
    if method == Method::OPTIONS {
        return http::build_options_response(http_config);
    }

    if http_config.restrict_methods && !matches!(*method, Method::GET | Method::HEAD) {
        logger::log_warning(&format!("Method not allowed: {method} {path}"));
        return http::build_405_response(http_config);
    }

    static_files::serve(state, path, method == Method::HEAD).await
}

fn access_entry<B>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: Option<SocketAddr>,
    started: Instant,
) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.map_or_else(|| "-".to_string(), |a| a.ip().to_string()),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = format!("{:?}", req.version())
        .trim_start_matches("HTTP/")
        .to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry.origin = header("origin");
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}
