//! HTTP response building module
//!
//! Provides builders for the status codes the server emits. Every builder
//! attaches the `Server` header and the configured cross-origin headers.

use crate::config::HttpConfig;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};

/// Methods the server answers without a 405
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Start a response with the headers every reply carries
fn base(status: StatusCode, http: &HttpConfig) -> Builder {
    Response::builder()
        .status(status)
        .header("Server", &http.server_name)
        .header("Access-Control-Allow-Origin", &http.cors.allow_origin)
        .header("Access-Control-Allow-Methods", &http.cors.allow_methods)
        .header("Access-Control-Allow-Headers", &http.cors.allow_headers)
}

/// Build a plain-text error response
fn build_text_response(status: StatusCode, http: &HttpConfig, text: String) -> Response<Full<Bytes>> {
    let body = Bytes::from(text);
    base(status, http)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(body.clone()))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            fallback(status, body)
        })
}

/// Build 200 response carrying a file
pub fn build_file_response(
    data: Bytes,
    content_type: &str,
    http: &HttpConfig,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    base(StatusCode::OK, http)
        .header("Content-Type", content_type)
        .header("Content-Length", content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            fallback(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
        })
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    base(StatusCode::OK, http)
        .header("Allow", ALLOWED_METHODS)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            fallback(StatusCode::OK, Bytes::new())
        })
}

/// Build 403 Forbidden response; never echoes the requested path
pub fn build_403_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    build_text_response(StatusCode::FORBIDDEN, http, "403 Forbidden".to_string())
}

/// Build 404 Not Found response
pub fn build_404_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    build_text_response(StatusCode::NOT_FOUND, http, "404 Not Found".to_string())
}

/// Build 405 Method Not Allowed response
pub fn build_405_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    let mut resp = build_text_response(
        StatusCode::METHOD_NOT_ALLOWED,
        http,
        "405 Method Not Allowed".to_string(),
    );
    resp.headers_mut().insert(
        hyper::header::ALLOW,
        hyper::header::HeaderValue::from_static(ALLOWED_METHODS),
    );
    resp
}

/// Build 500 response with a best-effort diagnostic
pub fn build_500_response(http: &HttpConfig, detail: &str) -> Response<Full<Bytes>> {
    build_text_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        http,
        format!("500 Internal Server Error: {detail}"),
    )
}

fn fallback(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorsConfig;
    use std::collections::HashMap;

    fn http_config() -> HttpConfig {
        HttpConfig {
            server_name: "bookserve/test".to_string(),
            restrict_methods: true,
            cors: CorsConfig {
                allow_origin: "*".to_string(),
                allow_methods: "GET, OPTIONS".to_string(),
                allow_headers: "Content-Type".to_string(),
            },
            mime_types: HashMap::new(),
        }
    }

    fn assert_cors(resp: &Response<Full<Bytes>>) {
        let h = resp.headers();
        assert_eq!(h["access-control-allow-origin"], "*");
        assert_eq!(h["access-control-allow-methods"], "GET, OPTIONS");
        assert_eq!(h["access-control-allow-headers"], "Content-Type");
        assert_eq!(h["server"], "bookserve/test");
    }

    #[test]
    fn test_every_builder_carries_cors() {
        let http = http_config();
        for resp in [
            build_file_response(Bytes::from_static(b"x"), "text/css", &http, false),
            build_options_response(&http),
            build_403_response(&http),
            build_404_response(&http),
            build_405_response(&http),
            build_500_response(&http, "boom"),
        ] {
            assert_cors(&resp);
        }
    }

    #[test]
    fn test_status_codes() {
        let http = http_config();
        assert_eq!(build_options_response(&http).status(), StatusCode::OK);
        assert_eq!(build_403_response(&http).status(), StatusCode::FORBIDDEN);
        assert_eq!(build_404_response(&http).status(), StatusCode::NOT_FOUND);
        assert_eq!(build_405_response(&http).status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            build_500_response(&http, "boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_405_lists_allowed_methods() {
        let resp = build_405_response(&http_config());
        assert_eq!(resp.headers()["allow"], ALLOWED_METHODS);
    }

    #[test]
    fn test_head_keeps_length_drops_body() {
        let resp = build_file_response(Bytes::from_static(b"hello"), "text/plain", &http_config(), true);
        assert_eq!(resp.headers()["content-length"], "5");
        assert_eq!(resp.headers()["content-type"], "text/plain");
    }
}
