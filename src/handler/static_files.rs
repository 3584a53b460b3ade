//! Static file serving module
//!
//! Maps a request path onto the content root, refuses anything that would
//! leave it, and loads the file with its content type.

use crate::config::{AppState, ContentConfig, LogLevel};
use crate::handler::error::ServeError;
use crate::http;
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// A file that passed every resolution check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path under the content root as requested, used for the content type
    pub requested: PathBuf,
    /// Target on disk after following symlinks
    pub real: PathBuf,
}

/// Serve a request path from the content root
pub async fn serve(state: &AppState, raw_path: &str, is_head: bool) -> Response<Full<Bytes>> {
    let http_config = &state.config.http;
    match load(state, raw_path).await {
        Ok((content, content_type)) => {
            if logger::enabled(LogLevel::Debug) {
                logger::log_debug(&format!(
                    "[Static] {raw_path} -> {content_type} ({} bytes)",
                    content.len()
                ));
            }
            http::build_file_response(content, content_type, http_config, is_head)
        }
        Err(ServeError::Forbidden { reason }) => {
            logger::log_warning(&format!("Rejected path '{raw_path}': {reason}"));
            http::build_403_response(http_config)
        }
        Err(err @ ServeError::NotFound) => {
            if logger::enabled(LogLevel::Debug) {
                logger::log_debug(&format!("[Static] {raw_path} -> {} {err}", err.status()));
            }
            http::build_404_response(http_config)
        }
        Err(ServeError::Internal(e)) => {
            logger::log_error(&format!("Failed to read '{raw_path}': {e}"));
            http::build_500_response(http_config, &e.to_string())
        }
    }
}

/// Resolve and read a file, returning its bytes and content type
pub async fn load<'s>(state: &'s AppState, raw_path: &str) -> Result<(Bytes, &'s str), ServeError> {
    let file = resolve(state, raw_path).await?;
    let content = read_resolved(&file).await?;
    Ok((content, state.mime.for_path(&file.requested)))
}

/// Read a resolved file fully into memory
pub async fn read_resolved(file: &ResolvedFile) -> Result<Bytes, ServeError> {
    Ok(Bytes::from(fs::read(&file.real).await?))
}

/// Resolve a raw request path to a regular file inside the content root
pub async fn resolve(state: &AppState, raw_path: &str) -> Result<ResolvedFile, ServeError> {
    let content = &state.config.content;
    let relative = request_relative_path(raw_path, content)?;
    let mut requested = join_under_root(&state.content_root, &relative)?;

    let meta = fs::metadata(&requested)
        .await
        .map_err(|_| ServeError::NotFound)?;
    if meta.is_dir() {
        requested.push(&content.index_file);
    }

    // Follow symlinks: the real target must stay inside the root as well
    let real = fs::canonicalize(&requested)
        .await
        .map_err(|_| ServeError::NotFound)?;
    if !real.starts_with(&state.content_root) {
        return Err(ServeError::forbidden("symlink target outside content root"));
    }

    let meta = fs::metadata(&real).await.map_err(|_| ServeError::NotFound)?;
    if !meta.is_file() {
        return Err(ServeError::NotFound);
    }

    Ok(ResolvedFile { requested, real })
}

/// Turn the URI path into a path relative to the content root.
///
/// Decodes percent-escapes, strips one leading `/`, substitutes the index
/// document for an empty path, then strips the first matching virtual prefix.
pub fn request_relative_path(raw_path: &str, content: &ContentConfig) -> Result<String, ServeError> {
    let decoded = urlencoding::decode(raw_path)
        .map_err(|_| ServeError::forbidden("path is not valid UTF-8"))?;
    if decoded.contains('\0') {
        return Err(ServeError::forbidden("path contains NUL"));
    }

    let path = decoded.strip_prefix('/').unwrap_or(&decoded[..]);
    if path.is_empty() {
        return Ok(content.index_file.clone());
    }

    Ok(strip_virtual_prefix(path, &content.virtual_prefixes).to_string())
}

fn strip_virtual_prefix<'a>(path: &'a str, prefixes: &[String]) -> &'a str {
    for prefix in prefixes {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            continue;
        }
        if path == prefix {
            return "";
        }
        if let Some(rest) = path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            return rest;
        }
    }
    path
}

/// Join `relative` onto `root` lexically, without touching the filesystem.
///
/// `.` and empty segments are dropped and `..` pops the previous segment.
/// Climbing above `root`, or a root or drive component, is forbidden.
pub fn join_under_root(root: &Path, relative: &str) -> Result<PathBuf, ServeError> {
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ServeError::forbidden("path escapes content root"));
                }
                joined.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ServeError::forbidden("absolute path component"));
            }
        }
    }

    if !joined.starts_with(root) {
        return Err(ServeError::forbidden("path escapes content root"));
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn book_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        stdfs::write(root.join("index.html"), "<h1>The Book</h1>").unwrap();
        stdfs::write(root.join("flipbook.js"), "export const pages = 12;").unwrap();
        stdfs::write(root.join("style.css"), "body { margin: 0 }").unwrap();
        stdfs::create_dir_all(root.join("chapter1")).unwrap();
        stdfs::write(root.join("chapter1/index.html"), "<h2>One</h2>").unwrap();
        stdfs::write(root.join("chapter1/pages.json"), r#"{"pages":[1,2]}"#).unwrap();
        stdfs::create_dir_all(root.join("empty")).unwrap();
        dir
    }

    fn content_config() -> ContentConfig {
        ContentConfig {
            root: "app".to_string(),
            index_file: "index.html".to_string(),
            virtual_prefixes: vec!["content/".to_string()],
        }
    }

    #[test]
    fn test_relative_path_defaults_to_index() {
        let cfg = content_config();
        assert_eq!(request_relative_path("/", &cfg).unwrap(), "index.html");
        assert_eq!(request_relative_path("", &cfg).unwrap(), "index.html");
    }

    #[test]
    fn test_relative_path_strips_one_slash_and_prefix() {
        let cfg = content_config();
        assert_eq!(request_relative_path("/flipbook.js", &cfg).unwrap(), "flipbook.js");
        assert_eq!(
            request_relative_path("/content/flipbook.js", &cfg).unwrap(),
            "flipbook.js"
        );
        assert_eq!(request_relative_path("/content/", &cfg).unwrap(), "");
        assert_eq!(request_relative_path("/content", &cfg).unwrap(), "");
        // Only a whole leading segment counts as the prefix
        assert_eq!(
            request_relative_path("/contents/a.js", &cfg).unwrap(),
            "contents/a.js"
        );
        assert_eq!(
            request_relative_path("/chapter1/content/a.js", &cfg).unwrap(),
            "chapter1/content/a.js"
        );
    }

    #[test]
    fn test_relative_path_decodes_escapes() {
        let cfg = content_config();
        assert_eq!(
            request_relative_path("/my%20book/page%201.html", &cfg).unwrap(),
            "my book/page 1.html"
        );
        assert_eq!(request_relative_path("/%2e%2e/secret", &cfg).unwrap(), "../secret");
    }

    #[test]
    fn test_relative_path_rejects_bad_bytes() {
        let cfg = content_config();
        assert!(matches!(
            request_relative_path("/%00index.html", &cfg),
            Err(ServeError::Forbidden { .. })
        ));
        assert!(matches!(
            request_relative_path("/%ff%fe", &cfg),
            Err(ServeError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_join_under_root() {
        let root = Path::new("/srv/book");
        assert_eq!(
            join_under_root(root, "a//./b.js").unwrap(),
            PathBuf::from("/srv/book/a/b.js")
        );
        assert_eq!(join_under_root(root, "").unwrap(), PathBuf::from("/srv/book"));
    }

    #[test]
    fn test_join_refuses_traversal() {
        let root = Path::new("/srv/book");
        for rel in ["../etc/passwd", "../../etc/passwd", "a/../../x", "a/b/../../..", ".."] {
            assert!(
                matches!(join_under_root(root, rel), Err(ServeError::Forbidden { .. })),
                "{rel} should be forbidden"
            );
        }
    }

    #[test]
    fn test_join_resolves_dot_segments_inside_root() {
        let root = Path::new("/srv/book");
        assert_eq!(
            join_under_root(root, "a/../b").unwrap(),
            PathBuf::from("/srv/book/b")
        );
        assert_eq!(
            join_under_root(root, "chapter1/./../index.html").unwrap(),
            PathBuf::from("/srv/book/index.html")
        );
        assert_eq!(join_under_root(root, "a/..").unwrap(), PathBuf::from("/srv/book"));
    }

    #[test]
    fn test_join_refuses_absolute() {
        let root = Path::new("/srv/book");
        assert!(matches!(
            join_under_root(root, "/etc/passwd"),
            Err(ServeError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_file_and_directory_index() {
        let dir = book_dir();
        let state = AppState::for_root(dir.path());

        let file = resolve(&state, "/flipbook.js").await.unwrap();
        assert_eq!(file.real, state.content_root.join("flipbook.js"));

        let index = resolve(&state, "/chapter1/").await.unwrap();
        assert_eq!(index.real, state.content_root.join("chapter1/index.html"));

        let root_index = resolve(&state, "/content/").await.unwrap();
        assert_eq!(root_index.real, state.content_root.join("index.html"));
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let dir = book_dir();
        let state = AppState::for_root(dir.path());
        assert!(matches!(resolve(&state, "/missing.xyz").await, Err(ServeError::NotFound)));
        // Directory without an index document
        assert!(matches!(resolve(&state, "/empty/").await, Err(ServeError::NotFound)));
    }

    #[tokio::test]
    async fn test_load_content_types() {
        let dir = book_dir();
        let state = AppState::for_root(dir.path());

        let (body, ty) = load(&state, "/flipbook.js").await.unwrap();
        assert_eq!(ty, "application/javascript");
        assert_eq!(&body[..], b"export const pages = 12;");

        let (_, ty) = load(&state, "/style.css").await.unwrap();
        assert_eq!(ty, "text/css");

        let (_, ty) = load(&state, "/content/chapter1/pages.json").await.unwrap();
        assert_eq!(ty, "application/json");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_forbidden() {
        let outside = TempDir::new().unwrap();
        stdfs::write(outside.path().join("secret.txt"), "top secret").unwrap();
        let dir = book_dir();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("leakdir")).unwrap();

        let state = AppState::for_root(dir.path());
        assert!(matches!(
            resolve(&state, "/leak.txt").await,
            Err(ServeError::Forbidden { .. })
        ));
        assert!(matches!(
            resolve(&state, "/leakdir/secret.txt").await,
            Err(ServeError::Forbidden { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_root_allowed() {
        let dir = book_dir();
        std::os::unix::fs::symlink(dir.path().join("flipbook.js"), dir.path().join("latest.js"))
            .unwrap();
        let state = AppState::for_root(dir.path());
        let file = resolve(&state, "/latest.js").await.unwrap();
        assert_eq!(file.real, state.content_root.join("flipbook.js"));
        assert_eq!(file.requested, state.content_root.join("latest.js"));
    }

    #[tokio::test]
    async fn test_read_failure_after_resolve_is_internal() {
        let dir = book_dir();
        let state = AppState::for_root(dir.path());
        let file = resolve(&state, "/style.css").await.unwrap();
        stdfs::remove_file(&file.real).unwrap();
        assert!(matches!(read_resolved(&file).await, Err(ServeError::Internal(_))));
    }
}
