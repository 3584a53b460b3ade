// Application state module
// Everything shared between connections, built once and never mutated

use std::io;
use std::path::{Path, PathBuf};

use super::types::Config;
use crate::http::mime::MimeTable;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Canonical absolute path of the served directory
    pub content_root: PathBuf,
    pub mime: MimeTable,
}

impl AppState {
    /// Create `AppState`, resolving the content root against the working directory
    pub fn new(config: &Config) -> io::Result<Self> {
        let content_root = canonical_content_root(Path::new(&config.content.root))?;
        let mime = MimeTable::with_overrides(&config.http.mime_types);

        Ok(Self {
            config: config.clone(),
            content_root,
            mime,
        })
    }
}

fn canonical_content_root(root: &Path) -> io::Result<PathBuf> {
    let canonical = root.canonicalize().map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Content root '{}' is not accessible: {e}", root.display()),
        )
    })?;
    if !canonical.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Content root '{}' is not a directory", root.display()),
        ));
    }
    Ok(canonical)
}

#[cfg(test)]
impl AppState {
    /// State over `root` with built-in defaults, ignoring any config file
    pub fn for_root(root: &Path) -> Self {
        let mut config = Config::load_with("definitely-not-a-config-file", None)
            .expect("default config loads");
        config.content.root = root.to_string_lossy().into_owned();
        Self::new(&config).expect("test content root exists")
    }
}
