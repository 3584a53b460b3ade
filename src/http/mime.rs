//! MIME type detection module
//!
//! Returns the corresponding Content-Type based on file extension. The table
//! is built once at startup from the built-in defaults plus configured
//! overrides, and only read afterwards.

use std::collections::HashMap;
use std::path::Path;

/// Fallback for unknown or missing suffixes
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Immutable suffix -> content type lookup
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    overrides: HashMap<String, String>,
}

impl MimeTable {
    /// Build a table whose entries win over the built-in defaults.
    /// Suffixes may be given with or without the leading dot.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let overrides = overrides
            .iter()
            .map(|(ext, ty)| (ext.trim_start_matches('.').to_ascii_lowercase(), ty.clone()))
            .collect();
        Self { overrides }
    }

    /// Content type for a suffix (without the dot, any case)
    pub fn lookup(&self, extension: Option<&str>) -> &str {
        let Some(ext) = extension else {
            return OCTET_STREAM;
        };
        let ext = ext.to_ascii_lowercase();
        match self.overrides.get(&ext) {
            Some(ty) => ty,
            None => get_content_type(Some(&ext)),
        }
    }

    /// Content type for a file path, from its final suffix
    pub fn for_path(&self, path: &Path) -> &str {
        self.lookup(path.extension().and_then(|e| e.to_str()))
    }
}

/// Get built-in MIME Content-Type based on a lowercase file extension
pub fn get_content_type(extension: Option<&str>) -> &'static str {
    match extension {
        // Text
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("csv") => "text/csv",

        // JavaScript/WASM
        Some("js" | "mjs") => "application/javascript",
        Some("json" | "map") => "application/json",
        Some("wasm") => "application/wasm",
        Some("webmanifest") => "application/manifest+json",

        // Images
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",

        // Video
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogv") => "video/ogg",

        // Audio
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg" | "oga") => "audio/ogg",
        Some("m4a") => "audio/mp4",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("eot") => "application/vnd.ms-fontobject",

        // Documents
        Some("pdf") => "application/pdf",
        Some("epub") => "application/epub+zip",
        Some("zip") => "application/zip",

        // Default
        _ => OCTET_STREAM,
    }
}
