// Configuration module entry point
// Loads layered configuration once at startup and exposes the immutable app state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, ContentConfig, CorsConfig, HttpConfig, LogLevel, LoggingConfig, PerformanceConfig,
    ServerConfig,
};

/// Default config file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "bookserve";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Sources, lowest priority first: built-in defaults, the optional config
    /// file, `BOOKSERVE_*` environment variables, then `PORT`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with(config_path, std::env::var("PORT").ok())
    }

    fn load_with(
        config_path: &str,
        port_override: Option<String>,
    ) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("content.root", "app")?
            .set_default("content.index_file", "index.html")?
            .set_default("content.virtual_prefixes", vec!["content/"])?
            .set_default("http.server_name", concat!("bookserve/", env!("CARGO_PKG_VERSION")))?
            .set_default("http.restrict_methods", true)?
            .set_default("http.cors.allow_origin", "*")?
            .set_default("http.cors.allow_methods", "GET, OPTIONS")?
            .set_default("http.cors.allow_headers", "Content-Type")?
            .set_default("http.mime_types.js", "application/javascript")?
            .set_default("http.mime_types.css", "text/css")?
            .set_default("http.mime_types.json", "application/json")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.shutdown_grace", 5)?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("BOOKSERVE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", port_override)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate().map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    /// Reject values that deserialize fine but cannot be served with
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if self.server.workers == Some(0) {
            return Err("server.workers must be at least 1".to_string());
        }
        let index = &self.content.index_file;
        if index.is_empty() {
            return Err("content.index_file must not be empty".to_string());
        }
        if index.contains('/') || index.contains('\\') || index == ".." {
            return Err(format!(
                "content.index_file must be a plain file name, got '{index}'"
            ));
        }
        if self.content.root.is_empty() {
            return Err("content.root must not be empty".to_string());
        }
        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(format!("Unknown logging.level '{}'", self.logging.level));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.logging.level).unwrap_or(LogLevel::Info)
    }
}
