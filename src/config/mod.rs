// Configuration module entry point
// Loads the immutable relay configuration and holds the shared runtime state

mod state;
mod types;

use hyper::Uri;
use std::net::SocketAddr;
use std::time::Duration;

// Re-export public types
pub use state::AppState;
pub use types::{Config, HealthConfig, HttpConfig, LogLevel};

/// Default config file name (without extension) looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension).
    /// The file is optional; `RELAY_*` environment variables override it.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with(config::File::with_name(config_path).required(false))
    }

    /// Load configuration from an arbitrary source layered over the defaults
    pub fn load_with<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(source)
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("upstream.url", "http://127.0.0.1:5001/predict")?
            .set_default("upstream.timeout_ms", 30_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.log_payloads", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 60)?
            .set_default("http.server_name", "recommend-relay")?
            .set_default("http.banner", "Career Recommendation API")?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Parse and check the upstream URL; only absolute `http://` URLs are accepted
    pub fn get_upstream_uri(&self) -> Result<Uri, String> {
        let uri: Uri = self
            .upstream
            .url
            .parse()
            .map_err(|e| format!("Invalid upstream URL '{}': {e}", self.upstream.url))?;

        if uri.scheme_str() != Some("http") {
            return Err(format!(
                "Invalid upstream URL '{}': only http:// is supported",
                self.upstream.url
            ));
        }
        if uri.authority().is_none() {
            return Err(format!(
                "Invalid upstream URL '{}': missing host",
                self.upstream.url
            ));
        }
        Ok(uri)
    }

    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }

    /// Bound on reading a request head; never covers time spent relaying
    pub const fn header_read_timeout(&self) -> Option<Duration> {
        match self.performance.read_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_toml(toml: &str) -> Config {
        Config::load_with(config::File::from_str(toml, config::FileFormat::Toml))
            .expect("config should load")
    }

    #[test]
    fn test_defaults_match_fixed_relay_values() {
        let cfg = load_toml("");
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.upstream.url, "http://127.0.0.1:5001/predict");
        assert_eq!(cfg.upstream_timeout(), Duration::from_secs(30));
        assert!(cfg.http.enable_cors);
        assert!(cfg.logging.access_log);
        assert_eq!(cfg.logging.level, LogLevel::Info);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert!(cfg.routes.health.enabled);
        assert_eq!(cfg.routes.health.liveness_path, "/healthz");
        assert_eq!(
            cfg.get_socket_addr().unwrap(),
            "127.0.0.1:5000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg = load_toml(
            r#"
            [server]
            port = 6000

            [upstream]
            url = "http://10.0.0.7:9000/v2/predict"
            timeout_ms = 1500

            [routes.health]
            liveness_path = "/live"
            "#,
        );
        assert_eq!(cfg.server.port, 6000);
        assert_eq!(cfg.upstream_timeout(), Duration::from_millis(1500));
        let uri = cfg.get_upstream_uri().unwrap();
        assert_eq!(uri.path(), "/v2/predict");
        assert_eq!(uri.port_u16(), Some(9000));
        assert_eq!(cfg.routes.health.liveness_path, "/live");
        assert_eq!(cfg.routes.health.readiness_path, "/readyz");
    }

    #[test]
    fn test_upstream_uri_rejects_non_http() {
        let mut cfg = load_toml("");
        cfg.upstream.url = "https://127.0.0.1:5001/predict".to_string();
        assert!(cfg.get_upstream_uri().is_err());

        cfg.upstream.url = "/predict".to_string();
        assert!(cfg.get_upstream_uri().is_err());

        cfg.upstream.url = "not a url".to_string();
        assert!(cfg.get_upstream_uri().is_err());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut cfg = load_toml("");
        cfg.server.host = "not-an-ip".to_string();
        assert!(cfg.get_socket_addr().is_err());
    }

    #[test]
    fn test_header_read_timeout() {
        let mut cfg = load_toml("");
        assert_eq!(cfg.header_read_timeout(), Some(Duration::from_secs(60)));

        cfg.performance.read_timeout = 0;
        assert_eq!(cfg.header_read_timeout(), None);
    }

    #[test]
    fn test_log_level_parsing() {
        let cfg = load_toml("[logging]\nlevel = \"warn\"");
        assert_eq!(cfg.logging.level, LogLevel::Warn);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);

        let err = Config::load_with(config::File::from_str(
            "[logging]\nlevel = \"verbose\"",
            config::FileFormat::Toml,
        ));
        assert!(err.is_err());
    }
}
