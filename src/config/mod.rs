// Configuration module entry point
// Loads the server configuration and builds the shared server context

mod state;
mod types;

use std::net::SocketAddr;
use std::time::Duration;

// Re-export public types
pub use state::ServerContext;
pub use types::{
    Config, FileHandlerConfig, GatewayConfig, HttpConfig, LoggingConfig, ModulesConfig,
    PerformanceConfig, ServerConfig,
};

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from an in-memory TOML document on top of the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.software", concat!("rust_gateway_server/", env!("CARGO_PKG_VERSION")))?
            .set_default("server.admin", "admin@localhost")?
            .set_default("server.signature", "")?
            .set_default("server.document_root", "var/www")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_max", 64)?
            .set_default("performance.keep_alive_timeout", 5)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.max_line_length", 2048)?
            .set_default("http.max_header_size", 65_536)?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .set_default("gateway.host", "127.0.0.1")?
            .set_default("gateway.port", 9010)?
            .set_default("gateway.timeout", 30)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.read_timeout)
    }

    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.write_timeout)
    }

    pub const fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.keep_alive_timeout)
    }

    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout)
    }

    /// Headers every response starts with.
    ///
    /// `Server` falls back to `server.software` and `Connection` to `close`;
    /// keep-alive negotiation overrides the latter per request.
    pub fn default_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .http
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let has = |headers: &[(String, String)], name: &str| {
            headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
        };
        if !has(&headers, "server") {
            headers.push(("Server".to_string(), self.server.software.clone()));
        }
        if !has(&headers, "connection") {
            headers.push(("Connection".to_string(), "close".to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.performance.keep_alive_max, 64);
        assert_eq!(cfg.gateway.port, 9010);
        assert_eq!(cfg.gateway.host, "127.0.0.1");
        assert_eq!(cfg.http.max_line_length, 2048);
        assert_eq!(cfg.modules.order, vec!["core", "fastcgi", "static"]);
        assert!(cfg.handlers.is_empty());
    }

    #[test]
    fn test_toml_overrides() {
        let cfg = Config::from_toml_str(
            r#"
            [performance]
            keep_alive_max = 2

            [gateway]
            port = 9000

            [[handlers]]
            extension = ".php"
            name = "fastcgi"
            port = 9001
            "#,
        )
        .unwrap();
        assert_eq!(cfg.performance.keep_alive_max, 2);
        assert_eq!(cfg.gateway.port, 9000);
        let handler = &cfg.handlers[0];
        assert_eq!(handler.extension, ".php");
        assert_eq!(handler.name, "fastcgi");
        assert_eq!(handler.port, Some(9001));
        assert_eq!(handler.host, None);
    }

    #[test]
    fn test_default_headers() {
        let cfg = Config::from_toml_str(
            r#"
            [http.default_headers]
            X-Frame-Options = "DENY"
            "#,
        )
        .unwrap();
        let headers = cfg.default_headers();
        // Key case is up to the config source; header names are case-insensitive anyway
        assert!(headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("x-frame-options") && v == "DENY"));
        assert!(headers.iter().any(|(k, v)| k == "Server" && v == &cfg.server.software));
        assert!(headers.contains(&("Connection".to_string(), "close".to_string())));
    }
}
