// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    /// File handlers matched by extension (e.g. `.php` → `fastcgi`)
    #[serde(default)]
    pub handlers: Vec<FileHandlerConfig>,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Value of the `Server` header and `SERVER_SOFTWARE`
    pub software: String,
    pub admin: String,
    /// Footer appended to generated error pages
    pub signature: String,
    pub document_root: String,
    /// Optional error page template (see `connection::error_page`)
    #[serde(default)]
    pub errors_page_template: Option<String>,
    #[serde(default = "default_index_files")]
    pub index_files: Vec<String>,
}

fn default_index_files() -> Vec<String> {
    vec!["index.php".to_string(), "index.html".to_string()]
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    /// Number of requests a single connection may serve with keep-alive
    pub keep_alive_max: u32,
    /// Keep-alive idle timeout in seconds
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Headers every response starts with; `Server` defaults to `server.software`
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    pub max_line_length: usize,
    pub max_header_size: usize,
    pub max_body_size: u64,
}

/// FastCGI backend defaults
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for one backend round trip, in seconds
    pub timeout: u64,
}

/// Module pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ModulesConfig {
    /// Execution order of the pipeline
    #[serde(default = "default_module_order")]
    pub order: Vec<String>,
}

fn default_module_order() -> Vec<String> {
    vec!["core".to_string(), "fastcgi".to_string(), "static".to_string()]
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            order: default_module_order(),
        }
    }
}

/// File handler entry - routes a file extension to a module
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FileHandlerConfig {
    /// Extension including the leading dot (e.g. ".php")
    pub extension: String,
    /// Module name that handles the matched file
    pub name: String,
    /// Backend host override for this handler
    #[serde(default)]
    pub host: Option<String>,
    /// Backend port override for this handler
    #[serde(default)]
    pub port: Option<u16>,
}
