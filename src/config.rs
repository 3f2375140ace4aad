//! Configuration management for the flowcount service.
//!
//! Sources, in increasing order of precedence:
//! 1. Default configuration (embedded in the binary)
//! 2. System-wide configuration file (`/etc/flowcount/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables prefixed with `FLOWCOUNT_`, nested keys joined
//!    by `__` (e.g. `FLOWCOUNT_WINDOW__INTERVAL_SECS=30`)
//! 5. Command-line arguments

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use flowstore_core::StoreConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/flowcount/config.toml";
const ENV_PREFIX: &str = "FLOWCOUNT";

/// Command-line arguments.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ingest listener host address
    #[arg(long, env = "FLOWCOUNT_HOST")]
    pub host: Option<String>,

    /// Ingest listener port
    #[arg(long, env = "FLOWCOUNT_PORT")]
    pub port: Option<u16>,

    /// Window length in seconds
    #[arg(long, env = "FLOWCOUNT_INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// Counting backend ("memory" or "persistent")
    #[arg(long, env = "FLOWCOUNT_BACKEND_KIND")]
    pub backend: Option<String>,

    /// Persistent store connection string
    #[arg(long, env = "FLOWCOUNT_STORE_CONNECTION")]
    pub store_connection: Option<String>,

    /// Persistent store connection pool size
    #[arg(long, env = "FLOWCOUNT_STORE_POOL_MAX")]
    pub store_pool_max: Option<u64>,

    /// Result sink ("topic", "http", "file" or "log")
    #[arg(long, env = "FLOWCOUNT_SINK_KIND")]
    pub sink: Option<String>,

    /// Callback endpoint for the http sink
    #[arg(long, env = "FLOWCOUNT_SINK_ENDPOINT")]
    pub sink_endpoint: Option<String>,

    /// Topic name for the topic sink
    #[arg(long, env = "FLOWCOUNT_TOPIC")]
    pub topic: Option<String>,

    /// Kafka REST proxy base URL for the topic sink
    #[arg(long, env = "FLOWCOUNT_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, env = "FLOWCOUNT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Ingest listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path of the ingest route
    pub ingest_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5010,
            ingest_path: "/api/verve/accept".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub interval_secs: u64,
}

impl WindowConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Dual-buffer in-memory counter
    #[default]
    Memory,
    /// Durable key store
    Persistent,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Publish to a topic through a Kafka REST proxy
    #[default]
    Topic,
    /// POST to a callback endpoint
    Http,
    /// Append to a local file
    File,
    /// Log only
    Log,
}

/// Result sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Callback endpoint, required for the http sink
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_topic() -> String {
    "flow.unique.entries".to_string()
}

fn default_proxy_url() -> String {
    "http://kafka-rest:8082".to_string()
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("unique_requests.log")
}

fn default_timeout_ms() -> u64 {
    500
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            topic: default_topic(),
            proxy_url: default_proxy_url(),
            endpoint: None,
            path: default_sink_path(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Running-count echo on ingest requests carrying an `endpoint` parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct EchoConfig {
    pub enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl EchoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: false,
        }
    }
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(cli: CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Ok(metadata) = std::fs::metadata(DEFAULT_CONFIG_PATH) {
            if metadata.is_file() {
                builder = builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
            }
        }

        if let Some(ref config_path) = cli.config {
            builder = builder.add_source(File::from(config_path.clone()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(ref host) = cli.host {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(secs) = cli.interval_secs {
            builder = builder.set_override("window.interval_secs", saturating_i64(secs))?;
        }
        if let Some(ref backend) = cli.backend {
            builder = builder.set_override("backend.kind", backend.as_str())?;
        }
        if let Some(ref connection) = cli.store_connection {
            builder = builder.set_override("store.connection", connection.as_str())?;
        }
        if let Some(pool_max) = cli.store_pool_max {
            builder = builder.set_override("store.pool_max", saturating_i64(pool_max))?;
        }
        if let Some(ref sink) = cli.sink {
            builder = builder.set_override("sink.kind", sink.as_str())?;
        }
        if let Some(ref endpoint) = cli.sink_endpoint {
            builder = builder.set_override("sink.endpoint", endpoint.as_str())?;
        }
        if let Some(ref topic) = cli.topic {
            builder = builder.set_override("sink.topic", topic.as_str())?;
        }
        if let Some(ref proxy_url) = cli.proxy_url {
            builder = builder.set_override("sink.proxy_url", proxy_url.as_str())?;
        }
        if let Some(ref level) = cli.log_level {
            builder = builder.set_override("log.level", level.as_str())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Parses settings from a TOML document layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
