//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::SupabaseConfig;
use crate::sync::{RetryPolicy, SyncConfig, SyncMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote data source (PostgREST + Realtime)
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub url: String,

    #[serde(default)]
    pub anon_key: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_source_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_table() -> String {
    "sensor_data".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_channel() -> String {
    "sensor_data_changes".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            anon_key: String::new(),
            table: default_table(),
            schema: default_schema(),
            channel: default_channel(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Synchronizer settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// "push" (realtime subscription) or "poll"
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum retained readings
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_max")]
    pub retry_max_ms: u64,
}

fn default_mode() -> String {
    "push".to_string()
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_limit() -> usize {
    100
}

fn default_retry_initial() -> u64 {
    1000
}

fn default_retry_max() -> u64 {
    60_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            poll_interval_ms: default_poll_interval(),
            limit: default_limit(),
            retry_initial_ms: default_retry_initial(),
            retry_max_ms: default_retry_max(),
        }
    }
}

/// View projection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_table_rows")]
    pub table_rows: usize,
}

fn default_table_rows() -> usize {
    crate::view::DEFAULT_TABLE_ROWS
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            table_rows: default_table_rows(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_connections")]
    pub max_ws_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_max_connections() -> usize {
    1000
}

/// Dashboard dev server origins; an empty list allows any origin
pub(crate) fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_ws_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("sensoguard").join("config.toml")),
            Some(PathBuf::from("/etc/sensoguard/config.toml")),
            Some(PathBuf::from("./sensoguard.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; `SENSOGUARD_*` wins over the
    /// bare `SUPABASE_*` names
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Source overrides
        if let Some(url) = lookup("SENSOGUARD_SOURCE_URL").or_else(|| lookup("SUPABASE_URL")) {
            self.source.url = url;
        }
        if let Some(key) =
            lookup("SENSOGUARD_SOURCE_ANON_KEY").or_else(|| lookup("SUPABASE_ANON_KEY"))
        {
            self.source.anon_key = key;
        }
        if let Some(table) = lookup("SENSOGUARD_TABLE") {
            self.source.table = table;
        }

        // Sync overrides
        if let Some(mode) = lookup("SENSOGUARD_SYNC_MODE") {
            self.sync.mode = mode;
        }
        if let Some(limit) = lookup("SENSOGUARD_SYNC_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.sync.limit = n;
            }
        }
        if let Some(interval) = lookup("SENSOGUARD_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.sync.poll_interval_ms = ms;
            }
        }

        // API overrides
        if let Some(host) = lookup("SENSOGUARD_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("SENSOGUARD_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("SENSOGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SENSOGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check the settings a remote source needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Missing("source.url"));
        }
        if self.source.anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("source.anon_key"));
        }
        self.sync_mode()?;
        Ok(())
    }

    /// Parsed sync mode
    pub fn sync_mode(&self) -> Result<SyncMode, ConfigError> {
        match self.sync.mode.trim().to_lowercase().as_str() {
            "push" | "realtime" => Ok(SyncMode::Push),
            "poll" => Ok(SyncMode::Poll {
                interval: Duration::from_millis(self.sync.poll_interval_ms.max(1)),
            }),
            other => Err(ConfigError::Invalid {
                key: "sync.mode",
                value: other.to_string(),
            }),
        }
    }

    /// Connection settings for the Supabase source
    pub fn supabase(&self) -> SupabaseConfig {
        SupabaseConfig {
            url: self.source.url.clone(),
            anon_key: self.source.anon_key.clone(),
            schema: self.source.schema.clone(),
            channel: self.source.channel.clone(),
            request_timeout_ms: self.source.request_timeout_ms,
            ..Default::default()
        }
    }

    /// Synchronizer settings
    pub fn sync_config(&self) -> Result<SyncConfig, ConfigError> {
        Ok(SyncConfig {
            table: self.source.table.clone(),
            limit: self.sync.limit,
            mode: self.sync_mode()?,
            ..Default::default()
        })
    }

    /// Driver backoff
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.sync.retry_initial_ms),
            max_delay: Duration::from_millis(
                self.sync.retry_max_ms.max(self.sync.retry_initial_ms),
            ),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# SensoGuard Configuration
#
# Environment variables override these settings:
# - SENSOGUARD_SOURCE_URL (or SUPABASE_URL)
# - SENSOGUARD_SOURCE_ANON_KEY (or SUPABASE_ANON_KEY)
# - SENSOGUARD_TABLE
# - SENSOGUARD_SYNC_MODE
# - SENSOGUARD_SYNC_LIMIT
# - SENSOGUARD_POLL_INTERVAL_MS
# - SENSOGUARD_API_HOST
# - SENSOGUARD_API_PORT
# - SENSOGUARD_LOG_LEVEL
# - SENSOGUARD_LOG_FORMAT

[source]
# Project URL (PostgREST at /rest/v1, Realtime at /realtime/v1)
url = "http://localhost:54321"

# Public anon key
anon_key = ""

# Table holding the readings
table = "sensor_data"
schema = "public"

# Realtime channel name
channel = "sensor_data_changes"

# Bulk query timeout (ms)
request_timeout_ms = 10000

[sync]
# push: realtime subscription, poll: re-query on an interval
mode = "push"

# Poll interval (ms), used when mode = "poll"
poll_interval_ms = 5000

# Maximum readings kept in the series
limit = 100

# Reconnect backoff (ms)
retry_initial_ms = 1000
retry_max_ms = 60000

[view]
# Rows in the latest-readings table
table_rows = 10

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8090

# Allowed CORS origins
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Websocket connection limit
max_ws_connections = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/sensoguard/sensoguard.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.source.table, "sensor_data");
        assert_eq!(config.sync.limit, 100);
        assert_eq!(config.sync.poll_interval_ms, 5000);
        assert_eq!(config.view.table_rows, 10);
        assert!(matches!(config.sync_mode().unwrap(), SyncMode::Push));
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.source.channel, "sensor_data_changes");
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[source]\nurl = \"https://demo.supabase.co\"\nanon_key = \"abc\"\n\n[sync]\nmode = \"poll\"\nlimit = 50"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source.url, "https://demo.supabase.co");
        assert_eq!(config.source.table, "sensor_data");
        assert_eq!(config.sync.limit, 50);
        assert!(config.validate().is_ok());

        match config.sync_mode().unwrap() {
            SyncMode::Poll { interval } => assert_eq!(interval, Duration::from_secs(5)),
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_api_section_keeps_cors_allow_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nport = 9000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.cors_origins, default_cors_origins());
        assert_eq!(config.api.cors_origins, ApiConfig::default().cors_origins);

        let mut open = NamedTempFile::new().unwrap();
        writeln!(open, "[api]\ncors_origins = []").unwrap();
        assert!(Config::load(open.path()).unwrap().api.cors_origins.is_empty());
    }

    #[test]
    fn test_load_errors() {
        let err = Config::load(Path::new("/nonexistent/sensoguard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[sync\nlimit = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SUPABASE_URL", "https://bare.supabase.co"),
            ("SENSOGUARD_SOURCE_URL", "https://prefixed.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SENSOGUARD_SYNC_LIMIT", "25"),
            ("SENSOGUARD_API_PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.source.url, "https://prefixed.supabase.co");
        assert_eq!(config.source.anon_key, "anon");
        assert_eq!(config.sync.limit, 25);
        assert_eq!(config.api.port, 8090);
    }

    #[test]
    fn test_validate() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("source.anon_key"))
        ));

        let mut config = Config::default();
        config.source.anon_key = "key".to_string();
        config.sync.mode = "stream".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_conversions() {
        let mut config = Config::default();
        config.source.anon_key = "key".to_string();
        config.sync.limit = 50;
        config.sync.retry_initial_ms = 500;
        config.sync.retry_max_ms = 100;

        let supabase = config.supabase();
        assert_eq!(supabase.anon_key, "key");
        assert_eq!(supabase.channel, "sensor_data_changes");

        let sync = config.sync_config().unwrap();
        assert_eq!(sync.limit, 50);
        assert_eq!(sync.table, "sensor_data");

        let retry = config.retry_policy();
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_millis(500));
    }
}
