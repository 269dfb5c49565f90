// sql2parquet-config - Export configuration
//
// Supports configuration from multiple sources:
// 1. Command-line flags (applied by the binary, highest priority)
// 2. Environment variables (SQL2PARQUET_* prefix)
// 3. Config file path from --config or SQL2PARQUET_CONFIG env var
// 4. Config file contents from SQL2PARQUET_CONFIG_CONTENT env var
// 5. Default config file locations (./sql2parquet.toml, ./.sql2parquet.toml)
// 6. Built-in defaults (lowest priority)
//
// The resolved `ExportConfig` is immutable once validated and is handed to the
// pipeline by value; nothing here is stored in process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

mod env_overrides;
mod error;
pub mod query;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, StdEnvSource, ENV_PREFIX};
pub use error::{ConfigError, Result};
pub use query::{inspect_query, QueryShape};

pub const DEFAULT_PAGE_SIZE: usize = 50_000;

/// Complete configuration for one export run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub export: ExportSettings,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// PostgreSQL connection descriptor plus the query to page over
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub ssl_mode: SslMode,
    pub connect_timeout_secs: u64,
    pub application_name: String,

    /// Table to export; the query is composed from this, `columns` and `order_by`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,

    /// Verbatim query; mutually exclusive with `table`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password: None,
            ssl_mode: SslMode::Prefer,
            connect_timeout_secs: 30,
            application_name: "sql2parquet".to_string(),
            table: None,
            columns: None,
            order_by: None,
            query: None,
        }
    }
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The base query every page is cut from (without OFFSET/FETCH).
    pub fn resolved_query(&self) -> Result<String> {
        query::resolve_query(self)
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("application_name", &self.application_name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("order_by", &self.order_by)
            .field("query", &self.query)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslMode::Disable => write!(f, "disable"),
            SslMode::Prefer => write!(f, "prefer"),
            SslMode::Require => write!(f, "require"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "off" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" => Ok(SslMode::Require),
            _ => Err(ConfigError::invalid(format!(
                "unsupported ssl mode: {}. Supported: disable, prefer, require",
                s
            ))),
        }
    }
}

/// Pagination and partitioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub page_size: usize,
    pub date_column: String,
    pub base_path: String,
    pub on_mixed: MixedPartitionPolicy,
    pub parquet_row_group_size: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            date_column: String::new(),
            base_path: String::new(),
            on_mixed: MixedPartitionPolicy::Fail,
            parquet_row_group_size: 32 * 1024,
        }
    }
}

/// What to do with a page whose rows span more than one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixedPartitionPolicy {
    /// Abort the run with a mixed-partition error.
    Fail,
    /// Resplit the page and write one object per day.
    Split,
}

impl fmt::Display for MixedPartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixedPartitionPolicy::Fail => write!(f, "fail"),
            MixedPartitionPolicy::Split => write!(f, "split"),
        }
    }
}

impl std::str::FromStr for MixedPartitionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(MixedPartitionPolicy::Fail),
            "split" => Ok(MixedPartitionPolicy::Split),
            _ => Err(ConfigError::invalid(format!(
                "unsupported mixed partition policy: {}. Supported: fail, split",
                s
            ))),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<R2Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
            r2: None,
        }
    }
}

impl StorageConfig {
    /// Human-readable bucket or root used in logs.
    pub fn location(&self) -> String {
        match self.backend {
            StorageBackend::Fs => self
                .fs
                .as_ref()
                .map(|fs| format!("file://{}", fs.path))
                .unwrap_or_else(|| "file://".to_string()),
            StorageBackend::S3 => self
                .s3
                .as_ref()
                .map(|s3| format!("s3://{}", s3.bucket))
                .unwrap_or_else(|| "s3://".to_string()),
            StorageBackend::R2 => self
                .r2
                .as_ref()
                .map(|r2| format!("r2://{}", r2.bucket))
                .unwrap_or_else(|| "r2://".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
    R2,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::R2 => write!(f, "r2"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "r2" | "cloudflare" => Ok(StorageBackend::R2),
            _ => Err(ConfigError::invalid(format!(
                "unsupported storage backend: {}. Supported: fs, s3, r2",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct R2Config {
    pub bucket: String,
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl fmt::Debug for R2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Config")
            .field("bucket", &self.bucket)
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Retry/backoff settings shared by the source and sink decorators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub breaker_threshold: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            breaker_threshold: 5,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid(format!(
                "unsupported log format: {}. Supported: text, json",
                s
            ))),
        }
    }
}

impl ExportConfig {
    /// Load configuration from the default sources (env + default files).
    ///
    /// Missing config files are not an error; validation still runs.
    pub fn load() -> Result<Self> {
        sources::load_config(&StdEnvSource)
    }

    /// Load configuration from a specific file path (for the --config flag).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path, &StdEnvSource)
    }

    /// Load configuration without validating it, so the caller can layer
    /// command-line overrides first and validate afterwards.
    pub fn load_unvalidated(path: Option<&std::path::Path>) -> Result<Self> {
        sources::load_unvalidated(path, &StdEnvSource)
    }

    /// Parse a TOML document; sections that are absent keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: "inline content".to_string(),
            source,
        })
    }

    /// Apply environment overrides from a custom source (tests, embedding).
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
