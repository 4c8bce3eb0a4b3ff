//! Configuration types and loading for the application.

use std::path::Path;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::paths::{expand_str_path, write_default_config};
use crate::wecom::Credential;
use crate::{AppPaths, CoreError, env_prefix};

/// Default WeCom API base URL.
pub const DEFAULT_BASE_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Default number of delivery attempts per message.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for the application"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// WeCom application credential.
    pub credential: CredentialConfig,

    /// API endpoint configuration.
    pub api: ApiConfig,

    /// Delivery behavior configuration.
    pub delivery: DeliveryConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Custom paths for the token cache.
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let built = Config::builder()
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            .set_default("delivery.retry_count", i64::from(DEFAULT_RETRY_COUNT))?
            .set_default("delivery.safe", false)?
            .set_default("logging.level", "info")?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
            .build()?;

        let mut config: Self = built.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }

    /// Build the immutable credential from the configured values.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any of the three values is missing or empty.
    pub fn credential(&self) -> crate::Result<Credential> {
        let corp_id = self
            .credential
            .corp_id
            .clone()
            .ok_or_else(|| CoreError::Validation("corp_id is not configured".to_string()))?;
        let corp_secret = self
            .credential
            .corp_secret
            .clone()
            .ok_or_else(|| CoreError::Validation("corp_secret is not configured".to_string()))?;
        let agent_id = self
            .credential
            .agent_id
            .ok_or_else(|| CoreError::Validation("agent_id is not configured".to_string()))?;
        Credential::new(corp_id, corp_secret, agent_id)
    }
}

/// WeCom application credential.
///
/// Usually supplied through the environment (`COWECHAT__CREDENTIAL__CORP_SECRET`)
/// or command-line flags rather than written to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "WeCom application credential")]
pub struct CredentialConfig {
    /// Enterprise (corp) ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corp_id: Option<String>,

    /// Application secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corp_secret: Option<String>,

    /// Application agent ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<u64>,
}

/// API endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "API endpoint configuration")]
pub struct ApiConfig {
    /// Base URL of the WeCom server API.
    #[schemars(default = "default_base_url")]
    pub base_url: String,

    /// HTTP timeout in seconds. The HTTP client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub timeout: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: None,
        }
    }
}

/// Delivery behavior configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Delivery behavior configuration")]
pub struct DeliveryConfig {
    /// Maximum number of attempts per message (default: 5).
    #[schemars(range(min = 1))]
    pub retry_count: u32,

    /// Mark messages as confidential (`safe = 1`).
    pub safe: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            safe: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    #[schemars(default = "default_log_level")]
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl LogLevel {
    /// The matching `log` filter.
    #[must_use]
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Path override configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Custom paths for the token cache")]
pub struct PathsConfig {
    /// Directory holding token cache files. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Exact token cache file, overriding the per-application default name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<String>,
}
