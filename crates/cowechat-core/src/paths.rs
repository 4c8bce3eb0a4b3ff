//! XDG-compliant path resolution for application directories.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::wecom::Credential;
use crate::{APP_NAME, AppConfig};

/// Application paths for the config file and the token cache.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file.
    pub config_file: PathBuf,
    /// Directory holding token cache files.
    pub cache_dir: PathBuf,
    /// Explicit token cache file from configuration, if any.
    pub cache_file: Option<PathBuf>,
}

impl AppPaths {
    /// Discover application paths, optionally overriding the config file location.
    ///
    /// # Errors
    ///
    /// Returns an error if paths cannot be resolved or expanded.
    pub fn discover(override_path: Option<&Path>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!(
                "invalid config file path: {}",
                config_file.display()
            ));
        }

        Ok(Self {
            config_file,
            cache_dir: default_cache_dir()?,
            cache_file: None,
        })
    }

    /// Apply path overrides from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if override paths cannot be expanded.
    pub fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref dir) = cfg.paths.cache_dir {
            self.cache_dir = expand_str_path(dir)?;
        }
        if let Some(ref file) = cfg.paths.cache_file {
            self.cache_file = Some(expand_str_path(file)?);
        }
        Ok(self)
    }

    /// Resolve the token cache file for an application credential.
    ///
    /// Each corp/agent pair gets its own file unless an explicit file is configured.
    #[must_use]
    pub fn token_cache_file(&self, credential: &Credential) -> PathBuf {
        self.cache_file.clone().unwrap_or_else(|| {
            self.cache_dir
                .join(token_cache_file_name(credential.corp_id(), credential.agent_id()))
        })
    }

    /// Ensure the cache directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating cache directory {}", self.cache_dir.display()))?;
        if let Some(parent) = self.cache_file.as_deref().and_then(Path::parent) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }
        Ok(())
    }

    /// Log directory creation in dry-run mode.
    pub fn log_dry_run(&self) {
        log::info!(
            "dry-run: would ensure cache dir {}",
            self.cache_dir.display()
        );
    }
}

impl std::fmt::Display for AppPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "config: {}, cache: {}",
            self.config_file.display(),
            self.cache_dir.display()
        )
    }
}

/// Build the default cache file name for a corp/agent pair.
///
/// Characters outside `[A-Za-z0-9_-]` in the corp ID are replaced with `_`.
#[must_use]
pub fn token_cache_file_name(corp_id: &str, agent_id: u64) -> String {
    let corp: String = corp_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("token-{corp}-{agent_id}.json")
}

/// Expand a `PathBuf`, resolving ~ and environment variables.
///
/// # Errors
///
/// Returns an error if shell expansion fails.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    path.to_str()
        .map_or_else(|| Ok(path.to_path_buf()), expand_str_path)
}

/// Expand a string path, resolving ~ and environment variables.
///
/// # Errors
///
/// Returns an error if shell expansion fails.
pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// Get the default configuration directory (`XDG_CONFIG_HOME` or fallback).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Get the default cache directory (`XDG_CACHE_HOME` or fallback).
///
/// Falls back to the system temporary directory when no home is known.
///
/// # Errors
///
/// Returns an error if no usable directory can be determined.
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::cache_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".cache").join(APP_NAME));
    }

    let tmp = env::temp_dir();
    if tmp.as_os_str().is_empty() {
        return Err(anyhow!("unable to determine cache directory"));
    }
    Ok(tmp.join(APP_NAME))
}

/// Write the default configuration file to the specified path.
///
/// # Errors
///
/// Returns an error if the file cannot be written or the directory cannot be created.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml_str);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Credentials can also be set via COWECHAT__CREDENTIAL__CORP_ID,\n");
    buffer.push_str("# COWECHAT__CREDENTIAL__CORP_SECRET and COWECHAT__CREDENTIAL__AGENT_ID.\n");
    buffer.push('\n');
    buffer
}
