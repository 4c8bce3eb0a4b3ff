//! Core library for cowechat - WeCom application messaging.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant path resolution
//! - Schema and example config generation
//! - Access token acquisition with a local file cache
//! - Message delivery with a bounded retry budget, and media upload
//! - An injectable event sink for client observability
//! - Common types and error handling

pub mod config;
pub mod error;
pub mod paths;
pub mod schema;
pub mod sink;
pub mod wecom;

pub use config::{
    ApiConfig, AppConfig, CredentialConfig, DeliveryConfig, LogLevel, LoggingConfig, PathsConfig,
};
pub use error::{CoreError, Result};
pub use paths::{AppPaths, default_cache_dir, default_config_dir};
pub use schema::{generate_example_config, generate_schema, write_generated_files};
pub use sink::{EventSink, LogSink, MemorySink, SinkEvent};
pub use wecom::{
    CacheStatus, Credential, MediaKind, MessageBody, MessageKind, OutboundMessage, Recipients,
    ReqwestTransport, SendReceipt, TokenManager, Transport, WeComClient, WeComClientBuilder,
};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "cowechat";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
