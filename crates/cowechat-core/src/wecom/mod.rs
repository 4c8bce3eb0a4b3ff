//! WeCom API client and token management.
//!
//! This module provides:
//! - Access token acquisition with a file-backed cache
//! - Message payload models
//! - A transport seam over the HTTP calls
//! - The retrying message dispatcher and media upload

pub mod auth;
pub mod client;
pub mod models;
pub mod storage;
pub mod transport;

pub use auth::TokenManager;
pub use client::{WeComClient, WeComClientBuilder, parse_media_id};
pub use models::{
    Credential, MediaKind, MessageBody, MessageKind, OutboundMessage, Recipients, SendReceipt,
};
pub use storage::{CacheStatus, CachedToken, TokenCache};
pub use transport::{ReqwestTransport, Transport};
