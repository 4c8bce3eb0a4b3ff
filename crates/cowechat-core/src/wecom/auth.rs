//! Access token acquisition for WeCom applications.
//!
//! A token is requested from `gettoken` with the corp ID and application
//! secret and is valid for two hours. The last response is kept in a
//! [`TokenCache`] file so repeated invocations reuse it instead of
//! authenticating again:
//!
//! 1. If the cache holds an `ok` record younger than two hours, read the token from it
//! 2. Otherwise fetch a new token and overwrite the cache

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::sink::EventSink;
use crate::wecom::models::{ApiStatus, Credential};
use crate::wecom::storage::{CacheStatus, CachedToken, TOKEN_LIFETIME_SECS, TokenCache, local_now};
use crate::wecom::transport::Transport;
use crate::{CoreError, Result};

/// Acquires, validates and persists the access token.
#[derive(Debug, Clone)]
pub struct TokenManager {
    credential: Credential,
    token_url: String,
    cache: TokenCache,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
}

impl TokenManager {
    /// Token endpoint path relative to the API base URL.
    pub const TOKEN_PATH: &'static str = "gettoken";

    /// Create a token manager.
    #[must_use]
    pub fn new(
        credential: Credential,
        base_url: &str,
        cache: TokenCache,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            credential,
            token_url: format!("{}/{}", base_url.trim_end_matches('/'), Self::TOKEN_PATH),
            cache,
            transport,
            sink,
        }
    }

    /// The application credential.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The backing cache.
    #[must_use]
    pub const fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a usable access token, from the cache when it is still valid
    /// and from the token endpoint otherwise.
    ///
    /// # Errors
    ///
    /// Returns a cache-corrupt error if a valid-looking cache lacks the token,
    /// a network error if the endpoint is unreachable, or an authentication
    /// error if the endpoint answers without a token.
    pub fn get_token(&self) -> Result<String> {
        if self.is_cache_valid() {
            self.read_cached_token()
        } else {
            self.fetch_remote_token()
        }
    }

    /// Whether the cache holds a usable token right now.
    #[must_use]
    pub fn is_cache_valid(&self) -> bool {
        self.is_cache_valid_at(local_now())
    }

    /// Whether the cache holds a usable token at `now`.
    ///
    /// A missing, unreadable or undated cache is invalid, as is any record whose
    /// `errmsg` is not `"ok"` or whose age reached the token lifetime.
    #[must_use]
    pub fn is_cache_valid_at(&self, now: NaiveDateTime) -> bool {
        let record = match self.cache.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.sink.info("token cache not found");
                return false;
            }
            Err(e) => {
                self.sink.error(&format!("token cache unreadable: {e}"));
                return false;
            }
        };

        if !record.is_ok() {
            self.sink.error(&format!(
                "token cache holds an error response: {}",
                record.errmsg.as_deref().unwrap_or("<no errmsg>")
            ));
            return false;
        }

        match record.age_at(now) {
            None => {
                self.sink.error("token cache has no usable date");
                false
            }
            Some(age) if age.num_seconds() >= TOKEN_LIFETIME_SECS => {
                self.sink.info("cached token expired, requesting a new one");
                false
            }
            Some(_) => {
                self.sink.info("cached token is valid");
                true
            }
        }
    }

    /// Read the token from the cache file.
    ///
    /// # Errors
    ///
    /// Returns a cache-corrupt error if the file is missing, unparseable, or
    /// has no `access_token`.
    pub fn read_cached_token(&self) -> Result<String> {
        let record = self.cache.load()?.ok_or_else(|| {
            CoreError::CacheCorrupt(format!("{} disappeared", self.cache.path().display()))
        })?;
        self.sink.debug(&format!(
            "cache record: errcode={:?} errmsg={:?} date={:?}",
            record.errcode, record.errmsg, record.date
        ));

        match record.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.sink.info("using access token from cache");
                Ok(token)
            }
            None => {
                let err = CoreError::CacheCorrupt(format!(
                    "{} has no access_token field",
                    self.cache.path().display()
                ));
                self.sink.error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Request a new token and persist the full response to the cache.
    ///
    /// A failure to write the cache is recorded but does not fail the call.
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure, or an authentication
    /// error if the response is malformed or carries no token.
    pub fn fetch_remote_token(&self) -> Result<String> {
        let query = [
            ("corpid", self.credential.corp_id()),
            ("corpsecret", self.credential.corp_secret()),
        ];
        let response = self
            .transport
            .get_json(&self.token_url, &query)
            .map_err(|e| match e {
                CoreError::Serialization(msg) => {
                    CoreError::Auth(format!("malformed token response: {msg}"))
                }
                other => other,
            })
            .inspect_err(|e| self.sink.error(&format!("token request failed: {e}")))?;

        let status: ApiStatus = serde_json::from_value(response.clone()).unwrap_or_default();
        self.sink.debug(&format!(
            "token response: errcode={:?} errmsg={:?}",
            status.errcode, status.errmsg
        ));

        let Some(token) = response
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
        else {
            let err =
                CoreError::Auth(format!("no access_token in response ({})", status.describe()));
            self.sink.error(&err.to_string());
            return Err(err);
        };

        let record = CachedToken::from_response(response, local_now())?;
        if let Err(e) = self.cache.store(&record) {
            self.sink.error(&format!(
                "failed to write token cache {}: {e}",
                self.cache.path().display()
            ));
        }
        self.sink.info("obtained access token from token endpoint");
        Ok(token)
    }

    /// Current cache contents and validity, or `None` without a cache file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be read or parsed.
    pub fn cache_status(&self) -> Result<Option<CacheStatus>> {
        self.cache.status_at(local_now())
    }

    /// Remove the cache file, forcing the next call to fetch a new token.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn clear_cache(&self) -> Result<bool> {
        let removed = self.cache.clear()?;
        if removed {
            self.sink.info("token cache cleared");
        }
        Ok(removed)
    }
}
