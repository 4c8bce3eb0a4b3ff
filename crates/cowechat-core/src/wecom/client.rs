//! WeCom application message client.
//!
//! Every request carries the access token as a query parameter. Messages are
//! posted to `message/send`; a message counts as delivered only when the
//! response reports `errcode == 0`. Failed attempts are repeated immediately
//! up to the configured retry count, fetching the token anew each time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::{DEFAULT_BASE_URL, DEFAULT_RETRY_COUNT};
use crate::paths::{default_cache_dir, token_cache_file_name};
use crate::sink::{EventSink, LogSink};
use crate::wecom::auth::TokenManager;
use crate::wecom::models::{
    ApiStatus, Credential, MediaKind, MessageKind, OutboundMessage, Recipients, SendReceipt,
};
use crate::wecom::storage::TokenCache;
use crate::wecom::transport::{ReqwestTransport, Transport};
use crate::{CoreError, Result};

/// Multipart field name expected by `media/upload`.
const UPLOAD_FIELD: &str = "media";

/// Client for sending application messages and uploading media.
#[derive(Debug, Clone)]
pub struct WeComClient {
    tokens: TokenManager,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    send_url: String,
    upload_url: String,
    retry_count: u32,
    safe: bool,
}

impl WeComClient {
    /// Message send endpoint path.
    pub const SEND_PATH: &'static str = "message/send";
    /// Temporary media upload endpoint path.
    pub const UPLOAD_PATH: &'static str = "media/upload";

    /// Start building a client for `credential`.
    #[must_use]
    pub fn builder(credential: Credential) -> WeComClientBuilder {
        WeComClientBuilder::new(credential)
    }

    /// The token manager used for every request.
    #[must_use]
    pub const fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Maximum attempts per message.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether messages are sent as confidential.
    #[must_use]
    pub const fn safe(&self) -> bool {
        self.safe
    }

    /// The sink receiving this client's events.
    #[must_use]
    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    /// Validate and assemble a message, recording any rejection to the sink.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of [`OutboundMessage::new`].
    pub fn prepare(
        &self,
        kind: MessageKind,
        recipients: Recipients,
        content: Option<&str>,
        media_id: Option<&str>,
    ) -> Result<OutboundMessage> {
        OutboundMessage::new(kind, recipients, content, media_id).inspect_err(|e| {
            self.sink.error(&format!("{kind} message rejected: {e}"));
        })
    }

    /// Send a message, retrying failed attempts up to the retry count.
    ///
    /// # Errors
    ///
    /// Returns a send error once every attempt failed. Token errors other than
    /// transport failures (bad credential, corrupt cache) abort immediately.
    pub fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        let kind = message.kind();
        let agent_id = self.tokens.credential().agent_id();
        let payload = serde_json::to_value(message.payload(agent_id, self.safe))?;

        self.sink.info(&format!(
            "start sending {kind} message: {}",
            message.body().summary()
        ));
        self.sink.debug(&format!("payload: {payload}"));

        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.retry_count {
            match self.send_once(&payload) {
                Ok(errmsg) => {
                    self.sink.info(&format!(
                        "{kind} message delivered on attempt {attempt}/{}: {errmsg}",
                        self.retry_count
                    ));
                    return Ok(SendReceipt {
                        attempts: attempt,
                        errmsg,
                    });
                }
                Err(e) if e.is_retryable() => {
                    self.sink.error(&format!(
                        "{kind} message attempt {attempt}/{} failed: {e}",
                        self.retry_count
                    ));
                    last_error = match e {
                        CoreError::Send { message, .. } => message,
                        other => other.to_string(),
                    };
                }
                Err(e) => {
                    self.sink
                        .error(&format!("{kind} message aborted, payload {payload}: {e}"));
                    return Err(e);
                }
            }
        }

        self.sink.error(&format!(
            "giving up on {kind} message after {} attempt(s), payload {payload}",
            self.retry_count
        ));
        Err(CoreError::Send {
            attempts: self.retry_count,
            message: last_error,
        })
    }

    /// Make a single delivery attempt with a freshly obtained token.
    ///
    /// Returns the provider's `errmsg` on success.
    ///
    /// # Errors
    ///
    /// Returns token errors as-is, a network error on transport failure, and a
    /// send error when the provider answers with a non-zero or missing `errcode`.
    pub fn send_once(&self, payload: &Value) -> Result<String> {
        let token = self.tokens.get_token()?;
        let response = self
            .transport
            .post_json(&self.send_url, &[("access_token", token.as_str())], payload)
            .map_err(|e| match e {
                CoreError::Serialization(msg) => CoreError::Send {
                    attempts: 1,
                    message: format!("unreadable response: {msg}"),
                },
                other => other,
            })?;
        self.sink.debug(&format!("send response: {response}"));

        let status: ApiStatus = serde_json::from_value(response).unwrap_or_default();
        if status.is_ok() {
            Ok(status.errmsg.unwrap_or_default())
        } else {
            Err(CoreError::Send {
                attempts: 1,
                message: status.describe(),
            })
        }
    }

    /// Upload a temporary media file and return the raw response body.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty path, token errors, an I/O
    /// error if the file cannot be read, or a network error.
    pub fn upload(&self, kind: MediaKind, path: &Path) -> Result<String> {
        if path.as_os_str().is_empty() {
            self.sink.error("upload requires a file path");
            return Err(CoreError::Validation("upload requires a file path".to_string()));
        }
        let token = self.tokens.get_token()?;
        let query = [("access_token", token.as_str()), ("type", kind.as_str())];
        let body = self
            .transport
            .post_file(&self.upload_url, &query, UPLOAD_FIELD, path)
            .inspect_err(|e| {
                self.sink
                    .error(&format!("uploading {kind} {} failed: {e}", path.display()));
            })?;
        self.sink
            .info(&format!("uploaded {kind} {}: {body}", path.display()));
        Ok(body)
    }

    /// Upload a temporary media file and return its media ID.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`WeComClient::upload`] and [`parse_media_id`].
    pub fn upload_media(&self, kind: MediaKind, path: &Path) -> Result<String> {
        let body = self.upload(kind, path)?;
        parse_media_id(&body)
    }
}

/// Extract `media_id` from a `media/upload` response body.
///
/// # Errors
///
/// Returns a serialization error for a non-JSON body and a send error if the
/// provider rejected the upload.
pub fn parse_media_id(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)?;
    let status: ApiStatus = serde_json::from_value(value.clone()).unwrap_or_default();
    value
        .get("media_id")
        .and_then(Value::as_str)
        .filter(|id| status.is_ok() && !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::Send {
            attempts: 1,
            message: format!("upload rejected: {}", status.describe()),
        })
}

/// Builder for [`WeComClient`].
#[derive(Debug)]
pub struct WeComClientBuilder {
    credential: Credential,
    base_url: String,
    cache_file: Option<PathBuf>,
    retry_count: u32,
    safe: bool,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl WeComClientBuilder {
    /// Start with defaults: public API endpoint, 5 attempts, non-confidential
    /// messages, `reqwest` transport and the `log` sink.
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_file: None,
            retry_count: DEFAULT_RETRY_COUNT,
            safe: false,
            timeout: None,
            transport: None,
            sink: None,
        }
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Token cache file. Defaults to a per-application file in the user cache directory.
    #[must_use]
    pub fn cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Maximum attempts per message; must be at least 1.
    #[must_use]
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Send messages as confidential.
    #[must_use]
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// HTTP timeout for the default transport.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the HTTP transport.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the event sink.
    #[must_use]
    pub fn sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero retry count, a path error if no
    /// cache directory can be determined, or a configuration error if the
    /// HTTP client cannot be created.
    pub fn build(self) -> Result<WeComClient> {
        if self.retry_count == 0 {
            return Err(CoreError::Validation(
                "retry_count must be at least 1".to_string(),
            ));
        }

        let cache_file = match self.cache_file {
            Some(path) => path,
            None => default_cache_dir()
                .map_err(|e| CoreError::Path(e.to_string()))?
                .join(token_cache_file_name(
                    self.credential.corp_id(),
                    self.credential.agent_id(),
                )),
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };
        let sink: Arc<dyn EventSink> = self.sink.unwrap_or_else(|| Arc::new(LogSink));

        let base_url = self.base_url.trim_end_matches('/').to_string();
        let tokens = TokenManager::new(
            self.credential,
            &base_url,
            TokenCache::new(cache_file),
            Arc::clone(&transport),
            Arc::clone(&sink),
        );

        Ok(WeComClient {
            tokens,
            transport,
            sink,
            send_url: format!("{base_url}/{}", WeComClient::SEND_PATH),
            upload_url: format!("{base_url}/{}", WeComClient::UPLOAD_PATH),
            retry_count: self.retry_count,
            safe: self.safe,
        })
    }
}
