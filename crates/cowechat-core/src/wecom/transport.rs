//! HTTP transport used by the client.
//!
//! The client talks to WeCom through the [`Transport`] trait so tests can
//! substitute a scripted implementation. [`ReqwestTransport`] is the blocking
//! production implementation.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response, multipart};
use serde_json::Value;

use crate::{CoreError, Result};

/// Query parameters as `(name, value)` pairs.
pub type Query<'a> = [(&'a str, &'a str)];

/// Blocking HTTP operations needed by the WeCom API.
pub trait Transport: fmt::Debug + Send + Sync {
    /// `GET url?query` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure and a serialization error
    /// if the body is not JSON.
    fn get_json(&self, url: &str, query: &Query<'_>) -> Result<Value>;

    /// `POST url?query` with a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::get_json`].
    fn post_json(&self, url: &str, query: &Query<'_>, body: &Value) -> Result<Value>;

    /// `POST url?query` with `path` as multipart form field `field`; returns
    /// the raw response body.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a network error on
    /// transport failure.
    fn post_file(&self, url: &str, query: &Query<'_>, field: &str, path: &Path) -> Result<String>;
}

/// [`Transport`] backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    /// Create a transport. `timeout` of `None` keeps the client default.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| CoreError::Config(format!("creating HTTP client: {e}")))?;
        Ok(Self { http_client })
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().unwrap_or_default();
    Err(CoreError::Network(format!("HTTP {status}: {text}")))
}

fn decode_json(response: Response) -> Result<Value> {
    check_status(response)?
        .json::<Value>()
        .map_err(|e| CoreError::Serialization(format!("parsing response: {e}")))
}

impl Transport for ReqwestTransport {
    fn get_json(&self, url: &str, query: &Query<'_>) -> Result<Value> {
        log::trace!("GET {url}");
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| CoreError::Network(format!("request failed: {e}")))?;
        decode_json(response)
    }

    fn post_json(&self, url: &str, query: &Query<'_>, body: &Value) -> Result<Value> {
        log::trace!("POST {url}");
        let response = self
            .http_client
            .post(url)
            .query(query)
            .json(body)
            .send()
            .map_err(|e| CoreError::Network(format!("request failed: {e}")))?;
        decode_json(response)
    }

    fn post_file(&self, url: &str, query: &Query<'_>, field: &str, path: &Path) -> Result<String> {
        log::trace!("POST {url} (multipart {})", path.display());
        let form = multipart::Form::new().file(field.to_string(), path)?;
        let response = self
            .http_client
            .post(url)
            .query(query)
            .multipart(form)
            .send()
            .map_err(|e| CoreError::Network(format!("upload failed: {e}")))?;
        check_status(response)?
            .text()
            .map_err(|e| CoreError::Network(format!("reading upload response: {e}")))
    }
}
