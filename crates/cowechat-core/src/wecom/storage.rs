//! File-backed storage for the access token.
//!
//! The cache holds the last token endpoint response verbatim plus a `date`
//! field recording when it was obtained, e.g.
//!
//! ```json
//! { "errcode": 0, "errmsg": "ok", "access_token": "...", "expires_in": 7200, "date": "2024-05-01 093000" }
//! ```

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::{CoreError, Result};

/// Seconds an access token stays valid after it was obtained.
pub const TOKEN_LIFETIME_SECS: i64 = 7200;

/// Format of the `date` field (local time).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H%M%S";

/// Current local time as stored in the cache.
#[must_use]
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// The persisted token record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// The access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Provider error code of the response the token came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errcode: Option<i64>,
    /// Provider message; `"ok"` marks a usable record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    /// When the token was obtained, formatted with [`DATE_FORMAT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Any other response fields (`expires_in`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedToken {
    /// Build a record from a token endpoint response, stamped with `obtained_at`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the response is not a JSON object.
    pub fn from_response(response: Value, obtained_at: NaiveDateTime) -> Result<Self> {
        let mut record: Self = serde_json::from_value(response)?;
        record.date = Some(obtained_at.format(DATE_FORMAT).to_string());
        Ok(record)
    }

    /// True when the provider reported `errmsg == "ok"`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errmsg.as_deref() == Some("ok")
    }

    /// Parsed `date` field.
    #[must_use]
    pub fn obtained_at(&self) -> Option<NaiveDateTime> {
        self.date
            .as_deref()
            .and_then(|d| NaiveDateTime::parse_from_str(d, DATE_FORMAT).ok())
    }

    /// Time elapsed between obtaining the token and `now`.
    #[must_use]
    pub fn age_at(&self, now: NaiveDateTime) -> Option<TimeDelta> {
        self.obtained_at().map(|at| now.signed_duration_since(at))
    }

    /// Whether the record can be used at `now`: status ok and younger than
    /// [`TOKEN_LIFETIME_SECS`].
    #[must_use]
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.is_ok()
            && self
                .age_at(now)
                .is_some_and(|age| age.num_seconds() < TOKEN_LIFETIME_SECS)
    }
}

/// Snapshot of the cache for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// The stored record.
    pub record: CachedToken,
    /// Age of the record, if its date parses.
    pub age: Option<TimeDelta>,
    /// Whether the record would be used.
    pub valid: bool,
}

impl CacheStatus {
    /// Seconds until the token expires, if it is still valid.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<i64> {
        if !self.valid {
            return None;
        }
        self.age.map(|age| TOKEN_LIFETIME_SECS - age.num_seconds())
    }
}

/// Single-record JSON file holding the current token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Create a cache backed by `path`. Nothing is read or written yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the cache file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the record.
    ///
    /// Returns `Ok(None)` when no cache file exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a cache-corrupt
    /// error if it does not hold a JSON object.
    pub fn load(&self) -> Result<Option<CachedToken>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map(Some).map_err(|e| {
            CoreError::CacheCorrupt(format!("{}: {e}", self.path.display()))
        })
    }

    /// Overwrite the record.
    ///
    /// Each call writes its own uniquely named temporary file in the cache
    /// directory and renames it into place, so concurrent writers never
    /// share a partially written file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn store(&self, record: &CachedToken) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }

    /// Delete the cache file. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing file cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Describe the cache as seen at `now`.
    ///
    /// # Errors
    ///
    /// See [`TokenCache::load`].
    pub fn status_at(&self, now: NaiveDateTime) -> Result<Option<CacheStatus>> {
        Ok(self.load()?.map(|record| CacheStatus {
            age: record.age_at(now),
            valid: record.is_valid_at(now),
            record,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, DATE_FORMAT).expect("date")
    }

    fn ok_record(obtained: &str) -> CachedToken {
        CachedToken::from_response(
            json!({"errcode": 0, "errmsg": "ok", "access_token": "TOKEN", "expires_in": 7200}),
            at(obtained),
        )
        .expect("record")
    }

    #[test]
    fn validity_window_is_exactly_two_hours() {
        let record = ok_record("2024-05-01 090000");
        assert!(record.is_valid_at(at("2024-05-01 090000")));
        assert!(record.is_valid_at(at("2024-05-01 105959")));
        assert!(!record.is_valid_at(at("2024-05-01 110000")));
        assert!(!record.is_valid_at(at("2024-05-02 090000")));
    }

    #[test]
    fn error_status_is_never_valid() {
        let mut record = ok_record("2024-05-01 090000");
        record.errmsg = Some("invalid credential".to_string());
        assert!(!record.is_valid_at(at("2024-05-01 090001")));
    }

    #[test]
    fn missing_or_malformed_date_is_invalid() {
        let mut record = ok_record("2024-05-01 090000");
        record.date = Some("yesterday".to_string());
        assert!(!record.is_valid_at(at("2024-05-01 090001")));
        record.date = None;
        assert!(!record.is_valid_at(at("2024-05-01 090001")));
    }

    #[test]
    fn store_then_load_preserves_extra_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TokenCache::new(dir.path().join("sub").join("token.json"));
        assert!(cache.load().expect("load").is_none());

        let record = ok_record("2024-05-01 090000");
        cache.store(&record).expect("store");
        let loaded = cache.load().expect("load").expect("record");
        assert_eq!(loaded, record);
        assert_eq!(loaded.extra.get("expires_in"), Some(&json!(7200)));

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).expect("read")).expect("json");
        assert_eq!(raw["date"], "2024-05-01 090000");
    }

    #[test]
    fn garbage_file_is_reported_corrupt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TokenCache::new(dir.path().join("token.json"));
        fs::write(cache.path(), "not json").expect("write");
        assert!(matches!(cache.load(), Err(CoreError::CacheCorrupt(_))));
    }

    #[test]
    fn clear_reports_whether_a_file_existed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache.store(&ok_record("2024-05-01 090000")).expect("store");
        assert!(cache.clear().expect("clear"));
        assert!(!cache.clear().expect("clear again"));
        assert!(!cache.exists());
    }

    #[test]
    fn records_compare_by_value() {
        fn total_eq<T: Eq>(_: &T) {}
        let record = ok_record("2024-05-01 090000");
        let status = CacheStatus {
            age: record.age_at(at("2024-05-01 090100")),
            valid: true,
            record: record.clone(),
        };
        total_eq(&record);
        total_eq(&status);
        assert_eq!(status.clone(), status);
        assert_eq!(status.remaining_secs(), Some(7140));
    }

    #[test]
    fn concurrent_writers_never_expose_partial_records() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TokenCache::new(dir.path().join("token.json"));
        let record = ok_record("2024-05-01 090000");
        cache.store(&record).expect("initial store");

        let writers: Vec<_> = (0..2)
            .map(|_| {
                let cache = cache.clone();
                let record = record.clone();
                std::thread::spawn(move || {
                    for _ in 0..300 {
                        cache.store(&record).expect("store");
                    }
                })
            })
            .collect();

        let mut corrupt = 0;
        for _ in 0..3000 {
            match cache.load() {
                Ok(Some(loaded)) => assert_eq!(loaded, record),
                Err(CoreError::CacheCorrupt(_)) => corrupt += 1,
                other => panic!("unexpected load result: {other:?}"),
            }
        }
        for writer in writers {
            writer.join().expect("writer thread");
        }

        assert_eq!(corrupt, 0);
        let leftovers = fs::read_dir(dir.path()).expect("list dir").count();
        assert_eq!(leftovers, 1, "temporary files are renamed away");
    }

    #[test]
    fn status_reports_remaining_lifetime() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache.store(&ok_record("2024-05-01 090000")).expect("store");
        let status = cache
            .status_at(at("2024-05-01 100000"))
            .expect("status")
            .expect("present");
        assert!(status.valid);
        assert_eq!(status.remaining_secs(), Some(3600));
    }
}
