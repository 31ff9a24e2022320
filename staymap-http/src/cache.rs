//! Filesystem response cache.
//!
//! One JSON document per URL, named after the blake3 hash of the URL and
//! sharded by its first two hex characters:
//! `<dir>/ab/ab34…ef.json`.

use crate::HttpError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use staymap_config::HttpCacheConfig;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    /// Where the request ended up after redirects; empty means `url`.
    #[serde(default)]
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// The URL the cached body was served from.
    pub fn served_from(&self) -> Result<Url, HttpError> {
        let raw = if self.final_url.is_empty() {
            &self.url
        } else {
            &self.final_url
        };
        Url::parse(raw).map_err(|e| HttpError::Cache(format!("{raw}: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct HttpCache {
    dir: PathBuf,
    expiration: Option<Duration>,
    ignore_statuses: Vec<u16>,
}

impl HttpCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            expiration: None,
            ignore_statuses: Vec::new(),
        }
    }

    /// `None` when caching is switched off.
    pub fn from_config(cfg: &HttpCacheConfig) -> Option<Self> {
        cfg.enabled.then(|| {
            Self::new(cfg.dir.clone())
                .with_expiration(cfg.expiration())
                .with_ignored_statuses(cfg.ignore_http_codes.clone())
        })
    }

    pub fn with_expiration(mut self, expiration: Option<Duration>) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_ignored_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.ignore_statuses = statuses;
        self
    }

    fn entry_path(&self, url: &Url) -> PathBuf {
        let key = blake3::hash(url.as_str().as_bytes()).to_hex().to_string();
        self.dir.join(&key[..2]).join(format!("{key}.json"))
    }

    fn is_expired(&self, entry: &CachedResponse, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.expiration else {
            return false;
        };
        let age = now.signed_duration_since(entry.stored_at);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }

    /// Look up a fresh entry for `url`.
    pub async fn load(&self, url: &Url) -> Result<Option<CachedResponse>, HttpError> {
        let path = self.entry_path(url);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HttpError::Cache(format!("{}: {e}", path.display()))),
        };
        let entry: CachedResponse = serde_json::from_slice(&raw)
            .map_err(|e| HttpError::Cache(format!("{}: {e}", path.display())))?;

        // entry written for a different URL (hand-edited or moved file)
        if entry.url != url.as_str() || self.is_expired(&entry, Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Persist the response to a request for `url` that was answered by
    /// `final_url`. Returns `false` when the status is configured to be skipped.
    pub async fn store(
        &self,
        url: &Url,
        final_url: &Url,
        status: u16,
        body: &str,
    ) -> Result<bool, HttpError> {
        if self.ignore_statuses.contains(&status) {
            return Ok(false);
        }
        let path = self.entry_path(url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HttpError::Cache(format!("{}: {e}", parent.display())))?;
        }
        let entry = CachedResponse {
            url: url.to_string(),
            final_url: final_url.to_string(),
            status,
            body: body.to_string(),
            stored_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| HttpError::Cache(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| HttpError::Cache(format!("{}: {e}", path.display())))?;
        Ok(true)
    }
}
