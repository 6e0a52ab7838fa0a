//! HTTP client for the Fantia JSON API and file downloads.
//!
//! Calls are strictly sequential and carry the `_session_id` cookie; any
//! non-success status is surfaced as an error. Retry and backoff are not
//! handled at this layer.

mod models;

pub use models::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, ORIGIN, REFERER};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::Config;
use crate::constants::USER_AGENT;

/// Client for the remote API. Cheap to clone; the underlying connection
/// pool is shared.
#[derive(Debug, Clone)]
pub struct FantiaClient {
    http: reqwest::Client,
    base_url: String,
}

impl FantiaClient {
    /// Build a client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cookie is not a valid header value or
    /// the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(&config.base_url)?);
        headers.insert(REFERER, HeaderValue::from_str(&config.base_url)?);
        let cookie = format!("_session_id={}", config.session_id);
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&cookie).context("Session id is not a valid cookie value")?,
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a single post document by id.
    ///
    /// # Errors
    ///
    /// Returns an error on any non-success status (including a deleted or
    /// inaccessible post) and on schema mismatches, which include content
    /// items with an unrecognized category.
    pub async fn fetch_post(&self, post_id: i64) -> Result<ApiPost> {
        let url = format!("{}/api/v1/posts/{post_id}", self.base_url);
        let envelope: PostEnvelope = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch post {post_id}"))?
            .error_for_status()
            .with_context(|| format!("Post {post_id} request was rejected"))?
            .json()
            .await
            .with_context(|| format!("Failed to decode post {post_id}"))?;
        Ok(envelope.post)
    }

    /// Fetch a fanclub summary by id, including the creator's most recent
    /// post references.
    ///
    /// # Errors
    ///
    /// Returns an error on any non-success status or schema mismatch.
    pub async fn fetch_fanclub(&self, fanclub_id: i64) -> Result<ApiFanclub> {
        let url = format!("{}/api/v1/fanclubs/{fanclub_id}", self.base_url);
        let envelope: FanclubEnvelope = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch fanclub {fanclub_id}"))?
            .error_for_status()
            .with_context(|| format!("Fanclub {fanclub_id} request was rejected"))?
            .json()
            .await
            .with_context(|| format!("Failed to decode fanclub {fanclub_id}"))?;
        Ok(envelope.fanclub)
    }

    /// Resolve a possibly-relative download URI against the API base.
    #[must_use]
    pub fn absolute_url(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}{uri}", self.base_url)
        }
    }

    /// Download a binary into a fresh temp file under `work_dir` and return
    /// the owned temp path. The file is deleted when the path is dropped
    /// without being persisted, so a crash mid-transfer leaves at most an
    /// orphaned temp file.
    ///
    /// # Errors
    ///
    /// Returns an error on any non-success status or I/O failure.
    pub async fn download_to_temp(
        &self,
        url: &str,
        filename: Option<&str>,
        work_dir: &Path,
    ) -> Result<TempPath> {
        debug!(url, "downloading");

        let suffix = match filename {
            Some(name) => format!("-{name}"),
            None => url_extension(url).unwrap_or_default(),
        };

        let temp = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile_in(work_dir)
            .with_context(|| format!("Failed to create temp file in {}", work_dir.display()))?
            .into_temp_path();

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {url}"))?
            .error_for_status()
            .with_context(|| format!("Download of {url} was rejected"))?;

        let mut file = tokio::fs::File::create(&temp)
            .await
            .with_context(|| format!("Failed to open temp file {}", temp.display()))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed reading body of {url}"))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed writing temp file {}", temp.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed flushing temp file {}", temp.display()))?;

        Ok(temp)
    }
}

/// Extension (with leading dot) of the path component of a URL, if any.
fn url_extension(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let path = parsed.path();
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        None
    } else {
        Some(format!(".{ext}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_extension() {
        assert_eq!(
            url_extension("https://c.example/images/pic.png?token=x"),
            Some(".png".to_string())
        );
        assert_eq!(url_extension("https://c.example/images/pic"), None);
        assert_eq!(url_extension("not a url"), None);
    }

    #[test]
    fn test_absolute_url_joins_relative_uris() {
        let config = crate::config::Config {
            base_url: "https://fantia.jp".to_string(),
            ..crate::config::Config::for_testing()
        };
        let client = FantiaClient::new(&config).unwrap();
        assert_eq!(
            client.absolute_url("/posts/1/download/2"),
            "https://fantia.jp/posts/1/download/2"
        );
        assert_eq!(
            client.absolute_url("https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }
}
