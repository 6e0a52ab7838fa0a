//! Resolution of user-supplied references and single-post fetches.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::api::FantiaClient;
use crate::db::Post;
use crate::normalizer::Normalizer;

static POST_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://fantia\.jp/posts/(?P<post_id>\d+)(?:\?.*)?(?:#.*)?$")
        .expect("post url pattern")
});

static FANCLUB_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://fantia\.jp/fanclubs/(?P<fanclub_id>\d+)(?:/.*)?(?:\?.*)?(?:#.*)?$")
        .expect("fanclub url pattern")
});

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported reference: {0}")]
    Unsupported(String),
}

/// What a user-supplied reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedInput {
    /// A single post, by id.
    Post(i64),
    /// A creator's whole fanclub, by id.
    Creator(i64),
    /// Nothing this source can handle.
    Unsupported,
}

/// Classify a reference: a bare decimal id, a post URL, or a fanclub URL.
#[must_use]
pub fn resolve(input: &str) -> ResolvedInput {
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return input
            .parse()
            .map_or(ResolvedInput::Unsupported, ResolvedInput::Post);
    }

    if let Some(captures) = POST_URL_RE.captures(input) {
        if let Ok(id) = captures["post_id"].parse() {
            return ResolvedInput::Post(id);
        }
    }

    if let Some(captures) = FANCLUB_URL_RE.captures(input) {
        if let Ok(id) = captures["fanclub_id"].parse() {
            return ResolvedInput::Creator(id);
        }
    }

    ResolvedInput::Unsupported
}

/// Entry point for one-shot fetches and in-place refreshes of a single
/// post.
#[derive(Debug, Clone)]
pub struct SourceAdapter {
    client: FantiaClient,
    normalizer: Normalizer,
}

impl SourceAdapter {
    #[must_use]
    pub fn new(client: FantiaClient, normalizer: Normalizer) -> Self {
        Self { client, normalizer }
    }

    /// Fetch and normalize the post a reference points at, returning its
    /// collection post, or `None` if normalization produced nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unsupported`] for references that do not name
    /// a single post, and propagates transport and normalization failures.
    pub async fn fetch_one(&self, input: &str, preview: bool) -> Result<Option<Post>> {
        let post_id = match resolve(input) {
            ResolvedInput::Post(id) => id,
            _ => return Err(SourceError::Unsupported(input.to_string()).into()),
        };
        info!(post_id, "download request");

        let record = self.client.fetch_post(post_id).await?;
        let mut posts = self.normalizer.normalize(&record, None, preview).await?;

        Ok(if posts.is_empty() {
            None
        } else {
            Some(posts.remove(0))
        })
    }

    /// Re-fetch the record behind an existing post and update it in place.
    /// For a decomposed sub-content post the parent record is fetched and
    /// only the matching content item is refreshed.
    ///
    /// # Errors
    ///
    /// Propagates transport and normalization failures; a malformed post
    /// identity is an error.
    pub async fn refresh(&self, existing: Post, preview: bool) -> Result<Option<Post>> {
        let post_id = existing.remote_post_id()?;
        info!(post_id, original_id = %existing.original_id, "update request");

        let record = self.client.fetch_post(post_id).await?;
        let mut posts = self
            .normalizer
            .normalize(&record, Some(existing), preview)
            .await?;

        Ok(if posts.is_empty() {
            None
        } else {
            Some(posts.remove(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_id() {
        assert_eq!(resolve("123"), ResolvedInput::Post(123));
    }

    #[test]
    fn test_resolve_post_url() {
        assert_eq!(
            resolve("https://fantia.jp/posts/456"),
            ResolvedInput::Post(456)
        );
        assert_eq!(
            resolve("http://fantia.jp/posts/456?utm=x#frag"),
            ResolvedInput::Post(456)
        );
    }

    #[test]
    fn test_resolve_fanclub_url() {
        assert_eq!(
            resolve("https://fantia.jp/fanclubs/9"),
            ResolvedInput::Creator(9)
        );
        assert_eq!(
            resolve("https://fantia.jp/fanclubs/9/posts?page=2"),
            ResolvedInput::Creator(9)
        );
    }

    #[test]
    fn test_resolve_unsupported() {
        assert_eq!(resolve(""), ResolvedInput::Unsupported);
        assert_eq!(resolve("12a3"), ResolvedInput::Unsupported);
        assert_eq!(
            resolve("https://example.com/posts/1"),
            ResolvedInput::Unsupported
        );
        assert_eq!(
            resolve("https://fantia.jp/products/1"),
            ResolvedInput::Unsupported
        );
    }
}
