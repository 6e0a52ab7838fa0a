//! Shared constants used across the application.

/// Identifier for the remote source, used in post identity lookups.
pub const SOURCE_NAME: &str = "fantia";

/// Default base URL for both the web pages and the JSON API.
pub const DEFAULT_BASE_URL: &str = "https://fantia.jp";

/// User agent sent with every API and download request.
///
/// A realistic browser user agent; some authenticated endpoints reject
/// obviously scripted clients.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:80.0) Gecko/20100101 Firefox/82.0";

/// Canonical page URL for a post, stored on normalized posts.
#[must_use]
pub fn post_page_url(post_id: i64) -> String {
    format!("{DEFAULT_BASE_URL}/posts/{post_id}")
}
