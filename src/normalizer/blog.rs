//! Parsing and re-serialization of blog content bodies.
//!
//! A blog content item carries its body as a serialized op list, each op an
//! `insert` that is either literal text or an object referencing an inline
//! image. The normalized comment stores an ordered list of `{text|file}`
//! segments mirroring the input order; serializing and re-parsing that list
//! is order-preserving.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One normalized segment of a blog post body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlogSegment {
    Text { content: String },
    File { order: i64 },
}

/// An inline image reference found while parsing raw ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogImage {
    pub order: i64,
    /// Download URI, relative to the API base.
    pub original_uri: String,
    /// Thumbnail URL, absolute.
    pub thumb_url: String,
}

/// The parsed body of a blog content item: segments in input order, plus
/// the image references they mention.
#[derive(Debug, Default)]
pub struct BlogBody {
    pub segments: Vec<BlogSegment>,
    pub images: Vec<BlogImage>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    ops: Vec<RawOp>,
}

#[derive(Debug, Deserialize)]
struct RawOp {
    insert: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct NormalizedComment {
    comment: Vec<BlogSegment>,
}

/// Parse the raw op list of a blog content item.
///
/// Ops of unknown shape are logged and dropped; they never fail the post.
///
/// # Errors
///
/// Returns an error if the body is not a valid op document at all.
pub fn parse_raw_body(raw: &str) -> Result<BlogBody> {
    let document: RawDocument =
        serde_json::from_str(raw).context("Failed to parse blog body document")?;

    let mut body = BlogBody::default();
    for op in document.ops {
        match op.insert {
            Value::String(text) => body.segments.push(BlogSegment::Text { content: text }),
            Value::Object(ref fields) => match fields.get("fantiaImage").and_then(parse_image) {
                Some(image) => {
                    body.segments.push(BlogSegment::File { order: image.order });
                    body.images.push(image);
                }
                None => warn!(insert = %op.insert, "unknown blog insert, dropping"),
            },
            other => warn!(insert = %other, "unknown blog insert, dropping"),
        }
    }

    Ok(body)
}

fn parse_image(value: &Value) -> Option<BlogImage> {
    let order = match value.get("id")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some(BlogImage {
        order,
        original_uri: value.get("original_url")?.as_str()?.to_string(),
        thumb_url: value.get("url")?.as_str()?.to_string(),
    })
}

/// Serialize segments into the normalized comment document.
///
/// # Errors
///
/// Returns an error if serialization fails, which would indicate a bug.
pub fn serialize_comment(segments: &[BlogSegment]) -> Result<String> {
    serde_json::to_string(&NormalizedComment {
        comment: segments.to_vec(),
    })
    .context("Failed to serialize blog comment")
}

/// Parse a previously normalized comment document back into segments.
///
/// # Errors
///
/// Returns an error if the document is not a normalized comment.
pub fn parse_comment(raw: &str) -> Result<Vec<BlogSegment>> {
    let document: NormalizedComment =
        serde_json::from_str(raw).context("Failed to parse normalized blog comment")?;
    Ok(document.comment)
}
