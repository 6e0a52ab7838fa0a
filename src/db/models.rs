use serde::{Deserialize, Serialize};

use crate::paginator::FetchDirection;

/// Type tag of a normalized post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    /// A whole remote post, or a single-file content item.
    Collection,
    /// A text-only content item.
    Set,
    /// A rich-text content item with interleaved text and images.
    Blog,
}

impl PostType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Set => "set",
            Self::Blog => "blog",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "collection" => Some(Self::Collection),
            "set" => Some(Self::Set),
            "blog" => Some(Self::Blog),
            _ => None,
        }
    }
}

/// Tag namespace. Artist tags are keyed by the stable creator id, not the
/// display name, because names change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    Artist,
    General,
    Meta,
}

impl TagCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::General => "general",
            Self::Meta => "meta",
        }
    }
}

/// A normalized post row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub source: String,
    pub original_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub post_type: String,
    pub post_time: Option<String>,
    pub favorite: bool,
    pub metadata: Option<String>,
    pub created_at: String,
}

impl Post {
    #[must_use]
    pub fn post_type_enum(&self) -> Option<PostType> {
        PostType::from_str(&self.post_type)
    }

    /// The remote post id embedded in this post's identity, with the
    /// sub-content suffix stripped if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is not of a recognized shape.
    pub fn remote_post_id(&self) -> anyhow::Result<i64> {
        let head = self
            .original_id
            .split('-')
            .next()
            .unwrap_or(&self.original_id);
        head.parse()
            .map_err(|_| anyhow::anyhow!("malformed original_id: {}", self.original_id))
    }

    /// The content item id of this post, if it was decomposed from one.
    #[must_use]
    pub fn content_id(&self) -> Option<i64> {
        let mut parts = self.original_id.split('-');
        let _post_id = parts.next()?;
        let content = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        content.parse().ok()
    }
}

/// A file placeholder row. At most one exists per (post, remote_order).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostFile {
    pub id: i64,
    pub post_id: i64,
    pub remote_order: i64,
    pub filename: Option<String>,
    pub present: bool,
    pub thumb_present: bool,
    pub original_key: Option<String>,
    pub thumb_key: Option<String>,
    pub created_at: String,
}

/// A tag row, unique by (category, name).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub category: String,
    pub name: String,
    pub metadata: Option<String>,
}

/// A durable subscription to one creator's posts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub creator_id: i64,
    pub head_id: Option<i64>,
    pub tail_id: Option<i64>,
    pub created_at: String,
}

impl Subscription {
    #[must_use]
    pub fn cursor(&self) -> CursorState {
        CursorState {
            head_id: self.head_id,
            tail_id: self.tail_id,
        }
    }
}

/// The pagination cursor: newest and oldest record ids seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub head_id: Option<i64>,
    pub tail_id: Option<i64>,
}

impl CursorState {
    /// The id pagination resumes from for a direction.
    #[must_use]
    pub fn id_for(&self, direction: FetchDirection) -> Option<i64> {
        match direction {
            FetchDirection::Newer => self.head_id,
            FetchDirection::Older => self.tail_id,
        }
    }

    /// Seed both ends with the first known record id.
    pub fn seed(&mut self, post_id: i64) {
        self.head_id = Some(post_id);
        self.tail_id = Some(post_id);
    }

    /// Advance the end matching the walking direction.
    pub fn advance(&mut self, direction: FetchDirection, post_id: i64) {
        match direction {
            FetchDirection::Newer => self.head_id = Some(post_id),
            FetchDirection::Older => self.tail_id = Some(post_id),
        }
    }
}

/// Data for inserting a new normalized post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub source: String,
    pub original_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub post_type: PostType,
    pub post_time: Option<String>,
    pub favorite: bool,
    pub metadata: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_identity(original_id: &str) -> Post {
        Post {
            id: 1,
            source: "fantia".to_string(),
            original_id: original_id.to_string(),
            url: None,
            title: None,
            comment: None,
            post_type: "collection".to_string(),
            post_time: None,
            favorite: false,
            metadata: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_identity_parsing() {
        let collection = post_with_identity("123");
        assert_eq!(collection.remote_post_id().unwrap(), 123);
        assert_eq!(collection.content_id(), None);

        let content = post_with_identity("123-45");
        assert_eq!(content.remote_post_id().unwrap(), 123);
        assert_eq!(content.content_id(), Some(45));

        let malformed = post_with_identity("abc");
        assert!(malformed.remote_post_id().is_err());
    }

    #[test]
    fn test_cursor_seed_and_advance() {
        let mut cursor = CursorState::default();
        assert_eq!(cursor.id_for(FetchDirection::Newer), None);

        cursor.seed(10);
        assert_eq!(cursor.head_id, Some(10));
        assert_eq!(cursor.tail_id, Some(10));

        cursor.advance(FetchDirection::Older, 8);
        assert_eq!(cursor.head_id, Some(10));
        assert_eq!(cursor.tail_id, Some(8));

        cursor.advance(FetchDirection::Newer, 12);
        assert_eq!(cursor.head_id, Some(12));
    }

    #[test]
    fn test_post_type_round_trip() {
        for t in [PostType::Collection, PostType::Set, PostType::Blog] {
            assert_eq!(PostType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(PostType::from_str("unknown"), None);
    }
}
