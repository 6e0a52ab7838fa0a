use serde::Deserialize;

/// Envelope around the post endpoint response.
#[derive(Debug, Deserialize)]
pub struct PostEnvelope {
    pub post: ApiPost,
}

/// Envelope around the fanclub endpoint response.
#[derive(Debug, Deserialize)]
pub struct FanclubEnvelope {
    pub fanclub: ApiFanclub,
}

/// One remote post as returned by `GET /api/v1/posts/{id}`.
#[derive(Debug, Deserialize)]
pub struct ApiPost {
    pub id: i64,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub posted_at: String,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub liked: Option<bool>,
    pub fanclub: ApiFanclub,
    #[serde(default)]
    pub tags: Vec<ApiTag>,
    #[serde(default)]
    pub thumb: Option<ApiThumb>,
    #[serde(default)]
    pub post_contents: Vec<PostContent>,
    #[serde(default)]
    pub links: PostLinks,
}

impl ApiPost {
    /// Whether the post is flagged as adult-only upstream.
    #[must_use]
    pub fn is_adult(&self) -> bool {
        self.rating.as_deref() == Some("adult")
    }
}

/// Creator information, embedded in posts and returned by the fanclub
/// endpoint. `recent_posts` is only populated by the latter.
#[derive(Debug, Deserialize)]
pub struct ApiFanclub {
    pub id: i64,
    pub user: ApiUser,
    #[serde(default)]
    pub recent_posts: Vec<PostRef>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiTag {
    pub name: String,
}

/// Thumbnail descriptor attached to a post.
#[derive(Debug, Deserialize)]
pub struct ApiThumb {
    pub original: String,
    pub medium: String,
}

/// Forward/backward references to adjacent posts by the same creator.
#[derive(Debug, Default, Deserialize)]
pub struct PostLinks {
    #[serde(default)]
    pub next: Option<PostRef>,
    #[serde(default)]
    pub previous: Option<PostRef>,
}

/// A bare reference to another post.
#[derive(Debug, Deserialize)]
pub struct PostRef {
    pub id: i64,
}

/// A sub-unit of a post. The payload is dispatched on the `category` field;
/// a category this decoder does not know fails the whole record loudly.
#[derive(Debug, Deserialize)]
pub struct PostContent {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub visible_status: Option<String>,
    #[serde(default)]
    pub plan: Option<ApiPlan>,
    #[serde(flatten)]
    pub payload: ContentPayload,
}

impl PostContent {
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible_status.as_deref() == Some("visible")
    }
}

/// Category-specific payload of a content item.
#[derive(Debug, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ContentPayload {
    /// A single downloadable file.
    File {
        filename: String,
        download_uri: String,
    },
    /// An ordered set of photos, each with its own id and URLs.
    PhotoGallery {
        #[serde(default)]
        post_content_photos: Vec<ApiPhoto>,
    },
    /// Plain text; the comment field carries the body.
    Text,
    /// Rich text; the comment field carries a serialized op list with
    /// interleaved text and image inserts.
    Blog,
}

/// One photo inside a `photo_gallery` content item.
#[derive(Debug, Deserialize)]
pub struct ApiPhoto {
    pub id: i64,
    pub url: PhotoUrl,
}

#[derive(Debug, Deserialize)]
pub struct PhotoUrl {
    pub original: String,
    pub medium: String,
}

/// Paywall plan attached to a content item; the price ends up in post
/// metadata.
#[derive(Debug, Deserialize)]
pub struct ApiPlan {
    pub price: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_file_content() {
        let json = r#"{
            "id": 45,
            "title": "a file",
            "visible_status": "visible",
            "category": "file",
            "filename": "a.png",
            "download_uri": "/posts/123/download/45"
        }"#;
        let content: PostContent = serde_json::from_str(json).unwrap();
        assert!(content.is_visible());
        match content.payload {
            ContentPayload::File {
                filename,
                download_uri,
            } => {
                assert_eq!(filename, "a.png");
                assert_eq!(download_uri, "/posts/123/download/45");
            }
            _ => panic!("expected file payload"),
        }
    }

    #[test]
    fn test_decode_gallery_content() {
        let json = r#"{
            "id": 46,
            "visible_status": "visible",
            "category": "photo_gallery",
            "post_content_photos": [
                {"id": 7, "url": {"original": "https://c.example/7/o.png", "medium": "https://c.example/7/m.png"}},
                {"id": 9, "url": {"original": "https://c.example/9/o.png", "medium": "https://c.example/9/m.png"}}
            ]
        }"#;
        let content: PostContent = serde_json::from_str(json).unwrap();
        match content.payload {
            ContentPayload::PhotoGallery {
                post_content_photos,
            } => {
                assert_eq!(post_content_photos.len(), 2);
                assert_eq!(post_content_photos[0].id, 7);
                assert_eq!(post_content_photos[1].id, 9);
            }
            _ => panic!("expected gallery payload"),
        }
    }

    #[test]
    fn test_unknown_category_is_an_error() {
        let json = r#"{"id": 47, "category": "embed", "visible_status": "visible"}"#;
        assert!(serde_json::from_str::<PostContent>(json).is_err());
    }

    #[test]
    fn test_decode_post_with_links() {
        let json = r#"{
            "id": 123,
            "title": "t",
            "comment": null,
            "posted_at": "2023-04-01T12:00:00+09:00",
            "rating": "adult",
            "fanclub": {"id": 9, "user": {"name": "creator"}},
            "tags": [{"name": "tag1"}],
            "links": {"next": {"id": 124}, "previous": null}
        }"#;
        let post: ApiPost = serde_json::from_str(json).unwrap();
        assert!(post.is_adult());
        assert_eq!(post.links.next.as_ref().map(|p| p.id), Some(124));
        assert!(post.links.previous.is_none());
        assert!(post.post_contents.is_empty());
    }
}
