//! Decomposition of remote posts into normalized local posts and files.
//!
//! One fetched post becomes a collection post (owning the thumbnail) plus
//! one post per visible content item, each with its own file placeholders.
//! All writes are idempotent: identity lookups precede every insert, so
//! re-normalizing a post never duplicates rows or re-downloads binaries.

pub mod blog;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::api::{ApiPost, ContentPayload, FantiaClient, PostContent};
use crate::constants::{post_page_url, SOURCE_NAME};
use crate::db::{
    attach_tag, ensure_related, get_files_for_post, get_or_create_tag, get_post,
    get_post_by_original_id, insert_file, insert_post, update_post_content, update_tag_metadata,
    Database, NewPost, Post, PostFile, PostType, TagCategory,
};
use crate::store::{AssetNeeds, FileStore};

/// Converts fetched posts into normalized rows and drives the per-file
/// asset downloads. Holds no cursor or pagination state.
#[derive(Debug, Clone)]
pub struct Normalizer {
    db: Database,
    client: FantiaClient,
    store: FileStore,
    work_dir: PathBuf,
}

impl Normalizer {
    #[must_use]
    pub fn new(db: Database, client: FantiaClient, store: FileStore, work_dir: PathBuf) -> Self {
        Self {
            db,
            client,
            store,
            work_dir,
        }
    }

    /// Normalize one fetched post into an ordered list of local posts: the
    /// collection post first, then one post per visible content item in
    /// input order.
    ///
    /// When `existing` is a previously decomposed sub-content post, only
    /// that post is refreshed; if its content item is gone or hidden
    /// upstream the row is returned unchanged.
    ///
    /// # Errors
    ///
    /// Propagates database, download, and blog-parse failures.
    pub async fn normalize(
        &self,
        record: &ApiPost,
        existing: Option<Post>,
        preview: bool,
    ) -> Result<Vec<Post>> {
        info!(post_id = record.id, "normalizing post");

        if let Some(existing_post) = &existing {
            if let Some(content_id) = existing_post.content_id() {
                let content = record.post_contents.iter().find(|c| c.id == content_id);
                return match content {
                    Some(content) if content.is_visible() => Ok(vec![
                        self.content_to_post(record, content, existing.clone(), preview)
                            .await?,
                    ]),
                    // Removed or hidden upstream: nothing to update.
                    _ => Ok(vec![existing_post.clone()]),
                };
            }
        }

        let collection = match existing {
            Some(post) => post,
            None => self.ensure_collection_post(record).await?,
        };

        self.resolve_thumbnail(record, &collection, preview).await?;

        let mut results = vec![collection.clone()];
        for content in &record.post_contents {
            if !content.is_visible() {
                continue;
            }
            let content_post = self.content_to_post(record, content, None, preview).await?;
            ensure_related(self.db.pool(), collection.id, content_post.id).await?;
            results.push(content_post);
        }

        Ok(results)
    }

    /// Look up or create the collection post for a record.
    async fn ensure_collection_post(&self, record: &ApiPost) -> Result<Post> {
        let original_id = record.id.to_string();
        if let Some(post) =
            get_post_by_original_id(self.db.pool(), SOURCE_NAME, &original_id).await?
        {
            return Ok(post);
        }

        self.create_post_row(
            record,
            &original_id,
            record.title.clone(),
            record.comment.clone(),
            None,
        )
        .await
    }

    /// Insert a new post row and attach its tags. Used for both collection
    /// posts and content posts; only title, comment, and metadata differ.
    async fn create_post_row(
        &self,
        record: &ApiPost,
        original_id: &str,
        title: Option<String>,
        comment: Option<String>,
        metadata: Option<String>,
    ) -> Result<Post> {
        info!(original_id, "creating new post");

        let post_id = insert_post(
            self.db.pool(),
            &NewPost {
                source: SOURCE_NAME.to_string(),
                original_id: original_id.to_string(),
                url: Some(post_page_url(record.id)),
                title,
                comment,
                post_type: PostType::Collection,
                post_time: parse_post_time(&record.posted_at),
                favorite: record.liked == Some(true),
                metadata,
            },
        )
        .await?;

        self.attach_record_tags(record, post_id).await?;

        get_post(self.db.pool(), post_id)
            .await?
            .context("Inserted post disappeared")
    }

    /// Attach the artist, general, and meta tags derived from a record.
    async fn attach_record_tags(&self, record: &ApiPost, post_id: i64) -> Result<()> {
        // Creators are identified by id; the display name is kept as tag
        // metadata because it can change.
        let creator_id = record.fanclub.id.to_string();
        let creator_name = &record.fanclub.user.name;
        let artist_tag = get_or_create_tag(self.db.pool(), TagCategory::Artist, &creator_id).await?;
        attach_tag(self.db.pool(), post_id, artist_tag.id).await?;

        let mut tag_metadata: Map<String, Value> = artist_tag
            .metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        if tag_metadata.get("name").and_then(Value::as_str) != Some(creator_name.as_str()) {
            tag_metadata.insert("name".to_string(), json!(creator_name));
            update_tag_metadata(
                self.db.pool(),
                artist_tag.id,
                &Value::Object(tag_metadata).to_string(),
            )
            .await?;
        }

        for tag in &record.tags {
            let general_tag =
                get_or_create_tag(self.db.pool(), TagCategory::General, &tag.name).await?;
            attach_tag(self.db.pool(), post_id, general_tag.id).await?;
        }

        if record.is_adult() {
            let nsfw_tag = get_or_create_tag(self.db.pool(), TagCategory::Meta, "nsfw").await?;
            attach_tag(self.db.pool(), post_id, nsfw_tag.id).await?;
        }

        Ok(())
    }

    /// The collection post's single thumbnail placeholder at order 0,
    /// created once and resolved against the record's thumb descriptor.
    async fn resolve_thumbnail(
        &self,
        record: &ApiPost,
        collection: &Post,
        preview: bool,
    ) -> Result<()> {
        let files = get_files_for_post(self.db.pool(), collection.id).await?;
        let file = match files.into_iter().next() {
            Some(file) => file,
            None => {
                if record.thumb.is_none() {
                    return Ok(());
                }
                insert_file(self.db.pool(), collection.id, 0, None).await?
            }
        };

        let thumb = record.thumb.as_ref();
        self.resolve_file(
            &file,
            preview,
            thumb.map(|t| t.original.clone()),
            None,
            thumb.map(|t| t.medium.clone()),
        )
        .await
    }

    /// Normalize one content item into its own post, creating it if needed
    /// and resolving its files per category.
    async fn content_to_post(
        &self,
        record: &ApiPost,
        content: &PostContent,
        existing: Option<Post>,
        preview: bool,
    ) -> Result<Post> {
        let original_id = format!("{}-{}", record.id, content.id);
        info!(original_id, "normalizing content item");

        let post = match existing {
            Some(post) => post,
            None => {
                match get_post_by_original_id(self.db.pool(), SOURCE_NAME, &original_id).await? {
                    Some(post) => post,
                    None => {
                        let mut metadata = Map::new();
                        if let Some(plan) = &content.plan {
                            metadata.insert("price".to_string(), json!(plan.price));
                        }
                        self.create_post_row(
                            record,
                            &original_id,
                            content.title.clone(),
                            content.comment.clone(),
                            Some(Value::Object(metadata).to_string()),
                        )
                        .await?
                    }
                }
            }
        };

        match &content.payload {
            ContentPayload::File {
                filename,
                download_uri,
            } => {
                let files = get_files_for_post(self.db.pool(), post.id).await?;
                let file = match files.into_iter().next() {
                    Some(file) => file,
                    None => {
                        info!(post_id = post.id, filename, "found new file for post");
                        insert_file(self.db.pool(), post.id, 0, Some(filename.as_str())).await?
                    }
                };

                // The thumbnail comes from the parent record, not the
                // content item.
                self.resolve_file(
                    &file,
                    preview,
                    Some(self.client.absolute_url(download_uri)),
                    Some(filename.as_str()),
                    record.thumb.as_ref().map(|t| t.medium.clone()),
                )
                .await?;
            }

            ContentPayload::PhotoGallery {
                post_content_photos,
            } => {
                let mut current = self.files_by_order(post.id).await?;

                for photo in post_content_photos {
                    let file = match current.remove(&photo.id) {
                        Some(file) => file,
                        None => {
                            info!(post_id = post.id, order = photo.id, "found new file for post");
                            insert_file(self.db.pool(), post.id, photo.id, None).await?
                        }
                    };

                    self.resolve_file(
                        &file,
                        preview,
                        Some(photo.url.original.clone()),
                        None,
                        Some(photo.url.medium.clone()),
                    )
                    .await?;
                }
            }

            ContentPayload::Text => {
                update_post_content(
                    self.db.pool(),
                    post.id,
                    content.comment.as_deref(),
                    PostType::Set,
                )
                .await?;
            }

            ContentPayload::Blog => {
                let raw = content
                    .comment
                    .as_deref()
                    .with_context(|| format!("blog content {} has no body", content.id))?;
                let body = blog::parse_raw_body(raw)?;

                let mut current = self.files_by_order(post.id).await?;
                for image in &body.images {
                    let file = match current.remove(&image.order) {
                        Some(file) => file,
                        None => {
                            info!(
                                post_id = post.id,
                                order = image.order,
                                "found new file for post"
                            );
                            insert_file(self.db.pool(), post.id, image.order, None).await?
                        }
                    };

                    self.resolve_file(
                        &file,
                        preview,
                        Some(self.client.absolute_url(&image.original_uri)),
                        None,
                        Some(image.thumb_url.clone()),
                    )
                    .await?;
                }

                let comment = blog::serialize_comment(&body.segments)?;
                update_post_content(self.db.pool(), post.id, Some(comment.as_str()), PostType::Blog)
                    .await?;
            }
        }

        get_post(self.db.pool(), post.id)
            .await?
            .context("Normalized post disappeared")
    }

    async fn files_by_order(&self, post_id: i64) -> Result<HashMap<i64, PostFile>> {
        let files = get_files_for_post(self.db.pool(), post_id).await?;
        Ok(files
            .into_iter()
            .map(|file| (file.remote_order, file))
            .collect())
    }

    /// Download and import whatever the asset policy says is missing for a
    /// file placeholder. A side whose URL is unknown is skipped.
    async fn resolve_file(
        &self,
        file: &PostFile,
        preview: bool,
        original_url: Option<String>,
        original_filename: Option<&str>,
        thumb_url: Option<String>,
    ) -> Result<()> {
        let needs = AssetNeeds::evaluate(file, preview);
        if !needs.any() {
            return Ok(());
        }

        info!(
            file_id = file.id,
            original = needs.original,
            thumbnail = needs.thumbnail,
            "downloading files"
        );

        let original = match (needs.original, original_url) {
            (true, Some(url)) => Some(
                self.client
                    .download_to_temp(&url, original_filename, &self.work_dir)
                    .await?,
            ),
            _ => None,
        };
        let thumbnail = match (needs.thumbnail, thumb_url) {
            (true, Some(url)) => Some(
                self.client
                    .download_to_temp(&url, None, &self.work_dir)
                    .await?,
            ),
            _ => None,
        };

        self.store
            .import(self.db.pool(), file, original, thumbnail)
            .await
    }
}

/// Parse a remote timestamp into UTC RFC 3339. Timestamps arrive in ISO
/// 8601 or RFC 2822 form depending on the endpoint; an unparseable value is
/// logged and stored as absent rather than failing the post.
fn parse_post_time(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|t| t.with_timezone(&Utc));

    match parsed {
        Ok(time) => Some(time.to_rfc3339()),
        Err(_) => {
            warn!(raw, "unparseable post timestamp");
            None
        }
    }
}
