use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{CursorState, NewPost, Post, PostFile, PostType, Subscription, Tag, TagCategory};

// ========== Posts ==========

/// Get a post by its remote identity.
pub async fn get_post_by_original_id(
    pool: &SqlitePool,
    source: &str,
    original_id: &str,
) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE source = ? AND original_id = ?")
        .bind(source)
        .bind(original_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post by original id")
}

/// Get a post by its local id.
pub async fn get_post(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// Insert a new post, returning its ID.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (source, original_id, url, title, comment, post_type, post_time, favorite, metadata)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&post.source)
    .bind(&post.original_id)
    .bind(&post.url)
    .bind(&post.title)
    .bind(&post.comment)
    .bind(post.post_type.as_str())
    .bind(&post.post_time)
    .bind(post.favorite)
    .bind(&post.metadata)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Rewrite a post's comment and type, used when a content item resolves to
/// a `set` or `blog` post.
pub async fn update_post_content(
    pool: &SqlitePool,
    id: i64,
    comment: Option<&str>,
    post_type: PostType,
) -> Result<()> {
    sqlx::query("UPDATE posts SET comment = ?, post_type = ? WHERE id = ?")
        .bind(comment)
        .bind(post_type.as_str())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update post content")?;

    Ok(())
}

// ========== Files ==========

/// All file placeholders of a post, in remote order.
pub async fn get_files_for_post(pool: &SqlitePool, post_id: i64) -> Result<Vec<PostFile>> {
    sqlx::query_as("SELECT * FROM post_files WHERE post_id = ? ORDER BY remote_order")
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch files for post")
}

/// Insert a file placeholder and return the full row.
pub async fn insert_file(
    pool: &SqlitePool,
    post_id: i64,
    remote_order: i64,
    filename: Option<&str>,
) -> Result<PostFile> {
    let result = sqlx::query(
        "INSERT INTO post_files (post_id, remote_order, filename) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(remote_order)
    .bind(filename)
    .execute(pool)
    .await
    .context("Failed to insert file placeholder")?;

    sqlx::query_as("SELECT * FROM post_files WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
        .context("Failed to fetch inserted file placeholder")
}

/// Record imported binaries for a file placeholder. Presence flags flip in
/// the same statement that records the storage keys, so a completed import
/// is never observed without its key.
pub async fn set_file_imported(
    pool: &SqlitePool,
    file_id: i64,
    original_key: Option<&str>,
    thumb_key: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE post_files
        SET present = CASE WHEN ? IS NOT NULL THEN 1 ELSE present END,
            original_key = COALESCE(?, original_key),
            thumb_present = CASE WHEN ? IS NOT NULL THEN 1 ELSE thumb_present END,
            thumb_key = COALESCE(?, thumb_key)
        WHERE id = ?
        ",
    )
    .bind(original_key)
    .bind(original_key)
    .bind(thumb_key)
    .bind(thumb_key)
    .bind(file_id)
    .execute(pool)
    .await
    .context("Failed to record imported files")?;

    Ok(())
}

// ========== Tags ==========

/// Get a tag by (category, name), creating it if it does not exist.
pub async fn get_or_create_tag(
    pool: &SqlitePool,
    category: TagCategory,
    name: &str,
) -> Result<Tag> {
    sqlx::query("INSERT OR IGNORE INTO tags (category, name) VALUES (?, ?)")
        .bind(category.as_str())
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    sqlx::query_as("SELECT * FROM tags WHERE category = ? AND name = ?")
        .bind(category.as_str())
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to fetch tag")
}

/// Replace a tag's metadata document.
pub async fn update_tag_metadata(pool: &SqlitePool, tag_id: i64, metadata: &str) -> Result<()> {
    sqlx::query("UPDATE tags SET metadata = ? WHERE id = ?")
        .bind(metadata)
        .bind(tag_id)
        .execute(pool)
        .await
        .context("Failed to update tag metadata")?;

    Ok(())
}

/// Attach a tag to a post. Idempotent.
pub async fn attach_tag(pool: &SqlitePool, post_id: i64, tag_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
        .bind(post_id)
        .bind(tag_id)
        .execute(pool)
        .await
        .context("Failed to attach tag")?;

    Ok(())
}

/// All tags attached to a post.
pub async fn get_tags_for_post(pool: &SqlitePool, post_id: i64) -> Result<Vec<Tag>> {
    sqlx::query_as(
        r"
        SELECT t.* FROM tags t
        JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id = ?
        ORDER BY t.id
        ",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch tags for post")
}

// ========== Related links ==========

/// Ensure a parent -> child related link exists. Returns true if the link
/// was newly created.
pub async fn ensure_related(pool: &SqlitePool, post_id: i64, related_id: i64) -> Result<bool> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO related_posts (post_id, related_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(related_id)
            .execute(pool)
            .await
            .context("Failed to insert related link")?;

    Ok(result.rows_affected() > 0)
}

/// Local ids of the posts a collection post decomposed into.
pub async fn get_related_ids(pool: &SqlitePool, post_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT related_id FROM related_posts WHERE post_id = ? ORDER BY related_id")
            .bind(post_id)
            .fetch_all(pool)
            .await
            .context("Failed to fetch related links")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ========== Subscriptions ==========

/// Create a subscription with an empty cursor.
pub async fn create_subscription(
    pool: &SqlitePool,
    name: &str,
    creator_id: i64,
) -> Result<Subscription> {
    sqlx::query("INSERT INTO subscriptions (name, creator_id) VALUES (?, ?)")
        .bind(name)
        .bind(creator_id)
        .execute(pool)
        .await
        .context("Failed to create subscription")?;

    sqlx::query_as("SELECT * FROM subscriptions WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to fetch created subscription")
}

/// Get a subscription by name.
pub async fn get_subscription_by_name(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<Subscription>> {
    sqlx::query_as("SELECT * FROM subscriptions WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch subscription")
}

/// All subscriptions, oldest first.
pub async fn list_subscriptions(pool: &SqlitePool) -> Result<Vec<Subscription>> {
    sqlx::query_as("SELECT * FROM subscriptions ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list subscriptions")
}

/// Delete a subscription by name. Returns true if one was deleted.
pub async fn delete_subscription(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to delete subscription")?;

    Ok(result.rows_affected() > 0)
}

/// Persist a subscription's cursor state.
pub async fn update_subscription_cursor(
    pool: &SqlitePool,
    subscription_id: i64,
    cursor: &CursorState,
) -> Result<()> {
    sqlx::query("UPDATE subscriptions SET head_id = ?, tail_id = ? WHERE id = ?")
        .bind(cursor.head_id)
        .bind(cursor.tail_id)
        .bind(subscription_id)
        .execute(pool)
        .await
        .context("Failed to update subscription cursor")?;

    Ok(())
}

/// Append a post to a subscription's feed, after any existing entries.
pub async fn append_feed_entry(
    pool: &SqlitePool,
    subscription_id: i64,
    post_id: i64,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO subscription_feed (subscription_id, post_id, position)
        SELECT ?, ?, COALESCE(MAX(position) + 1, 0)
        FROM subscription_feed WHERE subscription_id = ?
        ",
    )
    .bind(subscription_id)
    .bind(post_id)
    .bind(subscription_id)
    .execute(pool)
    .await
    .context("Failed to append feed entry")?;

    Ok(())
}

/// Post ids in a subscription's feed, in encounter order.
pub async fn get_feed_post_ids(pool: &SqlitePool, subscription_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT post_id FROM subscription_feed WHERE subscription_id = ? ORDER BY position",
    )
    .bind(subscription_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch feed entries")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
