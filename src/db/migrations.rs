use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Normalized posts. Identity is (source, original_id); original_id is
    // either "{post_id}" or "{post_id}-{content_id}".
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            original_id TEXT NOT NULL,
            url TEXT,
            title TEXT,
            comment TEXT,
            post_type TEXT NOT NULL,
            post_time TEXT,
            favorite INTEGER NOT NULL DEFAULT 0,
            metadata TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(source, original_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    // File placeholders, at most one per (post, remote_order).
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS post_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            remote_order INTEGER NOT NULL,
            filename TEXT,
            present INTEGER NOT NULL DEFAULT 0,
            thumb_present INTEGER NOT NULL DEFAULT 0,
            original_key TEXT,
            thumb_key TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(post_id, remote_order)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create post_files table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            metadata TEXT,
            UNIQUE(category, name)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create tags table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            UNIQUE(post_id, tag_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create post_tags table")?;

    // Parent collection post -> decomposed sub-content post. Rows are never
    // deleted, even when the sub-content disappears upstream.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS related_posts (
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            related_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            UNIQUE(post_id, related_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create related_posts table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            creator_id INTEGER NOT NULL,
            head_id INTEGER,
            tail_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions table")?;

    // Feed entries in encounter order.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS subscription_feed (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscription_id INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            position INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create subscription_feed table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_identity ON posts(source, original_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_files_post ON post_files(post_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feed_subscription ON subscription_feed(subscription_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
