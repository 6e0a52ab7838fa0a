//! Content-addressed file storage and the asset resolution policy.
//!
//! Downloads are staged into temp files by the caller; `FileStore::import`
//! takes ownership of the staged files, moves them under the storage root
//! keyed by content hash, and records presence in the same database
//! statement that records the storage keys.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tempfile::TempPath;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::db::{set_file_imported, PostFile};

/// What still has to be transferred for one file placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetNeeds {
    pub original: bool,
    pub thumbnail: bool,
}

impl AssetNeeds {
    /// Evaluate the policy: the original is wanted when it is not present
    /// and this is not a preview run; the thumbnail is wanted whenever it is
    /// not present, independent of preview mode.
    #[must_use]
    pub fn evaluate(file: &PostFile, preview: bool) -> Self {
        Self {
            original: !file.present && !preview,
            thumbnail: !file.thumb_present,
        }
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.original || self.thumbnail
    }
}

/// Permanent storage for imported binaries.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the storage directory layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub async fn ensure_layout(&self) -> Result<()> {
        for subdir in ["originals", "thumbs"] {
            let dir = self.root.join(subdir);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Import staged binaries for a file placeholder, taking ownership of
    /// the temp files. Either side may be absent. Presence flags and storage
    /// keys are recorded together after the moves complete.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be moved into the store or the
    /// database update fails.
    pub async fn import(
        &self,
        pool: &SqlitePool,
        file: &PostFile,
        original: Option<TempPath>,
        thumbnail: Option<TempPath>,
    ) -> Result<()> {
        let original_key = match original {
            Some(temp) => Some(self.ingest(temp, "originals").await?),
            None => None,
        };
        let thumb_key = match thumbnail {
            Some(temp) => Some(self.ingest(temp, "thumbs").await?),
            None => None,
        };

        if original_key.is_none() && thumb_key.is_none() {
            return Ok(());
        }

        set_file_imported(pool, file.id, original_key.as_deref(), thumb_key.as_deref()).await?;
        info!(
            file_id = file.id,
            original = original_key.as_deref().unwrap_or("-"),
            thumbnail = thumb_key.as_deref().unwrap_or("-"),
            "imported files"
        );

        Ok(())
    }

    /// Absolute path of a stored object by its key.
    #[must_use]
    pub fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Move one staged temp file into the store, returning its key.
    async fn ingest(&self, temp: TempPath, subdir: &str) -> Result<String> {
        let hash = hash_file(&temp).await?;
        let ext = file_extension(&temp);
        let key = format!("{subdir}/{}/{hash}{ext}", &hash[..2]);
        let dest = self.root.join(&key);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Disarm the temp file's delete-on-drop before moving it; from here
        // on the bytes belong to the store.
        let staged = temp.keep().context("Failed to take ownership of temp file")?;
        move_file(&staged, &dest).await?;
        debug!(key, "ingested file");

        Ok(key)
    }
}

/// SHA-256 of a file's contents, hex encoded.
async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Extension (with leading dot) of a path's file name, if any.
fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// Rename with a copy fallback for cross-device moves.
async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(src, dest)
        .await
        .with_context(|| format!("Failed to copy {} into store", src.display()))?;
    tokio::fs::remove_file(src)
        .await
        .with_context(|| format!("Failed to remove staged file {}", src.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_flags(present: bool, thumb_present: bool) -> PostFile {
        PostFile {
            id: 1,
            post_id: 1,
            remote_order: 0,
            filename: None,
            present,
            thumb_present,
            original_key: None,
            thumb_key: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_needs_truth_table() {
        let fresh = file_with_flags(false, false);
        assert_eq!(
            AssetNeeds::evaluate(&fresh, false),
            AssetNeeds {
                original: true,
                thumbnail: true
            }
        );

        let done = file_with_flags(true, true);
        assert_eq!(
            AssetNeeds::evaluate(&done, false),
            AssetNeeds {
                original: false,
                thumbnail: false
            }
        );

        let half = file_with_flags(true, false);
        assert_eq!(
            AssetNeeds::evaluate(&half, false),
            AssetNeeds {
                original: false,
                thumbnail: true
            }
        );
    }

    #[test]
    fn test_preview_never_needs_original() {
        // need_original is false under preview regardless of presence;
        // need_thumbnail is unaffected by preview.
        for present in [false, true] {
            for thumb_present in [false, true] {
                let file = file_with_flags(present, thumb_present);
                let needs = AssetNeeds::evaluate(&file, true);
                assert!(!needs.original);
                assert_eq!(needs.thumbnail, !thumb_present);
            }
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(Path::new("/tmp/x-a.png")), ".png");
        assert_eq!(file_extension(Path::new("/tmp/xyz")), "");
    }
}
