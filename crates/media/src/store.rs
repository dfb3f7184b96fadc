use std::path::{Path, PathBuf};

use tracing::debug;

#[cfg(feature = "metrics")]
use hookrelay_metrics::{counter, labels, media as media_metrics};

use crate::{
    error::{Context, Error, Result},
    mime,
};

/// A file written by [`MediaStore::save_buffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMedia {
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
}

/// Directory of saved media files with a per-item size ceiling.
///
/// Files are named `<uuid>.<ext>` so concurrent saves never collide.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_bytes: u64,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Persist `bytes`, inferring the content type from magic bytes, then
    /// `content_type`, then `file_name`.
    pub async fn save_buffer(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<SavedMedia> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(Error::TooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = mime::resolve(bytes, None, content_type, file_name);
        let path = self.root.join(format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            mime::extension_for(&content_type)
        ));

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create {}", self.root.display()))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;

        #[cfg(feature = "metrics")]
        {
            counter!(media_metrics::SAVED_TOTAL, labels::KIND => content_type.clone()).increment(1);
            counter!(media_metrics::BYTES_TOTAL).increment(size);
        }

        debug!(path = %path.display(), content_type = %content_type, size, "saved media");
        Ok(SavedMedia {
            path,
            content_type,
            size,
        })
    }
}
