//! Photo storage - Where item photos live and how they are named.
//!
//! Photos are stored under the item code plus the lowercase extension of the
//! uploaded file (`MON001.jpg`), so a re-upload for the same item overwrites
//! in place and two items can never share a file.
//!
//! New items first write their upload under a [`staging_name`] and only move
//! it to the final name once their row is in place, so a creation that loses
//! its code to a concurrent writer never touches that writer's photo.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Leading part of every staged upload name.
pub const STAGING_PREFIX: &str = ".upload-";

/// Extensions accepted for uploaded photos.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// A photo received from the admin form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    /// File name as sent by the browser; only its extension is used
    pub file_name: String,
    /// Raw file content
    pub bytes: Vec<u8>,
}

/// Storage backend for item photos.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Writes `bytes` under `name`, replacing any existing file.
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Removes the file called `name`. A file that is already gone is not an error.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Moves the file `from` to `to`, replacing any file already called `to`.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Filesystem location of `name`, used by the document renderer.
    fn path_of(&self, name: &str) -> PathBuf;
}

/// Photos stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DiskPhotoStore {
    root: PathBuf,
}

impl DiskPhotoStore {
    /// Creates a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the photos live in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PhotoStore for DiskPhotoStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_of(name), bytes).await?;
        debug!(photo = name, size = bytes.len(), "Stored photo");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => {
                debug!(photo = name, "Removed photo");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(photo = name, "Photo already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        tokio::fs::rename(self.path_of(from), self.path_of(to)).await?;
        debug!(from, to, "Moved photo");
        Ok(())
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// A unique temporary name for an upload that will end up as `final_name`.
#[must_use]
pub fn staging_name(final_name: &str) -> String {
    format!("{STAGING_PREFIX}{}-{final_name}", uuid::Uuid::new_v4().simple())
}

/// Builds the stored file name for an item's photo.
///
/// # Errors
/// Returns `Error::Validation` when the upload has no extension or one that is
/// not an accepted image type.
pub fn photo_file_name(code: &str, uploaded_name: &str) -> Result<String> {
    let extension = Path::new(uploaded_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| Error::validation("Photo file must have an image extension"))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(Error::validation(format!(
            "Unsupported photo type '.{extension}' (allowed: {})",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    Ok(format!("{code}.{extension}"))
}
