//! Item lifecycle - Create, update, delete and photo reset for items.
//!
//! Every operation pairs a database mutation with a photo file mutation. They
//! are not transactional together: the database row is written first and the
//! file change follows as a best-effort step whose failure is logged and
//! swallowed. The one exception is a new item's upload, which is staged on
//! disk before its row is inserted and moved to its final name only after
//! the insert succeeds. A failed creation removes just the staged file, so a
//! photo already stored under the same code is left alone.

use crate::{
    core::{
        allocator::{self, AllocationLocks},
        item::{self as item_store, ItemFields},
        photos::{PhotoStore, PhotoUpload, photo_file_name, staging_name},
        prefix as prefix_store,
    },
    entities::item,
    errors::{Error, Result},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Owns the collaborators needed to keep item rows and photo files in step.
pub struct ItemManager {
    db: DatabaseConnection,
    photos: Arc<dyn PhotoStore>,
    locks: AllocationLocks,
    placeholder: String,
}

impl ItemManager {
    /// Creates a manager over `db` storing photos in `photos`.
    ///
    /// `placeholder` is the photo name recorded for items without a photo; it
    /// is never written or removed by the manager.
    pub fn new(db: DatabaseConnection, photos: Arc<dyn PhotoStore>, placeholder: impl Into<String>) -> Self {
        Self {
            db,
            photos,
            locks: AllocationLocks::new(),
            placeholder: placeholder.into(),
        }
    }

    /// The database connection this manager writes to.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Name recorded for items without a photo.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Location of the item's photo, or `None` when it only has the placeholder.
    #[must_use]
    pub fn photo_path(&self, item: &item::Model) -> Option<PathBuf> {
        if self.is_placeholder(&item.photo) {
            None
        } else {
            Some(self.photos.path_of(&item.photo))
        }
    }

    fn is_placeholder(&self, name: &str) -> bool {
        name.is_empty() || name == self.placeholder
    }

    /// Creates an item under `prefix`, allocating the next free code.
    ///
    /// # Errors
    /// - `Error::Validation` for missing required fields or a bad photo type
    /// - `Error::UnknownPrefix` if `prefix` was never registered
    /// - `Error::MalformedCode` if existing codes under the prefix are corrupt
    /// - `Error::DuplicateKey` if the code was taken despite allocation locking
    #[instrument(skip(self, details, photo), fields(has_photo = photo.is_some()))]
    pub async fn create_item(
        &self,
        prefix: &str,
        details: ItemFields,
        photo: Option<PhotoUpload>,
    ) -> Result<item::Model> {
        let details = details.normalized()?;
        let tag = prefix_store::normalize_prefix(prefix)?;
        if prefix_store::get_prefix(&self.db, &tag).await?.is_none() {
            return Err(Error::UnknownPrefix { prefix: tag });
        }

        let _guard = self.locks.acquire(&tag).await;
        let txn = self.db.begin().await?;
        let code = allocator::next_code(&txn, &tag).await?;

        // (staged name, final name)
        let staged = match &photo {
            Some(upload) => {
                let name = photo_file_name(&code, &upload.file_name)?;
                let staging = staging_name(&name);
                self.photos.save(&staging, &upload.bytes).await?;
                Some((staging, name))
            }
            None => None,
        };
        let photo_name = staged
            .as_ref()
            .map_or(self.placeholder.as_str(), |(_, name)| name.as_str());

        let model = match item_store::insert_item(&txn, &code, details, photo_name).await {
            Ok(model) => model,
            Err(e) => {
                if let Some((staging, _)) = &staged {
                    self.discard_photo(staging).await;
                }
                return Err(e);
            }
        };

        if let Some((staging, name)) = &staged {
            if let Err(e) = self.photos.rename(staging, name).await {
                self.discard_photo(staging).await;
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Failed to roll back item creation");
                }
                return Err(e);
            }
        }

        if let Err(e) = txn.commit().await {
            // The row held the code, so no other item owns this file.
            if let Some((_, name)) = &staged {
                self.discard_photo(name).await;
            }
            return Err(e.into());
        }

        info!(code = %model.code, id = model.id, "Created item");
        Ok(model)
    }

    /// Updates the descriptive fields of an item, replacing its photo when a
    /// new one is supplied. The code never changes.
    ///
    /// # Errors
    /// - `Error::NotFound` if no item has `item_id`
    /// - `Error::Validation` for missing required fields or a bad photo type
    #[instrument(skip(self, details, photo), fields(has_photo = photo.is_some()))]
    pub async fn update_item(
        &self,
        item_id: i64,
        details: ItemFields,
        photo: Option<PhotoUpload>,
    ) -> Result<item::Model> {
        let details = details.normalized()?;
        let existing = item_store::get_item_by_id(&self.db, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(item_id))?;
        let old_photo = existing.photo.clone();

        let new_photo = match &photo {
            Some(upload) => {
                let name = photo_file_name(&existing.code, &upload.file_name)?;
                self.photos.save(&name, &upload.bytes).await?;
                Some(name)
            }
            None => None,
        };

        let updated =
            match item_store::update_item(&self.db, existing, details, new_photo.as_deref()).await {
                Ok(model) => model,
                Err(e) => {
                    if let Some(name) = new_photo.as_deref().filter(|n| *n != old_photo) {
                        self.discard_photo(name).await;
                    }
                    return Err(e);
                }
            };

        if let Some(name) = &new_photo {
            if *name != old_photo {
                self.discard_photo(&old_photo).await;
            }
        }

        info!(code = %updated.code, id = updated.id, "Updated item");
        Ok(updated)
    }

    /// Deletes an item, then removes its photo unless it is the placeholder.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no item has `item_id`.
    #[instrument(skip(self))]
    pub async fn delete_item(&self, item_id: i64) -> Result<item::Model> {
        let existing = item_store::get_item_by_id(&self.db, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(item_id))?;

        item_store::delete_item(&self.db, item_id).await?;
        self.discard_photo(&existing.photo).await;

        info!(code = %existing.code, id = existing.id, "Deleted item");
        Ok(existing)
    }

    /// Resets the item's photo to the placeholder and removes the old file.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no item has `item_id`.
    #[instrument(skip(self))]
    pub async fn clear_photo(&self, item_id: i64) -> Result<item::Model> {
        let existing = item_store::get_item_by_id(&self.db, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(item_id))?;

        if self.is_placeholder(&existing.photo) {
            return Ok(existing);
        }

        let old_photo = existing.photo.clone();
        let updated = item_store::set_item_photo(&self.db, existing, &self.placeholder).await?;
        self.discard_photo(&old_photo).await;

        info!(code = %updated.code, "Cleared item photo");
        Ok(updated)
    }

    /// Best-effort removal of a stored photo. Never touches the placeholder.
    async fn discard_photo(&self, name: &str) {
        if self.is_placeholder(name) {
            return;
        }
        if let Err(e) = self.photos.remove(name).await {
            warn!(photo = name, error = %e, "Failed to remove photo file, leaving it orphaned");
        }
    }
}
