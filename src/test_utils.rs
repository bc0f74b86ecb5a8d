//! Shared test utilities.
//!
//! This module provides helpers for setting up in-memory databases, item
//! fixtures, and a photo store that records what it was asked to do.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        item::{self, ItemFields},
        lifecycle::ItemManager,
        photos::{PhotoStore, PhotoUpload},
    },
    entities,
    errors::{Error, Result},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// Placeholder photo name used by test managers.
pub const TEST_PLACEHOLDER: &str = "placeholder.png";

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Item fields with the three required values set.
pub fn fields(description: &str, owner: &str, department: &str) -> ItemFields {
    ItemFields {
        description: description.to_string(),
        identifier: None,
        owner: owner.to_string(),
        department: department.to_string(),
        notes: None,
    }
}

/// A complete set of item fields.
pub fn sample_fields() -> ItemFields {
    ItemFields {
        identifier: Some("SN-0001".to_string()),
        notes: Some("Con cable de corriente".to_string()),
        ..fields("Dell 24in", "Ana", "IT")
    }
}

/// Inserts an item row with an arbitrary code, bypassing allocation.
pub async fn insert_raw_item(db: &DatabaseConnection, code: &str) -> Result<entities::item::Model> {
    item::insert_item(db, code, sample_fields(), TEST_PLACEHOLDER).await
}

/// A tiny upload carrying `file_name`.
pub fn png_upload(file_name: &str) -> PhotoUpload {
    PhotoUpload {
        file_name: file_name.to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    }
}

/// Photo store that only records calls.
#[derive(Debug, Default)]
pub struct RecordingPhotoStore {
    saved: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    renamed: Mutex<Vec<(String, String)>>,
    fail_removals: AtomicBool,
    fail_renames: AtomicBool,
}

impl RecordingPhotoStore {
    /// Names passed to `save`, in call order.
    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }

    /// Names passed to `remove` that succeeded, in call order.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    /// `(from, to)` pairs passed to `rename` that succeeded, in call order.
    pub fn renamed(&self) -> Vec<(String, String)> {
        self.renamed.lock().unwrap().clone()
    }

    /// Makes every later `remove` call fail.
    pub fn fail_removals(&self) {
        self.fail_removals.store(true, Ordering::SeqCst);
    }

    /// Makes every later `rename` call fail.
    pub fn fail_renames(&self) {
        self.fail_renames.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhotoStore for RecordingPhotoStore {
    async fn save(&self, name: &str, _bytes: &[u8]) -> Result<()> {
        self.saved.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(Error::Storage(std::io::Error::other("disk unplugged")));
        }
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        if self.fail_renames.load(Ordering::SeqCst) {
            return Err(Error::Storage(std::io::Error::other("disk full")));
        }
        self.renamed
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string()));
        Ok(())
    }

    fn path_of(&self, name: &str) -> PathBuf {
        PathBuf::from("/nonexistent").join(name)
    }
}

/// An item manager over a fresh database and a recording photo store.
pub async fn setup_manager() -> Result<(ItemManager, Arc<RecordingPhotoStore>)> {
    let db = setup_test_db().await?;
    let photos = Arc::new(RecordingPhotoStore::default());
    let manager = ItemManager::new(
        db,
        Arc::clone(&photos) as Arc<dyn PhotoStore>,
        TEST_PLACEHOLDER,
    );
    Ok((manager, photos))
}
