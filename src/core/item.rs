//! Item records - Reads and writes against the `items` table.
//!
//! These functions are the registry store for items; they know nothing about
//! photos on disk or code allocation. The lifecycle rules that tie those
//! together live in [`crate::core::lifecycle`].

use crate::{
    entities::{Item, item},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};

/// The editable descriptive fields of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFields {
    /// What the equipment is
    pub description: String,
    /// Serial number or asset tag
    pub identifier: Option<String>,
    /// Responsible person
    pub owner: String,
    /// Owner's department
    pub department: String,
    /// Free-form notes
    pub notes: Option<String>,
}

impl ItemFields {
    /// Trims every field, turns blank optional fields into `None` and checks
    /// that the required ones are present.
    ///
    /// # Errors
    /// Returns `Error::Validation` naming the first missing required field.
    pub fn normalized(self) -> Result<Self> {
        fn required(value: String, label: &str) -> Result<String> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(Error::validation(format!("{label} is required")));
            }
            Ok(trimmed.to_string())
        }
        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Ok(Self {
            description: required(self.description, "Description")?,
            identifier: optional(self.identifier),
            owner: required(self.owner, "Owner")?,
            department: required(self.department, "Department")?,
            notes: optional(self.notes),
        })
    }
}

/// Lists every item ordered by code.
pub async fn get_all_items<C>(db: &C) -> Result<Vec<item::Model>>
where
    C: ConnectionTrait,
{
    Item::find()
        .order_by_asc(item::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves an item by id.
pub async fn get_item_by_id<C>(db: &C, item_id: i64) -> Result<Option<item::Model>>
where
    C: ConnectionTrait,
{
    Item::find_by_id(item_id).one(db).await.map_err(Into::into)
}

/// Retrieves an item by its code.
pub async fn get_item_by_code<C>(db: &C, code: &str) -> Result<Option<item::Model>>
where
    C: ConnectionTrait,
{
    Item::find()
        .filter(item::Column::Code.eq(code))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Inserts a new item row.
///
/// # Errors
/// Returns `Error::DuplicateKey` if `code` is already taken.
pub async fn insert_item<C>(db: &C, code: &str, fields: ItemFields, photo: &str) -> Result<item::Model>
where
    C: ConnectionTrait,
{
    let model = item::ActiveModel {
        code: Set(code.to_string()),
        description: Set(fields.description),
        identifier: Set(fields.identifier),
        owner: Set(fields.owner),
        department: Set(fields.department),
        notes: Set(fields.notes),
        photo: Set(photo.to_string()),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Overwrites the descriptive fields of `existing`, and its photo when given.
/// The code is never touched.
pub async fn update_item<C>(
    db: &C,
    existing: item::Model,
    fields: ItemFields,
    photo: Option<&str>,
) -> Result<item::Model>
where
    C: ConnectionTrait,
{
    let mut model: item::ActiveModel = existing.into();
    model.description = Set(fields.description);
    model.identifier = Set(fields.identifier);
    model.owner = Set(fields.owner);
    model.department = Set(fields.department);
    model.notes = Set(fields.notes);
    if let Some(photo) = photo {
        model.photo = Set(photo.to_string());
    }
    model.update(db).await.map_err(Into::into)
}

/// Points `existing` at a different photo file.
pub async fn set_item_photo<C>(db: &C, existing: item::Model, photo: &str) -> Result<item::Model>
where
    C: ConnectionTrait,
{
    let mut model: item::ActiveModel = existing.into();
    model.photo = Set(photo.to_string());
    model.update(db).await.map_err(Into::into)
}

/// Deletes the item row with `item_id`.
///
/// # Errors
/// Returns `Error::NotFound` when no row was deleted.
pub async fn delete_item<C>(db: &C, item_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Item::delete_by_id(item_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::item_not_found(item_id));
    }
    Ok(())
}
