//! Item entity - Represents one piece of registered equipment.
//!
//! Each item carries a unique code allocated from a prefix (e.g. `MON001`),
//! descriptive metadata, and the name of its stored photo. The photo column
//! holds the placeholder name when no photo was supplied.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    /// Unique identifier, never reused after deletion
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Inventory code `<prefix><sequence>`, fixed once allocated
    #[sea_orm(unique)]
    pub code: String,
    /// What the equipment is (e.g. "Dell 24in")
    pub description: String,
    /// Serial number, asset tag or any other external identifier
    pub identifier: Option<String>,
    /// Person responsible for the item
    pub owner: String,
    /// Department the owner belongs to
    pub department: String,
    /// Free-form notes
    pub notes: Option<String>,
    /// File name of the photo inside the upload directory
    pub photo: String,
}

/// Items are coupled to prefixes only through code allocation
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
