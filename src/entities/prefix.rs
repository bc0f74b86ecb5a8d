//! Prefix entity - Category tags used to derive item codes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Prefix database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prefixes")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Uppercase category tag (e.g. "MON")
    #[sea_orm(unique)]
    pub prefix: String,
    /// Human-readable category label (e.g. "Monitores")
    pub description: String,
}

/// `Prefix` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
