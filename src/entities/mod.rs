//! Entity module - Contains the SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod item;
pub mod prefix;

pub use item::{Column as ItemColumn, Entity as Item, Model as ItemModel};
pub use prefix::{Column as PrefixColumn, Entity as Prefix, Model as PrefixModel};
