//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs. Creation is `IF NOT EXISTS`, which makes startup against an existing
//! database file a no-op.

use crate::entities::{Item, Prefix};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{info, instrument};

/// Opens the connection pool for `database_url`.
///
/// For file databases the parent directory is created first so a fresh
/// checkout can start without manual setup.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file_path(database_url).and_then(|p| p.parent().map(ToOwned::to_owned)) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&parent).await?;
        }
    }
    let db = Database::connect(database_url).await?;
    info!("Database connection opened");
    Ok(db)
}

/// Creates the `items` and `prefixes` tables if they do not exist.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut item_table = schema.create_table_from_entity(Item);
    let mut prefix_table = schema.create_table_from_entity(Prefix);
    item_table.if_not_exists();
    prefix_table.if_not_exists();

    db.execute(builder.build(&item_table)).await?;
    db.execute(builder.build(&prefix_table)).await?;

    Ok(())
}

/// Extracts the file path from a `sqlite://path?query` URL.
fn sqlite_file_path(database_url: &str) -> Option<std::path::PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next()?;
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(std::path::PathBuf::from(path))
}
