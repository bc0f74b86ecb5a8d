//! Prefix business logic - Registers and removes the category tags used for codes.
//!
//! Prefixes are advisory metadata for code allocation: registering one makes it
//! available to [`crate::core::lifecycle::ItemManager::create_item`], and removing
//! one never touches items that already carry codes derived from it.

use crate::{
    config::PrefixSeed,
    entities::{Prefix, prefix},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{debug, info, instrument};

const MAX_PREFIX_LEN: usize = 10;

/// Trims and uppercases a raw prefix, rejecting anything but ASCII letters.
///
/// # Errors
/// Returns `Error::Validation` for empty, overlong or non-alphabetic input.
pub fn normalize_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim().to_ascii_uppercase();
    if prefix.is_empty() {
        return Err(Error::validation("Prefix cannot be empty"));
    }
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(Error::validation(format!(
            "Prefix cannot be longer than {MAX_PREFIX_LEN} letters"
        )));
    }
    if !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Error::validation("Prefix may only contain letters A-Z"));
    }
    Ok(prefix)
}

/// Lists every registered prefix ordered alphabetically.
pub async fn list_prefixes<C>(db: &C) -> Result<Vec<prefix::Model>>
where
    C: ConnectionTrait,
{
    Prefix::find()
        .order_by_asc(prefix::Column::Prefix)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Looks up a prefix by its exact (already normalized) tag.
pub async fn get_prefix<C>(db: &C, tag: &str) -> Result<Option<prefix::Model>>
where
    C: ConnectionTrait,
{
    Prefix::find()
        .filter(prefix::Column::Prefix.eq(tag))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Registers a prefix. Registering an existing tag is a silent no-op.
///
/// Returns `true` when a new row was inserted.
///
/// # Errors
/// Returns `Error::Validation` for an invalid tag, or a database error for
/// failures other than the uniqueness conflict.
#[instrument(skip(db))]
pub async fn register_prefix<C>(db: &C, raw_prefix: &str, description: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let tag = normalize_prefix(raw_prefix)?;

    let model = prefix::ActiveModel {
        prefix: Set(tag.clone()),
        description: Set(description.trim().to_string()),
        ..Default::default()
    };

    match model.insert(db).await.map_err(Error::from) {
        Ok(_) => {
            info!(prefix = %tag, "Registered prefix");
            Ok(true)
        }
        Err(Error::DuplicateKey { .. }) => {
            debug!(prefix = %tag, "Prefix already registered, ignoring");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Deletes a prefix by id. Items with codes derived from it are left as they are.
///
/// # Errors
/// Returns `Error::NotFound` when no prefix has this id.
#[instrument(skip(db))]
pub async fn unregister_prefix<C>(db: &C, prefix_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Prefix::delete_by_id(prefix_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::NotFound {
            entity: "prefix",
            key: prefix_id.to_string(),
        });
    }
    info!(prefix_id, "Unregistered prefix");
    Ok(())
}

/// Registers every configured seed prefix that is not present yet.
pub async fn seed_prefixes<C>(db: &C, seeds: &[PrefixSeed]) -> Result<usize>
where
    C: ConnectionTrait,
{
    let mut inserted = 0;
    for seed in seeds {
        if register_prefix(db, &seed.prefix, &seed.description).await? {
            inserted += 1;
        }
    }
    info!(
        "Prefix seeding finished: {} new of {} configured",
        inserted,
        seeds.len()
    );
    Ok(inserted)
}
