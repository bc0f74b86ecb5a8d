//! Code allocation - Derives the next free item code for a prefix.
//!
//! Codes are `<prefix><sequence>` with the sequence zero-padded to three
//! digits (`MON001`); sequences of 1000 and above simply widen (`MON1000`).
//!
//! A stored code belongs to a prefix when it starts with the prefix and the
//! remainder starts with a digit. A remainder starting with a letter belongs
//! to a longer prefix (`MONI001` is not a `MON` code) and is skipped. A
//! remainder that starts with a digit but is not entirely numeric is a
//! corrupted record and fails allocation with `MalformedCode`.
//!
//! Allocation reads and then inserts, so callers serialize it per prefix with
//! [`AllocationLocks`]; the UNIQUE constraint on `items.code` backs this up.

use crate::{
    entities::{Item, item},
    errors::{Error, Result},
};
use dashmap::DashMap;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

/// Width the numeric part of a code is padded to.
pub const SEQUENCE_WIDTH: usize = 3;

/// Formats a code from its prefix and sequence number.
#[must_use]
pub fn format_code(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Extracts the sequence number of `code` under `prefix`.
///
/// Returns `Ok(None)` when the code belongs to a different, longer prefix.
///
/// # Errors
/// Returns `Error::MalformedCode` when the numeric part is missing, contains
/// non-digits, or overflows.
pub fn parse_sequence(prefix: &str, code: &str) -> Result<Option<u64>> {
    let Some(suffix) = code.strip_prefix(prefix) else {
        return Ok(None);
    };

    if suffix.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Ok(None);
    }

    let malformed = || Error::MalformedCode {
        code: code.to_string(),
        prefix: prefix.to_string(),
    };

    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    suffix.parse::<u64>().map(Some).map_err(|_| malformed())
}

/// Computes the next code for `prefix` from the codes already stored.
///
/// The highest sequence is taken numerically over every matching code rather
/// than from the lexicographically greatest one, so `MON1000` is seen as
/// newer than `MON999`.
///
/// # Errors
/// Returns `Error::MalformedCode` if a matching stored code cannot be parsed,
/// or a database error if the lookup fails.
pub async fn next_code<C>(db: &C, prefix: &str) -> Result<String>
where
    C: ConnectionTrait,
{
    let codes: Vec<String> = Item::find()
        .select_only()
        .column(item::Column::Code)
        .filter(item::Column::Code.starts_with(prefix))
        .order_by_desc(item::Column::Code)
        .into_tuple()
        .all(db)
        .await?;
    trace!(prefix, candidates = codes.len(), "Loaded candidate codes");

    let mut highest: Option<u64> = None;
    // LIKE is case-insensitive in SQLite, so `parse_sequence` re-checks the prefix exactly
    for code in &codes {
        if let Some(sequence) = parse_sequence(prefix, code)? {
            highest = Some(highest.map_or(sequence, |h| h.max(sequence)));
        }
    }

    let next = highest.map_or(1, |h| h + 1);
    let code = format_code(prefix, next);
    debug!(prefix, code = %code, "Allocated code");
    Ok(code)
}

/// Per-prefix locks held across the allocate-then-insert sequence.
#[derive(Debug, Default)]
pub struct AllocationLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AllocationLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive allocation rights on `prefix`.
    pub async fn acquire(&self, prefix: &str) -> OwnedMutexGuard<()> {
        // The shard guard must be released before awaiting the prefix lock.
        let lock = Arc::clone(self.locks.entry(prefix.to_string()).or_default().value());
        lock.lock_owned().await
    }
}
