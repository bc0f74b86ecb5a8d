//! Unified error type for the inventory registry.
//!
//! Every layer (store, lifecycle, rendering, web) returns [`Result`], so a
//! failure keeps its category all the way up to the HTTP response.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Errors produced by the registry.
#[derive(Debug, Error)]
pub enum Error {
    /// A record addressed by id or code does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record ("item", "prefix")
        entity: &'static str,
        /// The id or code that was looked up
        key: String,
    },

    /// A UNIQUE constraint rejected the write
    #[error("duplicate key: {message}")]
    DuplicateKey {
        /// Constraint detail reported by the store
        message: String,
    },

    /// Allocation was requested for a prefix that was never registered
    #[error("unknown prefix: {prefix}")]
    UnknownPrefix {
        /// The unregistered prefix
        prefix: String,
    },

    /// A stored code does not follow `<prefix><digits>`
    #[error("malformed code '{code}' for prefix '{prefix}'")]
    MalformedCode {
        /// The offending stored code
        code: String,
        /// The prefix being allocated
        prefix: String,
    },

    /// Input rejected before reaching the store
    #[error("validation error: {message}")]
    Validation {
        /// User-facing explanation
        message: String,
    },

    /// Database failure other than a uniqueness violation
    #[error("database error: {0}")]
    Database(DbErr),

    /// File storage failure
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Document, image or template generation failed
    #[error("render error: {message}")]
    Render {
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Shorthand for a missing item looked up by id or code.
    pub fn item_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "item",
            key: key.to_string(),
        }
    }

    /// Shorthand for a rejected input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => Self::DuplicateKey { message },
            _ => Self::Database(err),
        }
    }
}

impl From<askama::Error> for Error {
    fn from(err: askama::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
