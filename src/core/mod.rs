//! Core business logic - framework-agnostic inventory operations.
//!
//! Nothing in here knows about HTTP; the web layer only calls into these
//! modules and turns their results into pages and downloads.

/// Next-code computation and per-prefix allocation locks
pub mod allocator;
/// Item rows in the registry store
pub mod item;
/// Create/update/delete flows tying item rows to photo files
pub mod lifecycle;
/// Photo naming and storage backends
pub mod photos;
/// Prefix registration and listing
pub mod prefix;
