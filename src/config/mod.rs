/// Database connection and table creation
pub mod database;

/// Application settings from config.toml and the environment
pub mod settings;

pub use settings::{AppConfig, PrefixSeed, ReceiptConfig, load_app_configuration};
