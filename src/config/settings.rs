//! Application settings loaded from `config.toml` and the environment.
//!
//! The TOML file supplies defaults (seed prefixes, receipt branding, limits);
//! environment variables (usually from `.env`) override deployment values and
//! carry the secrets. Secrets are never read from the TOML file.

use crate::errors::{Error, Result};
use rand::RngCore;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/inventory.sqlite?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_UPLOAD_DIR: &str = "static/images";
const DEFAULT_PLACEHOLDER: &str = "placeholder.png";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_SESSION_TTL_MINUTES: i64 = 8 * 60;
const MIN_SECRET_LEN: usize = 32;

/// Raw shape of `config.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// `SQLite` connection URL
    pub database_url: Option<String>,
    /// Address the HTTP server listens on
    pub bind_addr: Option<String>,
    /// Directory where photos are stored and served from
    pub upload_dir: Option<PathBuf>,
    /// File name used when an item has no photo
    pub placeholder_photo: Option<String>,
    /// Maximum accepted request body for uploads
    pub max_upload_bytes: Option<usize>,
    /// Verbose logging and relaxed cookies for local development
    pub debug: Option<bool>,
    /// Admin session lifetime
    pub session_ttl_minutes: Option<i64>,
    /// Prefixes registered at startup when missing
    pub prefixes: Option<Vec<PrefixSeed>>,
    /// Branding printed on custody receipts
    pub receipt: Option<ReceiptConfig>,
}

/// A prefix registered at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PrefixSeed {
    /// Category tag, e.g. "MON"
    pub prefix: String,
    /// Category label, e.g. "Monitores"
    pub description: String,
}

/// Text blocks printed on the custody receipt.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReceiptConfig {
    /// Organization name in the header
    pub organization: String,
    /// Address line below the organization
    pub address: String,
    /// City printed before the date
    pub city: String,
    /// Department that issues the receipt and receives incident reports
    pub department: String,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            organization: "CAMICH LERMA CHAPALA".to_string(),
            address: "Colonia Los Ángeles".to_string(),
            city: "Morelia".to_string(),
            department: "contabilidad".to_string(),
        }
    }
}

/// Fully resolved configuration shared by the whole application.
#[derive(Clone)]
pub struct AppConfig {
    /// `SQLite` connection URL
    pub database_url: String,
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
    /// Directory where photos are stored and served from
    pub upload_dir: PathBuf,
    /// File name used when an item has no photo
    pub placeholder_photo: String,
    /// Maximum accepted request body for uploads
    pub max_upload_bytes: usize,
    /// Development mode toggle
    pub debug: bool,
    /// Admin session lifetime
    pub session_ttl: chrono::Duration,
    /// Shared administrator password
    pub admin_password: String,
    /// Key used to sign session cookies
    pub session_secret: Vec<u8>,
    /// Prefixes registered at startup when missing
    pub prefixes: Vec<PrefixSeed>,
    /// Branding printed on custody receipts
    pub receipt: ReceiptConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("bind_addr", &self.bind_addr)
            .field("upload_dir", &self.upload_dir)
            .field("placeholder_photo", &self.placeholder_photo)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("debug", &self.debug)
            .field("session_ttl", &self.session_ttl)
            .field("prefixes", &self.prefixes)
            .field("receipt", &self.receipt)
            .finish_non_exhaustive()
    }
}

fn default_prefixes() -> Vec<PrefixSeed> {
    [
        ("MON", "Monitores"),
        ("NEV", "Neveras"),
        ("ESC", "Escritorios"),
    ]
    .into_iter()
    .map(|(prefix, description)| PrefixSeed {
        prefix: prefix.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// Reads and parses a TOML config file.
pub fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from {}: {e}", path_ref.display()),
    })
}

impl AppConfig {
    /// Merges file values with overrides looked up through `env`.
    ///
    /// `env` is a lookup function so tests can resolve configuration without
    /// touching the process environment.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = env("DATABASE_URL")
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_raw = env("INVENTORY_BIND_ADDR")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|e| Error::Config {
            message: format!("Invalid bind address '{bind_raw}': {e}"),
        })?;

        let upload_dir = env("INVENTORY_UPLOAD_DIR")
            .map(PathBuf::from)
            .or(file.upload_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

        let debug = match env("INVENTORY_DEBUG") {
            Some(raw) => parse_bool(&raw)?,
            None => file.debug.unwrap_or(false),
        };

        let admin_password = env("INVENTORY_ADMIN_PASSWORD")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Config {
                message: "INVENTORY_ADMIN_PASSWORD must be set".to_string(),
            })?;

        let session_secret = match env("INVENTORY_SESSION_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) if secret.len() >= MIN_SECRET_LEN => secret.into_bytes(),
            Some(_) => {
                return Err(Error::Config {
                    message: format!(
                        "INVENTORY_SESSION_SECRET must be at least {MIN_SECRET_LEN} characters"
                    ),
                });
            }
            None => {
                warn!("INVENTORY_SESSION_SECRET not set; generating a random one (sessions end on restart)");
                let mut secret = vec![0u8; MIN_SECRET_LEN];
                rand::thread_rng().fill_bytes(&mut secret);
                secret
            }
        };

        let session_ttl_minutes = file
            .session_ttl_minutes
            .unwrap_or(DEFAULT_SESSION_TTL_MINUTES);
        if session_ttl_minutes <= 0 {
            return Err(Error::Config {
                message: "session_ttl_minutes must be positive".to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_addr,
            upload_dir,
            placeholder_photo: file
                .placeholder_photo
                .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string()),
            max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            debug,
            session_ttl: chrono::Duration::minutes(session_ttl_minutes),
            admin_password,
            session_secret,
            prefixes: file.prefixes.unwrap_or_else(default_prefixes),
            receipt: file.receipt.unwrap_or_default(),
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config {
            message: format!("Invalid boolean '{other}' for INVENTORY_DEBUG"),
        }),
    }
}

/// Loads the application configuration.
///
/// Reads the TOML file named by `INVENTORY_CONFIG` (default `config.toml`),
/// falling back to built-in defaults when the file does not exist, then
/// applies environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("INVENTORY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let file = if Path::new(&path).exists() {
        info!("Loading configuration file {}", path);
        load_file_config(&path)?
    } else {
        info!("No configuration file at {}, using defaults", path);
        FileConfig::default()
    };
    AppConfig::from_sources(file, |key| std::env::var(key).ok())
}
