//! Configuration loader for the NGIF dashboard backend.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional 64-bit integer environment variable with a default value.
macro_rules! parse_env_u64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// CSV file holding the field lookup table.
    pub lookup_table_path: PathBuf,

    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Deadline applied to every store query.
    pub store_timeout: Duration,

    /// Longest window, in days, a single CSV export may cover.
    pub export_max_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: String::new(),
            db_pool_max: 5,
            lookup_table_path: PathBuf::from("ngif-sensor-fields.csv"),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store_timeout: Duration::from_secs(10),
            export_max_days: 30,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LOOKUP_TABLE_PATH` – field lookup CSV (default: `ngif-sensor-fields.csv`)
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
/// - `STORE_TIMEOUT_SECS` – per-query timeout (default: 10)
/// - `EXPORT_MAX_DAYS` – longest export window (default: 30)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", defaults.db_pool_max);
    let store_timeout_secs =
        parse_env_u64!("STORE_TIMEOUT_SECS", defaults.store_timeout.as_secs());
    let export_max_days = parse_env_u32!("EXPORT_MAX_DAYS", defaults.export_max_days);

    let lookup_table_path = env::var("LOOKUP_TABLE_PATH")
        .map(PathBuf::from)
        .unwrap_or(defaults.lookup_table_path);

    let listen_addr = match env::var("LISTEN_ADDR") {
        Ok(v) => v
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("Invalid LISTEN_ADDR: {}", e))?,
        Err(_) => defaults.listen_addr,
    };

    if store_timeout_secs == 0 {
        return Err(anyhow!("STORE_TIMEOUT_SECS must be greater than 0"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        lookup_table_path,
        listen_addr,
        store_timeout: Duration::from_secs(store_timeout_secs),
        export_max_days,
    })
}

/// Mask the password part of a connection URL.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `scheme://host@...` has no password, only the scheme colon.
            if !db_url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL       : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX        : {}", self.db_pool_max);
        tracing::info!("  LOOKUP_TABLE_PATH  : {}", self.lookup_table_path.display());
        tracing::info!("  LISTEN_ADDR        : {}", self.listen_addr);
        tracing::info!("  STORE_TIMEOUT_SECS : {}", self.store_timeout.as_secs());
        tracing::info!("  EXPORT_MAX_DAYS    : {}", self.export_max_days);
    }
}
