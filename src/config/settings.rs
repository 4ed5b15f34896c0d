//! Application settings loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! The database URL can additionally be overridden with `DATABASE_URL`.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "TABSPLIT_CONFIG";

/// Longest invitation lifetime accepted, in days.
pub const MAX_INVITATION_TTL_DAYS: i64 = 3650;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Store connection settings
    pub database: DatabaseSettings,
    /// Reconciliation and invitation rules
    pub ledger: LedgerSettings,
}

/// Store connection settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `SeaORM` connection URL, e.g. `sqlite://data/tabsplit.sqlite?mode=rwc`
    pub url: Option<String>,
}

/// Reconciliation and invitation rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Money comparisons closer than this are treated as equal
    pub rounding_tolerance: f64,
    /// Days a pending invitation stays valid
    pub invitation_ttl_days: i64,
    /// Largest quantity a single receipt row may explode into
    pub max_item_quantity: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            rounding_tolerance: 0.01,
            invitation_ttl_days: 7,
            max_item_quantity: 500,
        }
    }
}

impl LedgerSettings {
    /// Rejects settings that would make reconciliation meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.rounding_tolerance.is_finite() || self.rounding_tolerance < 0.0 {
            return Err(Error::Config {
                message: format!(
                    "rounding_tolerance must be a non-negative number, got {}",
                    self.rounding_tolerance
                ),
            });
        }
        if !(1..=MAX_INVITATION_TTL_DAYS).contains(&self.invitation_ttl_days) {
            return Err(Error::Config {
                message: format!(
                    "invitation_ttl_days must be between 1 and {MAX_INVITATION_TTL_DAYS}, got {}",
                    self.invitation_ttl_days
                ),
            });
        }
        if self.max_item_quantity == 0 {
            return Err(Error::Config {
                message: "max_item_quantity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The ledger settings are out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    let config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })?;
    config.ledger.validate()?;
    Ok(config)
}

/// Loads configuration from `TABSPLIT_CONFIG` or `./config.toml`.
///
/// A missing file is not an error; defaults are used instead.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    if !Path::new(&path).exists() {
        warn!("No configuration file at {}, using defaults", path);
        return Ok(AppConfig::default());
    }
    load_config(path)
}
