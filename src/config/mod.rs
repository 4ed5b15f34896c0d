/// Database connection and schema bootstrap
pub mod database;

/// Settings loaded from config.toml
pub mod settings;

pub use settings::{AppConfig, DatabaseSettings, LedgerSettings};
