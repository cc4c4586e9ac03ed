//! Configuration management for database and application settings.

/// Database URL and table creation
pub mod database;
/// Seed file loading and initial printer/filament seeding
pub mod seed;

use crate::errors::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SeaORM connection URL
    pub database_url: String,
    /// Bound on row-lock acquisition waits
    pub lock_wait: Duration,
    /// Seed file to apply at startup, if present
    pub seed_path: Option<PathBuf>,
}

/// Assembles the application configuration from environment variables.
///
/// `DATABASE_URL` falls back to a local SQLite file, `LOCK_WAIT_MS` to the
/// store default, and `SEED_CONFIG` to `./config.toml` when that file exists.
///
/// # Errors
/// Returns [`Error::Config`] when `LOCK_WAIT_MS` is set but not an integer.
pub fn load_app_configuration() -> Result<AppConfig> {
    let database_url = database::get_database_url();

    let lock_wait = match std::env::var("LOCK_WAIT_MS") {
        Ok(raw) => {
            let ms: u64 = raw.parse().map_err(|_| Error::Config {
                message: format!("LOCK_WAIT_MS must be an integer, got '{raw}'"),
            })?;
            Duration::from_millis(ms)
        }
        Err(_) => crate::store::DEFAULT_LOCK_WAIT,
    };

    let seed_path = std::env::var("SEED_CONFIG").map_or_else(
        |_| {
            let default = PathBuf::from("config.toml");
            default.exists().then_some(default)
        },
        |p| Some(PathBuf::from(p)),
    );

    Ok(AppConfig {
        database_url,
        lock_wait,
        seed_path,
    })
}
