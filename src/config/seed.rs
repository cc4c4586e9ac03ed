//! Seed configuration loading from config.toml.
//!
//! The seed file declares the printer pool and the filament spools to stock
//! on first run. Seeding is idempotent: rows that already exist (printers by
//! name, filaments by material/color pair) are left alone.

use crate::entities::{Filament, Printer, PrinterStatus, filament, printer};
use crate::errors::{Error, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct SeedConfig {
    /// Printers to register
    #[serde(default)]
    pub printers: Vec<PrinterSeed>,
    /// Filament spools to stock
    #[serde(default)]
    pub filaments: Vec<FilamentSeed>,
}

/// Seed entry for a single printer
#[derive(Debug, Deserialize, Clone)]
pub struct PrinterSeed {
    /// Machine name, unique across the farm
    pub name: String,
    /// Physical location in the shop
    pub location: Option<String>,
}

/// Seed entry for a single filament spool
#[derive(Debug, Deserialize, Clone)]
pub struct FilamentSeed {
    /// Material type (e.g. "PLA")
    pub material_type: String,
    /// Spool color
    pub color: String,
    /// Initial stock in grams
    pub stock_grams: f64,
    /// Reorder threshold in grams
    #[serde(default = "default_reorder_level")]
    pub reorder_level_grams: f64,
}

const fn default_reorder_level() -> f64 {
    1000.0
}

/// Loads the seed configuration from a TOML file.
///
/// # Errors
/// Returns [`Error::Config`] when the file cannot be read or parsed.
pub fn load_seed_config<P: AsRef<Path>>(path: P) -> Result<SeedConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read seed file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse seed file: {e}"),
    })
}

/// Inserts any seed entries missing from the database.
///
/// Returns the number of rows inserted.
pub async fn seed_initial(db: &DatabaseConnection, config: &SeedConfig) -> Result<u64> {
    let mut inserted = 0;

    for seed in &config.printers {
        let exists = Printer::find()
            .filter(printer::Column::Name.eq(seed.name.as_str()))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }

        printer::ActiveModel {
            name: Set(seed.name.clone()),
            location: Set(seed.location.clone()),
            status: Set(PrinterStatus::Idle),
            notes: Set(None),
            current_job_id: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!("Seeded printer '{}'", seed.name);
        inserted += 1;
    }

    for seed in &config.filaments {
        let exists = Filament::find()
            .filter(filament::Column::MaterialType.eq(seed.material_type.as_str()))
            .filter(filament::Column::Color.eq(seed.color.as_str()))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }

        filament::ActiveModel {
            material_type: Set(seed.material_type.clone()),
            color: Set(seed.color.clone()),
            stock_grams: Set(seed.stock_grams),
            reorder_level_grams: Set(seed.reorder_level_grams),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!(
            "Seeded filament {} {} ({}g)",
            seed.material_type, seed.color, seed.stock_grams
        );
        inserted += 1;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::setup_test_store;

    const SEED_TOML: &str = r#"
        [[printers]]
        name = "Prusa-01"
        location = "Rack A"

        [[printers]]
        name = "Prusa-02"

        [[filaments]]
        material_type = "PLA"
        color = "Red"
        stock_grams = 4000.0
        reorder_level_grams = 800.0

        [[filaments]]
        material_type = "PETG"
        color = "Black"
        stock_grams = 2500.0
    "#;

    #[test]
    fn test_parse_seed_config() {
        let config: SeedConfig = toml::from_str(SEED_TOML).unwrap();

        assert_eq!(config.printers.len(), 2);
        assert_eq!(config.printers[0].name, "Prusa-01");
        assert_eq!(config.printers[0].location.as_deref(), Some("Rack A"));
        assert!(config.printers[1].location.is_none());

        assert_eq!(config.filaments.len(), 2);
        assert_eq!(config.filaments[0].reorder_level_grams, 800.0);
        // Default reorder level applies when omitted
        assert_eq!(config.filaments[1].reorder_level_grams, 1000.0);
    }

    #[test]
    fn test_parse_empty_seed_config() {
        let config: SeedConfig = toml::from_str("").unwrap();
        assert!(config.printers.is_empty());
        assert!(config.filaments.is_empty());
    }

    #[tokio::test]
    async fn test_seed_initial_is_idempotent() -> Result<()> {
        let store = setup_test_store().await?;
        let config: SeedConfig = toml::from_str(SEED_TOML).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let first = seed_initial(store.connection(), &config).await?;
        assert_eq!(first, 4);

        let second = seed_initial(store.connection(), &config).await?;
        assert_eq!(second, 0);

        Ok(())
    }
}
