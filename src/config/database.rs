//! Database configuration module.
//!
//! Table creation uses SeaORM's `Schema::create_table_from_entity` so the
//! SQLite schema always matches the entity definitions without hand-written
//! SQL.

use crate::entities::{AuditLog, Filament, Order, PrintJob, Printer, Shipment};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, Schema};

/// Gets the database URL from the environment or falls back to a local
/// SQLite file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/printfarm.sqlite".to_string())
}

/// Creates all tables from the entity definitions.
///
/// Uses `IF NOT EXISTS`, so re-running on an initialized database is a no-op.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = [
        schema.create_table_from_entity(Order),
        schema.create_table_from_entity(PrintJob),
        schema.create_table_from_entity(Printer),
        schema.create_table_from_entity(Filament),
        schema.create_table_from_entity(Shipment),
        schema.create_table_from_entity(AuditLog),
    ];

    for mut table in tables {
        table.if_not_exists();
        db.execute(builder.build(&table)).await?;
    }

    Ok(())
}
