#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use printfarm::config;
use printfarm::core::{inventory, report};
use printfarm::errors::Result;
use printfarm::store::Store;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars may also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()?;
    info!("Successfully processed application configuration.");

    // 4. Connect and make sure the schema exists
    let store = Store::connect(&app_config.database_url, app_config.lock_wait).await?;
    config::database::create_tables(store.connection()).await?;
    info!("Database initialized at {}", app_config.database_url);

    // 5. Seed printers and filament spools when a seed file is configured
    if let Some(seed_path) = &app_config.seed_path {
        let seed = config::seed::load_seed_config(seed_path)?;
        let inserted = config::seed::seed_initial(store.connection(), &seed).await?;
        info!(
            "Seeded {} rows from {}",
            inserted,
            seed_path.to_string_lossy()
        );
    }

    // 6. Report farm state
    let snapshot = report::farm_snapshot(store.connection()).await?;
    info!(
        "Farm: {} printers ({} idle, {} printing, {} out of rotation)",
        snapshot.total_printers,
        snapshot.idle_printers,
        snapshot.printing_printers,
        snapshot.out_of_rotation_printers
    );
    info!(
        "Jobs: {} waiting, {} queued, {} printing, {} failed; {} orders ready to ship",
        snapshot.waiting_jobs,
        snapshot.queued_jobs,
        snapshot.printing_jobs,
        snapshot.failed_jobs,
        snapshot.orders_ready_to_ship
    );

    for spool in inventory::reorder_suggestions(store.connection()).await? {
        warn!(
            "Filament {} {} low: {:.0}g on hand (reorder at {:.0}g)",
            spool.material_type, spool.color, spool.stock_grams, spool.reorder_level_grams
        );
    }

    Ok(())
}
