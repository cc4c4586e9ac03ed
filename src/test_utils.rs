//! Shared test utilities for `printfarm`.
//!
//! This module provides common helper functions for setting up test stores
//! and creating test entities with sensible defaults.

use crate::entities::{
    AuditLog, JobStatus, OrderStatus, PrinterStatus, audit_log, filament, order, print_job,
    printer,
};
use crate::errors::Result;
use crate::store::Store;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use std::time::Duration;

/// Lock wait used by tests; short enough that contention tests finish fast.
pub const TEST_LOCK_WAIT: Duration = Duration::from_millis(500);

/// Creates a store over an in-memory `SQLite` database with all tables
/// initialized. This is the standard setup for all integration tests.
pub async fn setup_test_store() -> Result<Store> {
    let store = Store::connect("sqlite::memory:", TEST_LOCK_WAIT).await?;
    crate::config::database::create_tables(store.connection()).await?;
    Ok(store)
}

/// Creates an idle test printer with no job.
pub async fn create_test_printer(store: &Store, name: &str) -> Result<printer::Model> {
    printer::ActiveModel {
        name: Set(name.to_string()),
        location: Set(Some("Rack A".to_string())),
        status: Set(PrinterStatus::Idle),
        notes: Set(None),
        current_job_id: Set(None),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .map_err(Into::into)
}

/// Creates a filament spool with the default reorder level (1000g).
pub async fn create_test_filament(
    store: &Store,
    material_type: &str,
    color: &str,
    stock_grams: f64,
) -> Result<filament::Model> {
    filament::ActiveModel {
        material_type: Set(material_type.to_string()),
        color: Set(color.to_string()),
        stock_grams: Set(stock_grams),
        reorder_level_grams: Set(1000.0),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .map_err(Into::into)
}

/// Creates a NEW order for customer 1.
pub async fn create_test_order(store: &Store) -> Result<order::Model> {
    create_test_order_with_status(store, OrderStatus::New).await
}

/// Creates an order already sitting at `status`.
/// Use this when the test starts mid-lifecycle (e.g. shipping a DONE order).
pub async fn create_test_order_with_status(
    store: &Store,
    status: OrderStatus,
) -> Result<order::Model> {
    order::ActiveModel {
        customer_user_id: Set(1),
        status: Set(status),
        priority: Set(false),
        shipping_address: Set(Some(r#"{"street":"1 Main St","city":"Springfield"}"#.to_string())),
        total_estimated_price: Set(25.0),
        total_final_price: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .map_err(Into::into)
}

/// Creates a print job for `order_id` with sensible defaults.
///
/// # Defaults
/// * material: "PLA", color: "Red"
/// * quantity: 2, 25.0g and 60 minutes estimated per unit
/// * no assigned printer
pub async fn create_test_job(
    store: &Store,
    order_id: i64,
    status: JobStatus,
) -> Result<print_job::Model> {
    print_job::ActiveModel {
        order_id: Set(order_id),
        stl_path: Set("uploads/part.stl".to_string()),
        original_filename: Set("part.stl".to_string()),
        material_type: Set("PLA".to_string()),
        color: Set("Red".to_string()),
        quantity: Set(2),
        estimated_time_minutes: Set(60),
        estimated_material_grams: Set(25.0),
        assigned_printer_id: Set(None),
        status: Set(status),
        operator_notes: Set(None),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .map_err(Into::into)
}

/// Counts audit entries recorded for one action.
pub async fn count_audit_entries(store: &Store, action: &str) -> Result<u64> {
    AuditLog::find()
        .filter(audit_log::Column::Action.eq(action))
        .count(store.connection())
        .await
        .map_err(Into::into)
}
