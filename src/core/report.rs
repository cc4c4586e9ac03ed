//! Read-only farm reporting.
//!
//! Plain reads over the live tables; no row locks are taken, so numbers are a
//! consistent-enough dashboard view rather than a serialized snapshot.

use crate::core::inventory;
use crate::entities::{
    JobStatus, Order, OrderStatus, PrintJob, Printer, PrinterStatus, filament, order, print_job,
    printer,
};
use crate::errors::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, Iterable, PaginatorTrait, QueryFilter};
use std::collections::BTreeMap;

/// One-glance farm health numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmSnapshot {
    /// Printers registered in the farm
    pub total_printers: u64,
    /// Printers available for assignment
    pub idle_printers: u64,
    /// Printers reserved by or running a job
    pub printing_printers: u64,
    /// Printers in ERROR or MAINTENANCE
    pub out_of_rotation_printers: u64,
    /// Jobs not yet assigned to any printer
    pub waiting_jobs: u64,
    /// Jobs reserved but not started
    pub queued_jobs: u64,
    /// Jobs actively printing
    pub printing_jobs: u64,
    /// Jobs failed and awaiting a retry decision
    pub failed_jobs: u64,
    /// Orders fully printed and waiting on a shipment
    pub orders_ready_to_ship: u64,
    /// Filament spools at or below their reorder level
    pub low_stock_filaments: u64,
}

async fn count_printers(db: &DatabaseConnection, status: PrinterStatus) -> Result<u64> {
    Printer::find()
        .filter(printer::Column::Status.eq(status))
        .count(db)
        .await
        .map_err(Into::into)
}

async fn count_jobs(db: &DatabaseConnection, status: JobStatus) -> Result<u64> {
    PrintJob::find()
        .filter(print_job::Column::Status.eq(status))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Assembles the farm snapshot.
pub async fn farm_snapshot(db: &DatabaseConnection) -> Result<FarmSnapshot> {
    let error_printers = count_printers(db, PrinterStatus::Error).await?;
    let maintenance_printers = count_printers(db, PrinterStatus::Maintenance).await?;
    let low_stock = inventory::reorder_suggestions(db).await?;

    Ok(FarmSnapshot {
        total_printers: Printer::find().count(db).await?,
        idle_printers: count_printers(db, PrinterStatus::Idle).await?,
        printing_printers: count_printers(db, PrinterStatus::Printing).await?,
        out_of_rotation_printers: error_printers + maintenance_printers,
        waiting_jobs: count_jobs(db, JobStatus::Waiting).await?,
        queued_jobs: count_jobs(db, JobStatus::Queued).await?,
        printing_jobs: count_jobs(db, JobStatus::Printing).await?,
        failed_jobs: count_jobs(db, JobStatus::Failed).await?,
        orders_ready_to_ship: Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Done))
            .count(db)
            .await?,
        low_stock_filaments: low_stock.len() as u64,
    })
}

/// Order counts per lifecycle state, in enum order, zeroes included.
pub async fn order_status_distribution(
    db: &DatabaseConnection,
) -> Result<Vec<(OrderStatus, u64)>> {
    let mut distribution = Vec::new();
    for status in OrderStatus::iter() {
        let count = Order::find()
            .filter(order::Column::Status.eq(status))
            .count(db)
            .await?;
        distribution.push((status, count));
    }
    Ok(distribution)
}

/// How much work a printer carries, past and present.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterUtilization {
    /// The machine
    pub printer: printer::Model,
    /// Jobs currently QUEUED or PRINTING on it
    pub active_jobs: u64,
    /// All jobs that ever referenced it, finished ones included
    pub total_jobs: u64,
}

/// Per-printer job counts across the farm.
pub async fn printer_utilization(db: &DatabaseConnection) -> Result<Vec<PrinterUtilization>> {
    let machines = Printer::find().all(db).await?;

    let mut utilization = Vec::with_capacity(machines.len());
    for machine in machines {
        let total_jobs = PrintJob::find()
            .filter(print_job::Column::AssignedPrinterId.eq(machine.id))
            .count(db)
            .await?;
        let active_jobs = PrintJob::find()
            .filter(print_job::Column::AssignedPrinterId.eq(machine.id))
            .filter(print_job::Column::Status.is_in([JobStatus::Queued, JobStatus::Printing]))
            .count(db)
            .await?;
        utilization.push(PrinterUtilization {
            printer: machine,
            active_jobs,
            total_jobs,
        });
    }
    Ok(utilization)
}

/// Estimated material demand for one material type.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialUsage {
    /// Material type (e.g. "PLA")
    pub material_type: String,
    /// Sum of estimated grams across jobs, quantity included
    pub estimated_grams: f64,
    /// Number of jobs of this material
    pub job_count: u64,
}

/// Sums estimated grams per material across a set of jobs.
#[must_use]
pub fn aggregate_material_usage(jobs: &[print_job::Model]) -> Vec<MaterialUsage> {
    let mut by_material: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for job in jobs {
        let entry = by_material.entry(job.material_type.as_str()).or_default();
        entry.0 += job.estimated_material_grams * f64::from(job.quantity);
        entry.1 += 1;
    }

    by_material
        .into_iter()
        .map(|(material, (grams, count))| MaterialUsage {
            material_type: material.to_string(),
            estimated_grams: grams,
            job_count: count,
        })
        .collect()
}

/// Estimated material demand per material type, over every job on record.
pub async fn material_usage(db: &DatabaseConnection) -> Result<Vec<MaterialUsage>> {
    let jobs = PrintJob::find().all(db).await?;
    Ok(aggregate_material_usage(&jobs))
}

/// Spools at or below their reorder threshold.
pub async fn low_stock(db: &DatabaseConnection) -> Result<Vec<filament::Model>> {
    inventory::reorder_suggestions(db).await
}
