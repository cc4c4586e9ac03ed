//! Workflow state machine - Status transitions for orders, jobs, and printers.
//!
//! Every operation here follows the same shape: read what it needs to learn
//! the involved row ids, take all row locks through [`Store::lock_many`]
//! (which sorts them into the global lock order), open one transaction,
//! re-read and re-check preconditions under the locks, mutate, append the
//! audit record, commit. Locks are always taken before the transaction opens
//! and never while one is held.
//!
//! Requesting a transition an entity has already made is a no-op success with
//! no audit entry, so retried calls never double-log.
//!
//! ```text
//! PrintJob: WAITING -assign-> QUEUED -start-> PRINTING -finish-> DONE
//!                                                      \-fail--> FAILED -retry-> WAITING
//! Printer:  IDLE -assign-> PRINTING -finish-> IDLE
//!                                    -fail--> MAINTENANCE -clear-> IDLE
//! Order:    NEW/REVIEW -> QUEUED -> PRINTING -> DONE -> SHIPPED -> COMPLETED
//!           REVIEW -cancel-> (deleted with its jobs)
//! ```

use crate::core::{audit, inventory};
use crate::entities::{
    Filament, JobStatus, Order, OrderStatus, PrintJob, Printer, PrinterStatus, Shipment,
    ShipmentStatus, filament, order, print_job, printer, shipment,
};
use crate::errors::{Error, Result};
use crate::store::{EntityKind, Store, delete_order_with_jobs};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde_json::json;
use tracing::{info, warn};

async fn get_order<C>(conn: &C, id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(Error::NotFound { entity: "Order", id })
}

async fn get_job<C>(conn: &C, id: i64) -> Result<print_job::Model>
where
    C: ConnectionTrait,
{
    PrintJob::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "PrintJob",
            id,
        })
}

async fn get_printer<C>(conn: &C, id: i64) -> Result<printer::Model>
where
    C: ConnectionTrait,
{
    Printer::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "Printer",
            id,
        })
}

/// Moves an order to `new_status` inside the caller's transaction.
///
/// Same-status requests change nothing and write no audit entry.
pub(crate) async fn transition_order_status<C>(
    conn: &C,
    current: order::Model,
    new_status: OrderStatus,
    actor_user_id: Option<i64>,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    if current.status == new_status {
        return Ok(current);
    }

    let order_id = current.id;
    let before = json!({"status": current.status});
    let after = json!({"status": new_status});

    let mut active: order::ActiveModel = current.into();
    active.status = Set(new_status);
    let updated = active.update(conn).await?;

    audit::record(
        conn,
        actor_user_id,
        "update_status",
        "Order",
        order_id,
        Some(before),
        Some(after),
    )
    .await?;

    info!("Order {} moved to {:?}", order_id, new_status);
    Ok(updated)
}

/// Binds one waiting job to one idle printer, exclusively.
///
/// The printer is reserved from the moment of assignment: its status goes to
/// PRINTING and `current_job_id` points at the job, so a second assignment
/// against it fails with [`Error::PrinterBusy`] no matter how the calls
/// interleave. When the owning order has no waiting jobs left it advances to
/// QUEUED.
pub async fn assign_job(
    store: &Store,
    job_id: i64,
    printer_id: i64,
    actor_user_id: Option<i64>,
) -> Result<print_job::Model> {
    // Unlocked read to learn the owning order, re-checked under the locks
    let snapshot = get_job(store.connection(), job_id).await?;
    let order_id = snapshot.order_id;

    let _guards = store
        .lock_many(&[
            (EntityKind::Printer, printer_id),
            (EntityKind::PrintJob, job_id),
            (EntityKind::Order, order_id),
        ])
        .await?;
    let txn = store.begin().await?;

    let machine = get_printer(&txn, printer_id).await?;
    if machine.status != PrinterStatus::Idle || machine.current_job_id.is_some() {
        return Err(Error::PrinterBusy { printer_id });
    }

    let job = get_job(&txn, job_id).await?;
    if job.status != JobStatus::Waiting {
        return Err(Error::InvalidState {
            entity: "PrintJob",
            id: job_id,
            message: format!("cannot assign a job in status {:?}", job.status),
        });
    }
    let owner = get_order(&txn, order_id).await?;

    let before = json!({"status": job.status, "assigned_printer_id": null});
    let after = json!({"status": JobStatus::Queued, "assigned_printer_id": printer_id});

    let mut job_active: print_job::ActiveModel = job.into();
    job_active.status = Set(JobStatus::Queued);
    job_active.assigned_printer_id = Set(Some(printer_id));
    let job = job_active.update(&txn).await?;

    let mut machine_active: printer::ActiveModel = machine.into();
    machine_active.status = Set(PrinterStatus::Printing);
    machine_active.current_job_id = Set(Some(job_id));
    machine_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "assign_job",
        "PrintJob",
        job_id,
        Some(before),
        Some(after),
    )
    .await?;

    if matches!(owner.status, OrderStatus::New | OrderStatus::Review) {
        let still_waiting = PrintJob::find()
            .filter(print_job::Column::OrderId.eq(order_id))
            .filter(print_job::Column::Status.eq(JobStatus::Waiting))
            .count(&txn)
            .await?;
        if still_waiting == 0 {
            transition_order_status(&txn, owner, OrderStatus::Queued, actor_user_id).await?;
        }
    }

    txn.commit().await?;
    info!("Assigned job {} to printer {}", job_id, printer_id);
    Ok(job)
}

/// Starts a queued job on its reserved printer.
///
/// A job that is already PRINTING is a no-op success. The owning order moves
/// to PRINTING the first time any of its jobs starts.
pub async fn start_job(
    store: &Store,
    job_id: i64,
    actor_user_id: Option<i64>,
) -> Result<print_job::Model> {
    let snapshot = get_job(store.connection(), job_id).await?;

    let mut keys = vec![
        (EntityKind::PrintJob, job_id),
        (EntityKind::Order, snapshot.order_id),
    ];
    if let Some(printer_id) = snapshot.assigned_printer_id {
        keys.push((EntityKind::Printer, printer_id));
    }
    let _guards = store.lock_many(&keys).await?;
    let txn = store.begin().await?;

    let job = get_job(&txn, job_id).await?;
    if job.status == JobStatus::Printing {
        return Ok(job);
    }
    if job.status != JobStatus::Queued {
        return Err(Error::InvalidState {
            entity: "PrintJob",
            id: job_id,
            message: format!("cannot start a job in status {:?}", job.status),
        });
    }
    if job.assigned_printer_id != snapshot.assigned_printer_id {
        // Reassigned between the snapshot and the lock; locks cover the
        // wrong printer, so back out and let the caller retry
        return Err(Error::Busy {
            entity: "PrintJob",
            id: job_id,
        });
    }
    let printer_id = job.assigned_printer_id.ok_or(Error::InvalidState {
        entity: "PrintJob",
        id: job_id,
        message: "queued job has no assigned printer".to_string(),
    })?;

    let machine = get_printer(&txn, printer_id).await?;
    let mut machine_active: printer::ActiveModel = machine.into();
    machine_active.status = Set(PrinterStatus::Printing);
    machine_active.current_job_id = Set(Some(job_id));
    machine_active.update(&txn).await?;

    let owner = get_order(&txn, job.order_id).await?;

    let mut job_active: print_job::ActiveModel = job.into();
    job_active.status = Set(JobStatus::Printing);
    let job = job_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "start_job",
        "PrintJob",
        job_id,
        Some(json!({"status": JobStatus::Queued})),
        Some(json!({"status": JobStatus::Printing})),
    )
    .await?;

    if matches!(
        owner.status,
        OrderStatus::New | OrderStatus::Review | OrderStatus::Queued
    ) {
        transition_order_status(&txn, owner, OrderStatus::Printing, actor_user_id).await?;
    }

    txn.commit().await?;
    info!("Started job {} on printer {}", job_id, printer_id);
    Ok(job)
}

/// Completes a printing job.
///
/// Releases the printer back to IDLE, deducts the job's estimated material
/// from the matching filament spool, and flips the order to DONE once no
/// unfinished sibling remains. All of it commits as one transaction. A job
/// already DONE is a no-op success; a missing matching spool skips the
/// deduction but never fails the completion.
pub async fn finish_job(
    store: &Store,
    job_id: i64,
    actor_user_id: Option<i64>,
) -> Result<print_job::Model> {
    let snapshot = get_job(store.connection(), job_id).await?;
    let spool = Filament::find()
        .filter(filament::Column::MaterialType.eq(snapshot.material_type.as_str()))
        .filter(filament::Column::Color.eq(snapshot.color.as_str()))
        .one(store.connection())
        .await?;

    let mut keys = vec![
        (EntityKind::PrintJob, job_id),
        (EntityKind::Order, snapshot.order_id),
    ];
    if let Some(printer_id) = snapshot.assigned_printer_id {
        keys.push((EntityKind::Printer, printer_id));
    }
    if let Some(spool) = &spool {
        keys.push((EntityKind::Filament, spool.id));
    }
    let _guards = store.lock_many(&keys).await?;
    let txn = store.begin().await?;

    let job = get_job(&txn, job_id).await?;
    if job.status == JobStatus::Done {
        return Ok(job);
    }
    if job.status != JobStatus::Printing {
        return Err(Error::InvalidState {
            entity: "PrintJob",
            id: job_id,
            message: format!("cannot finish a job in status {:?}", job.status),
        });
    }
    if job.assigned_printer_id != snapshot.assigned_printer_id {
        return Err(Error::Busy {
            entity: "PrintJob",
            id: job_id,
        });
    }

    if let Some(printer_id) = job.assigned_printer_id {
        let machine = get_printer(&txn, printer_id).await?;
        let mut machine_active: printer::ActiveModel = machine.into();
        machine_active.status = Set(PrinterStatus::Idle);
        machine_active.current_job_id = Set(None);
        machine_active.update(&txn).await?;
    }

    let grams = job.estimated_material_grams * f64::from(job.quantity);
    match &spool {
        Some(spool) => {
            match inventory::consume_within(&txn, spool.id, grams, actor_user_id).await {
                Ok(outcome) if outcome.clamped => {
                    warn!(
                        "Filament {} short by {:.1}g finishing job {}",
                        spool.id,
                        outcome.requested_grams - outcome.deducted_grams,
                        job_id
                    );
                }
                Ok(_) => {}
                // Spool deleted since the snapshot; completion still stands
                Err(Error::NotFound { .. }) => {
                    warn!(
                        "Filament for {} {} vanished; job {} finished without deduction",
                        job.material_type, job.color, job_id
                    );
                }
                Err(e) => return Err(e),
            }
        }
        None => {
            warn!(
                "No filament matches {} {}; job {} finished without deduction",
                job.material_type, job.color, job_id
            );
        }
    }

    let order_id = job.order_id;
    let mut job_active: print_job::ActiveModel = job.into();
    job_active.status = Set(JobStatus::Done);
    let job = job_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "finish_job",
        "PrintJob",
        job_id,
        Some(json!({"status": JobStatus::Printing})),
        Some(json!({"status": JobStatus::Done})),
    )
    .await?;

    let unfinished = PrintJob::find()
        .filter(print_job::Column::OrderId.eq(order_id))
        .filter(print_job::Column::Status.ne(JobStatus::Done))
        .count(&txn)
        .await?;
    if unfinished == 0 {
        let owner = get_order(&txn, order_id).await?;
        if matches!(
            owner.status,
            OrderStatus::New | OrderStatus::Review | OrderStatus::Queued | OrderStatus::Printing
        ) {
            transition_order_status(&txn, owner, OrderStatus::Done, actor_user_id).await?;
        }
    }

    txn.commit().await?;
    info!("Finished job {}", job_id);
    Ok(job)
}

/// Marks a printing job failed and pulls its printer out of rotation.
///
/// The printer goes to MAINTENANCE with no current job and stays there until
/// [`clear_printer_maintenance`]. The job keeps its last printer id for
/// history. A job already FAILED is a no-op success.
pub async fn fail_job(
    store: &Store,
    job_id: i64,
    actor_user_id: Option<i64>,
) -> Result<print_job::Model> {
    let snapshot = get_job(store.connection(), job_id).await?;

    let mut keys = vec![(EntityKind::PrintJob, job_id)];
    if let Some(printer_id) = snapshot.assigned_printer_id {
        keys.push((EntityKind::Printer, printer_id));
    }
    let _guards = store.lock_many(&keys).await?;
    let txn = store.begin().await?;

    let job = get_job(&txn, job_id).await?;
    if job.status == JobStatus::Failed {
        return Ok(job);
    }
    if job.status != JobStatus::Printing {
        return Err(Error::InvalidState {
            entity: "PrintJob",
            id: job_id,
            message: format!("cannot fail a job in status {:?}", job.status),
        });
    }
    if job.assigned_printer_id != snapshot.assigned_printer_id {
        return Err(Error::Busy {
            entity: "PrintJob",
            id: job_id,
        });
    }

    if let Some(printer_id) = job.assigned_printer_id {
        let machine = get_printer(&txn, printer_id).await?;
        let mut machine_active: printer::ActiveModel = machine.into();
        machine_active.status = Set(PrinterStatus::Maintenance);
        machine_active.current_job_id = Set(None);
        machine_active.update(&txn).await?;
    }

    let mut job_active: print_job::ActiveModel = job.into();
    job_active.status = Set(JobStatus::Failed);
    let job = job_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "fail_job",
        "PrintJob",
        job_id,
        Some(json!({"status": JobStatus::Printing})),
        Some(json!({"status": JobStatus::Failed})),
    )
    .await?;

    txn.commit().await?;
    warn!(
        "Job {} failed; printer {:?} moved to maintenance",
        job_id, job.assigned_printer_id
    );
    Ok(job)
}

/// Returns a failed job to the waiting pool.
///
/// Clears the printer reference so the job can be assigned to any idle
/// machine. The failed printer is untouched; clearing it is a separate,
/// deliberate act. A job already WAITING is a no-op success.
pub async fn retry_job(
    store: &Store,
    job_id: i64,
    actor_user_id: Option<i64>,
) -> Result<print_job::Model> {
    let _guard = store.lock(EntityKind::PrintJob, job_id).await?;
    let txn = store.begin().await?;

    let job = get_job(&txn, job_id).await?;
    if job.status == JobStatus::Waiting {
        return Ok(job);
    }
    if job.status != JobStatus::Failed {
        return Err(Error::InvalidState {
            entity: "PrintJob",
            id: job_id,
            message: format!("cannot retry a job in status {:?}", job.status),
        });
    }

    let before = json!({"status": job.status, "assigned_printer_id": job.assigned_printer_id});
    let after = json!({"status": JobStatus::Waiting, "assigned_printer_id": null});

    let mut job_active: print_job::ActiveModel = job.into();
    job_active.status = Set(JobStatus::Waiting);
    job_active.assigned_printer_id = Set(None);
    let job = job_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "retry_job",
        "PrintJob",
        job_id,
        Some(before),
        Some(after),
    )
    .await?;

    txn.commit().await?;
    info!("Job {} returned to the waiting pool", job_id);
    Ok(job)
}

/// Cancels an order under review, deleting it together with its jobs.
///
/// Only REVIEW orders can be cancelled; anything further along has already
/// consumed printer time or material.
pub async fn cancel_order(store: &Store, order_id: i64, actor_user_id: Option<i64>) -> Result<()> {
    let _guard = store.lock(EntityKind::Order, order_id).await?;
    let txn = store.begin().await?;

    let target = get_order(&txn, order_id).await?;
    if target.status != OrderStatus::Review {
        return Err(Error::InvalidState {
            entity: "Order",
            id: order_id,
            message: format!("cannot cancel an order in status {:?}", target.status),
        });
    }

    let cancelled_status = target.status;
    let jobs_removed = delete_order_with_jobs(&txn, order_id).await?;

    audit::record(
        &txn,
        actor_user_id,
        "cancel_order",
        "Order",
        order_id,
        Some(json!({"status": cancelled_status, "job_count": jobs_removed})),
        None,
    )
    .await?;

    txn.commit().await?;
    info!("Cancelled order {} ({} jobs removed)", order_id, jobs_removed);
    Ok(())
}

/// Creates the shipment for a fully printed order and hands it to the carrier.
///
/// Requires the order DONE and no shipment on record. The shipment is born
/// SHIPPED with `shipped_at` stamped, and the order advances to SHIPPED in
/// the same transaction.
pub async fn create_shipment(
    store: &Store,
    order_id: i64,
    carrier: &str,
    tracking_number: &str,
    actor_user_id: Option<i64>,
) -> Result<shipment::Model> {
    let _guard = store.lock(EntityKind::Order, order_id).await?;
    let txn = store.begin().await?;

    let target = get_order(&txn, order_id).await?;
    if target.status != OrderStatus::Done {
        return Err(Error::InvalidState {
            entity: "Order",
            id: order_id,
            message: format!(
                "shipment requires a DONE order, found {:?}",
                target.status
            ),
        });
    }

    let existing = Shipment::find()
        .filter(shipment::Column::OrderId.eq(order_id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(Error::InvalidState {
            entity: "Order",
            id: order_id,
            message: "order already has a shipment".to_string(),
        });
    }

    let parcel = shipment::ActiveModel {
        order_id: Set(order_id),
        carrier: Set(carrier.to_string()),
        tracking_number: Set(tracking_number.to_string()),
        status: Set(ShipmentStatus::Shipped),
        shipped_at: Set(Some(chrono::Utc::now())),
        delivered_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        actor_user_id,
        "create_shipment",
        "Shipment",
        parcel.id,
        None,
        Some(json!({
            "carrier": carrier,
            "tracking_number": tracking_number,
            "status": ShipmentStatus::Shipped,
        })),
    )
    .await?;

    transition_order_status(&txn, target, OrderStatus::Shipped, actor_user_id).await?;

    txn.commit().await?;
    info!(
        "Shipment {} created for order {} via {}",
        parcel.id, order_id, carrier
    );
    Ok(parcel)
}

/// Confirms delivery of an order's shipment.
///
/// Shipment SHIPPED moves to DELIVERED with `delivered_at` stamped, and the
/// order closes out as COMPLETED. An already delivered shipment is a no-op
/// success.
pub async fn mark_delivered(
    store: &Store,
    order_id: i64,
    actor_user_id: Option<i64>,
) -> Result<shipment::Model> {
    let snapshot = Shipment::find()
        .filter(shipment::Column::OrderId.eq(order_id))
        .one(store.connection())
        .await?
        .ok_or(Error::InvalidState {
            entity: "Order",
            id: order_id,
            message: "order has no shipment to deliver".to_string(),
        })?;

    let _guards = store
        .lock_many(&[
            (EntityKind::Order, order_id),
            (EntityKind::Shipment, snapshot.id),
        ])
        .await?;
    let txn = store.begin().await?;

    let parcel = Shipment::find_by_id(snapshot.id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "Shipment",
            id: snapshot.id,
        })?;
    if parcel.status == ShipmentStatus::Delivered {
        return Ok(parcel);
    }
    if parcel.status != ShipmentStatus::Shipped {
        return Err(Error::InvalidState {
            entity: "Shipment",
            id: parcel.id,
            message: format!("cannot deliver a shipment in status {:?}", parcel.status),
        });
    }

    let parcel_id = parcel.id;
    let mut parcel_active: shipment::ActiveModel = parcel.into();
    parcel_active.status = Set(ShipmentStatus::Delivered);
    parcel_active.delivered_at = Set(Some(chrono::Utc::now()));
    let parcel = parcel_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "mark_delivered",
        "Shipment",
        parcel_id,
        Some(json!({"status": ShipmentStatus::Shipped})),
        Some(json!({"status": ShipmentStatus::Delivered})),
    )
    .await?;

    let owner = get_order(&txn, order_id).await?;
    if owner.status == OrderStatus::Shipped {
        transition_order_status(&txn, owner, OrderStatus::Completed, actor_user_id).await?;
    }

    txn.commit().await?;
    info!("Shipment {} for order {} delivered", parcel_id, order_id);
    Ok(parcel)
}

/// Returns a printer from MAINTENANCE or ERROR back to rotation.
///
/// An already idle printer is a no-op success.
pub async fn clear_printer_maintenance(
    store: &Store,
    printer_id: i64,
    actor_user_id: Option<i64>,
) -> Result<printer::Model> {
    let _guard = store.lock(EntityKind::Printer, printer_id).await?;
    let txn = store.begin().await?;

    let machine = get_printer(&txn, printer_id).await?;
    if machine.status == PrinterStatus::Idle {
        return Ok(machine);
    }
    if !matches!(
        machine.status,
        PrinterStatus::Maintenance | PrinterStatus::Error
    ) {
        return Err(Error::InvalidState {
            entity: "Printer",
            id: printer_id,
            message: format!("cannot clear a printer in status {:?}", machine.status),
        });
    }
    if machine.current_job_id.is_some() {
        return Err(Error::InvalidState {
            entity: "Printer",
            id: printer_id,
            message: "printer still holds a job".to_string(),
        });
    }

    let old_status = machine.status;
    let mut machine_active: printer::ActiveModel = machine.into();
    machine_active.status = Set(PrinterStatus::Idle);
    let machine = machine_active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "clear_maintenance",
        "Printer",
        printer_id,
        Some(json!({"status": old_status})),
        Some(json!({"status": PrinterStatus::Idle})),
    )
    .await?;

    txn.commit().await?;
    info!("Printer {} cleared back to idle", printer_id);
    Ok(machine)
}

/// Removes a printer that holds no active work.
///
/// Rejected while the printer has a current job or any job still references
/// it as QUEUED or PRINTING. Historical references from DONE and FAILED jobs
/// do not block deletion.
pub async fn delete_printer(
    store: &Store,
    printer_id: i64,
    actor_user_id: Option<i64>,
) -> Result<()> {
    let _guard = store.lock(EntityKind::Printer, printer_id).await?;
    let txn = store.begin().await?;

    let machine = get_printer(&txn, printer_id).await?;
    if machine.current_job_id.is_some() {
        return Err(Error::InvalidState {
            entity: "Printer",
            id: printer_id,
            message: "printer still holds a job".to_string(),
        });
    }
    let active_jobs = PrintJob::find()
        .filter(print_job::Column::AssignedPrinterId.eq(printer_id))
        .filter(print_job::Column::Status.is_in([JobStatus::Queued, JobStatus::Printing]))
        .count(&txn)
        .await?;
    if active_jobs > 0 {
        return Err(Error::InvalidState {
            entity: "Printer",
            id: printer_id,
            message: format!("{active_jobs} active jobs still reference this printer"),
        });
    }

    let before = json!({"name": machine.name, "status": machine.status});
    Printer::delete_by_id(printer_id).exec(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "delete_printer",
        "Printer",
        printer_id,
        Some(before),
        None,
    )
    .await?;

    txn.commit().await?;
    info!("Printer {} deleted", printer_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    async fn reload_job(store: &Store, id: i64) -> Result<print_job::Model> {
        get_job(store.connection(), id).await
    }

    async fn reload_printer(store: &Store, id: i64) -> Result<printer::Model> {
        get_printer(store.connection(), id).await
    }

    async fn reload_order(store: &Store, id: i64) -> Result<order::Model> {
        get_order(store.connection(), id).await
    }

    #[tokio::test]
    async fn test_assign_job_reserves_printer_and_queues_order() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        let assigned = assign_job(&store, job.id, machine.id, Some(1)).await?;
        assert_eq!(assigned.status, JobStatus::Queued);
        assert_eq!(assigned.assigned_printer_id, Some(machine.id));

        let machine = reload_printer(&store, machine.id).await?;
        assert_eq!(machine.status, PrinterStatus::Printing);
        assert_eq!(machine.current_job_id, Some(job.id));

        // Sole job assigned, so the order advances
        let target = reload_order(&store, target.id).await?;
        assert_eq!(target.status, OrderStatus::Queued);

        assert_eq!(count_audit_entries(&store, "assign_job").await?, 1);
        assert_eq!(count_audit_entries(&store, "update_status").await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_assign_rejects_busy_printer() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let first = create_test_job(&store, target.id, JobStatus::Waiting).await?;
        let second = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, first.id, machine.id, None).await?;

        let result = assign_job(&store, second.id, machine.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PrinterBusy { printer_id } if printer_id == machine.id
        ));

        // The loser is untouched
        let second = reload_job(&store, second.id).await?;
        assert_eq!(second.status, JobStatus::Waiting);
        assert!(second.assigned_printer_id.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_assign_rejects_non_waiting_job() -> Result<()> {
        let store = setup_test_store().await?;
        let first_machine = create_test_printer(&store, "Prusa-01").await?;
        let second_machine = create_test_printer(&store, "Prusa-02").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, first_machine.id, None).await?;

        let result = assign_job(&store, job.id, second_machine.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "PrintJob", .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_assign_missing_rows() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assert!(matches!(
            assign_job(&store, 404, machine.id, None).await.unwrap_err(),
            Error::NotFound { entity: "PrintJob", id: 404 }
        ));
        assert!(matches!(
            assign_job(&store, job.id, 404, None).await.unwrap_err(),
            Error::NotFound { entity: "Printer", id: 404 }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_order_queues_only_after_last_assignment() -> Result<()> {
        let store = setup_test_store().await?;
        let first_machine = create_test_printer(&store, "Prusa-01").await?;
        let second_machine = create_test_printer(&store, "Prusa-02").await?;
        let target = create_test_order(&store).await?;
        let first = create_test_job(&store, target.id, JobStatus::Waiting).await?;
        let second = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, first.id, first_machine.id, None).await?;
        let target_now = reload_order(&store, target.id).await?;
        assert_eq!(target_now.status, OrderStatus::New);

        assign_job(&store, second.id, second_machine.id, None).await?;
        let target_now = reload_order(&store, target.id).await?;
        assert_eq!(target_now.status, OrderStatus::Queued);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assigns_single_winner() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;

        let mut job_ids = Vec::new();
        for _ in 0..5 {
            let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;
            job_ids.push(job.id);
        }

        let mut handles = Vec::new();
        for job_id in job_ids {
            let store = store.clone();
            let printer_id = machine.id;
            handles.push(tokio::spawn(async move {
                assign_job(&store, job_id, printer_id, None).await
            }));
        }

        let mut ok = 0;
        let mut busy = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(Error::PrinterBusy { .. }) => busy += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(busy, 4);

        let machine = reload_printer(&store, machine.id).await?;
        assert_eq!(machine.status, PrinterStatus::Printing);
        assert!(machine.current_job_id.is_some());

        // Exactly one job ended up linked to the printer
        let linked = PrintJob::find()
            .filter(print_job::Column::AssignedPrinterId.eq(machine.id))
            .count(store.connection())
            .await?;
        assert_eq!(linked, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_start_job_and_idempotent_restart() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, Some(1)).await?;
        let started = start_job(&store, job.id, Some(1)).await?;
        assert_eq!(started.status, JobStatus::Printing);

        let target_now = reload_order(&store, target.id).await?;
        assert_eq!(target_now.status, OrderStatus::Printing);

        // Second start is a no-op success with no duplicate audit entry
        let restarted = start_job(&store, job.id, Some(1)).await?;
        assert_eq!(restarted.status, JobStatus::Printing);
        assert_eq!(count_audit_entries(&store, "start_job").await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_start_requires_assignment() -> Result<()> {
        let store = setup_test_store().await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        let result = start_job(&store, job.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "PrintJob", .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_finish_releases_printer_and_consumes_material() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let spool = create_test_filament(&store, "PLA", "Red", 200.0).await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, Some(1)).await?;
        start_job(&store, job.id, Some(1)).await?;
        let finished = finish_job(&store, job.id, Some(1)).await?;

        assert_eq!(finished.status, JobStatus::Done);
        // Historical printer link survives completion
        assert_eq!(finished.assigned_printer_id, Some(machine.id));

        let machine = reload_printer(&store, machine.id).await?;
        assert_eq!(machine.status, PrinterStatus::Idle);
        assert!(machine.current_job_id.is_none());

        // 25g per unit, quantity 2
        let spool = Filament::find_by_id(spool.id)
            .one(store.connection())
            .await?
            .unwrap();
        assert_eq!(spool.stock_grams, 150.0);

        // Sole job done, so the order closes out its print phase
        let target = reload_order(&store, target.id).await?;
        assert_eq!(target.status, OrderStatus::Done);

        Ok(())
    }

    #[tokio::test]
    async fn test_finish_with_unfinished_sibling_leaves_order() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        create_test_filament(&store, "PLA", "Red", 500.0).await?;
        let target = create_test_order(&store).await?;
        let first = create_test_job(&store, target.id, JobStatus::Waiting).await?;
        create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, first.id, machine.id, None).await?;
        start_job(&store, first.id, None).await?;
        finish_job(&store, first.id, None).await?;

        let target = reload_order(&store, target.id).await?;
        assert_eq!(target.status, OrderStatus::Printing);

        Ok(())
    }

    #[tokio::test]
    async fn test_finish_without_matching_filament_still_succeeds() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, None).await?;
        start_job(&store, job.id, None).await?;
        let finished = finish_job(&store, job.id, None).await?;

        assert_eq!(finished.status, JobStatus::Done);
        assert_eq!(count_audit_entries(&store, "consume").await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_finish_preconditions_and_idempotence() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, None).await?;

        // Queued but not started
        let result = finish_job(&store, job.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "PrintJob", .. }
        ));

        start_job(&store, job.id, None).await?;
        finish_job(&store, job.id, None).await?;

        // Finishing again is a no-op success
        let again = finish_job(&store, job.id, None).await?;
        assert_eq!(again.status, JobStatus::Done);
        assert_eq!(count_audit_entries(&store, "finish_job").await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_fail_retry_and_maintenance_flow() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;
        let spare = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, Some(1)).await?;
        start_job(&store, job.id, Some(1)).await?;
        let failed = fail_job(&store, job.id, Some(1)).await?;

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.assigned_printer_id, Some(machine.id));

        let machine_now = reload_printer(&store, machine.id).await?;
        assert_eq!(machine_now.status, PrinterStatus::Maintenance);
        assert!(machine_now.current_job_id.is_none());

        // The broken machine cannot take new work
        let result = assign_job(&store, spare.id, machine.id, Some(1)).await;
        assert!(matches!(result.unwrap_err(), Error::PrinterBusy { .. }));

        let retried = retry_job(&store, job.id, Some(1)).await?;
        assert_eq!(retried.status, JobStatus::Waiting);
        assert!(retried.assigned_printer_id.is_none());

        // Retrying the job does not repair the printer
        let machine_now = reload_printer(&store, machine.id).await?;
        assert_eq!(machine_now.status, PrinterStatus::Maintenance);

        let cleared = clear_printer_maintenance(&store, machine.id, Some(1)).await?;
        assert_eq!(cleared.status, PrinterStatus::Idle);

        let reassigned = assign_job(&store, job.id, machine.id, Some(1)).await?;
        assert_eq!(reassigned.status, JobStatus::Queued);

        Ok(())
    }

    #[tokio::test]
    async fn test_retry_preconditions() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        // Already waiting: no-op success, nothing audited
        let retried = retry_job(&store, job.id, None).await?;
        assert_eq!(retried.status, JobStatus::Waiting);
        assert_eq!(count_audit_entries(&store, "retry_job").await?, 0);

        assign_job(&store, job.id, machine.id, None).await?;
        start_job(&store, job.id, None).await?;

        let result = retry_job(&store, job.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "PrintJob", .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_order_in_review_cascades() -> Result<()> {
        let store = setup_test_store().await?;
        let target = create_test_order_with_status(&store, OrderStatus::Review).await?;
        create_test_job(&store, target.id, JobStatus::Waiting).await?;
        create_test_job(&store, target.id, JobStatus::Waiting).await?;

        cancel_order(&store, target.id, Some(2)).await?;

        assert!(
            Order::find_by_id(target.id)
                .one(store.connection())
                .await?
                .is_none()
        );
        let remaining = PrintJob::find().count(store.connection()).await?;
        assert_eq!(remaining, 0);

        let entries = audit::list_audit_log(
            store.connection(),
            &audit::AuditFilter {
                action: Some("cancel_order".to_string()),
                ..Default::default()
            },
            0,
            50,
        )
        .await?;
        assert_eq!(entries.len(), 1);
        let before: serde_json::Value =
            serde_json::from_str(entries[0].before_json.as_deref().unwrap())?;
        assert_eq!(before["job_count"], json!(2));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_order_requires_review() -> Result<()> {
        let store = setup_test_store().await?;
        let target = create_test_order(&store).await?;

        let result = cancel_order(&store, target.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "Order", .. }
        ));

        assert!(matches!(
            cancel_order(&store, 404, None).await.unwrap_err(),
            Error::NotFound { entity: "Order", id: 404 }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_shipment_lifecycle() -> Result<()> {
        let store = setup_test_store().await?;
        let target = create_test_order_with_status(&store, OrderStatus::Done).await?;

        let parcel = create_shipment(&store, target.id, "UPS", "1Z999", Some(3)).await?;
        assert_eq!(parcel.status, ShipmentStatus::Shipped);
        assert!(parcel.shipped_at.is_some());
        assert!(parcel.delivered_at.is_none());

        let target_now = reload_order(&store, target.id).await?;
        assert_eq!(target_now.status, OrderStatus::Shipped);

        // One shipment per order
        let result = create_shipment(&store, target.id, "UPS", "1Z000", Some(3)).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "Order", .. }
        ));

        let delivered = mark_delivered(&store, target.id, Some(3)).await?;
        assert_eq!(delivered.status, ShipmentStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let target_now = reload_order(&store, target.id).await?;
        assert_eq!(target_now.status, OrderStatus::Completed);

        // Delivery confirmation is idempotent
        mark_delivered(&store, target.id, Some(3)).await?;
        assert_eq!(count_audit_entries(&store, "mark_delivered").await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_shipment_requires_done_order() -> Result<()> {
        let store = setup_test_store().await?;
        let target = create_test_order(&store).await?;

        let result = create_shipment(&store, target.id, "UPS", "1Z999", None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "Order", .. }
        ));

        let missing = mark_delivered(&store, target.id, None).await;
        assert!(matches!(
            missing.unwrap_err(),
            Error::InvalidState { entity: "Order", .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_printer_guarded_by_active_work() -> Result<()> {
        let store = setup_test_store().await?;
        let machine = create_test_printer(&store, "Prusa-01").await?;
        create_test_filament(&store, "PLA", "Red", 500.0).await?;
        let target = create_test_order(&store).await?;
        let job = create_test_job(&store, target.id, JobStatus::Waiting).await?;

        assign_job(&store, job.id, machine.id, None).await?;

        let result = delete_printer(&store, machine.id, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidState { entity: "Printer", .. }
        ));

        start_job(&store, job.id, None).await?;
        finish_job(&store, job.id, None).await?;

        // Done jobs keep the historical link but do not block deletion
        delete_printer(&store, machine.id, None).await?;
        assert!(
            Printer::find_by_id(machine.id)
                .one(store.connection())
                .await?
                .is_none()
        );
        assert_eq!(count_audit_entries(&store, "delete_printer").await?, 1);

        Ok(())
    }
}
