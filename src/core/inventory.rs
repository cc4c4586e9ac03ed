//! Inventory management - Filament stock tracking with clamped deduction.
//!
//! Deduction never rejects a request: when the spool holds less than asked,
//! the stock is clamped to zero and the shortfall is reported in the returned
//! [`Consumption`]. Print jobs finish regardless of bookkeeping drift; the
//! numbers tell the operator to reorder, they do not block the floor.

use crate::core::audit;
use crate::entities::{Filament, filament};
use crate::errors::{Error, Result};
use crate::store::{EntityKind, Store};
use sea_orm::sea_query::Expr;
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, prelude::*};
use serde_json::json;
use tracing::{debug, info};

/// Advisory stock check result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StockCheck {
    /// The spool covers the requested amount
    Available,
    /// The spool falls short; both sides of the gap are reported
    Insufficient {
        /// Grams currently on the spool
        available_grams: f64,
        /// Grams the caller asked about
        needed_grams: f64,
    },
}

/// Outcome of a stock deduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consumption {
    /// The spool that was drawn from
    pub filament_id: i64,
    /// Grams the caller asked to deduct
    pub requested_grams: f64,
    /// Grams actually deducted (equal to requested unless clamped)
    pub deducted_grams: f64,
    /// Grams left on the spool afterwards
    pub remaining_grams: f64,
    /// Whether the deduction was clamped by insufficient stock
    pub clamped: bool,
}

impl Consumption {
    /// True when the full requested amount came off the spool.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        !self.clamped
    }
}

fn validate_grams(grams: f64) -> Result<()> {
    if !grams.is_finite() || grams < 0.0 {
        return Err(Error::InvalidAmount { grams });
    }
    Ok(())
}

/// Reports whether a spool covers `needed_grams`. Advisory only: stock may
/// change before any subsequent deduction.
pub async fn check_stock(
    db: &DatabaseConnection,
    filament_id: i64,
    needed_grams: f64,
) -> Result<StockCheck> {
    validate_grams(needed_grams)?;

    let spool = Filament::find_by_id(filament_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Filament",
            id: filament_id,
        })?;

    if spool.stock_grams >= needed_grams {
        Ok(StockCheck::Available)
    } else {
        Ok(StockCheck::Insufficient {
            available_grams: spool.stock_grams,
            needed_grams,
        })
    }
}

/// Deducts grams from a spool, clamping at zero.
///
/// Takes the filament row lock and runs in its own transaction. The audit
/// entry carries the stock level before and after; a deduction the clamp
/// reduced to nothing writes no row and leaves no audit entry.
pub async fn consume(
    store: &Store,
    filament_id: i64,
    grams: f64,
    actor_user_id: Option<i64>,
) -> Result<Consumption> {
    validate_grams(grams)?;

    let _guard = store.lock(EntityKind::Filament, filament_id).await?;
    let txn = store.begin().await?;
    let outcome = consume_within(&txn, filament_id, grams, actor_user_id).await?;
    txn.commit().await?;

    info!(
        "Consumed {:.1}g from filament {} ({:.1}g remaining)",
        outcome.deducted_grams, filament_id, outcome.remaining_grams
    );
    Ok(outcome)
}

/// Deducts grams inside the caller's transaction.
///
/// The caller must already hold the filament row lock; job completion uses
/// this to fold the deduction into the same transaction as the status change.
pub async fn consume_within<C>(
    conn: &C,
    filament_id: i64,
    grams: f64,
    actor_user_id: Option<i64>,
) -> Result<Consumption>
where
    C: ConnectionTrait,
{
    validate_grams(grams)?;

    let spool = Filament::find_by_id(filament_id)
        .one(conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "Filament",
            id: filament_id,
        })?;

    let available = spool.stock_grams;
    let deducted = grams.min(available);
    let remaining = available - deducted;
    let clamped = grams > available;

    if deducted > 0.0 {
        let mut active: filament::ActiveModel = spool.into();
        active.stock_grams = Set(remaining);
        active.update(conn).await?;

        audit::record(
            conn,
            actor_user_id,
            "consume",
            "Filament",
            filament_id,
            Some(json!({"stock_grams": available})),
            Some(json!({"stock_grams": remaining})),
        )
        .await?;
    } else {
        debug!(
            "Consumption of {:.1}g from filament {} clamped to nothing (spool empty)",
            grams, filament_id
        );
    }

    Ok(Consumption {
        filament_id,
        requested_grams: grams,
        deducted_grams: deducted,
        remaining_grams: remaining,
        clamped,
    })
}

/// Sets a spool's stock to an absolute level (manual restock or correction).
///
/// Setting the level it already holds changes nothing and leaves no audit
/// entry.
pub async fn adjust_stock(
    store: &Store,
    filament_id: i64,
    new_stock_grams: f64,
    actor_user_id: Option<i64>,
) -> Result<filament::Model> {
    validate_grams(new_stock_grams)?;

    let _guard = store.lock(EntityKind::Filament, filament_id).await?;
    let txn = store.begin().await?;

    let spool = Filament::find_by_id(filament_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "Filament",
            id: filament_id,
        })?;

    let old_stock = spool.stock_grams;
    if old_stock == new_stock_grams {
        return Ok(spool);
    }

    let mut active: filament::ActiveModel = spool.into();
    active.stock_grams = Set(new_stock_grams);
    let updated = active.update(&txn).await?;

    audit::record(
        &txn,
        actor_user_id,
        "update_stock",
        "Filament",
        filament_id,
        Some(json!({"stock_grams": old_stock})),
        Some(json!({"stock_grams": new_stock_grams})),
    )
    .await?;
    txn.commit().await?;

    info!(
        "Stock for filament {} set to {:.1}g (was {:.1}g)",
        filament_id, new_stock_grams, old_stock
    );
    Ok(updated)
}

/// Lists spools at or below their reorder threshold.
pub async fn reorder_suggestions(db: &DatabaseConnection) -> Result<Vec<filament::Model>> {
    Filament::find()
        .filter(
            Expr::col(filament::Column::StockGrams)
                .lte(Expr::col(filament::Column::ReorderLevelGrams)),
        )
        .all(db)
        .await
        .map_err(Into::into)
}
