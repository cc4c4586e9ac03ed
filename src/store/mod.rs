//! Entity store - durable keyed storage with row-level exclusivity.
//!
//! [`Store`] pairs a SeaORM connection with the in-process [`LockManager`].
//! Workflow operations use it in a fixed pattern: take every needed row lock
//! via [`Store::lock_many`] (sorted into the global lock order), then open
//! one transaction with [`Store::begin`], mutate, append the audit record,
//! and commit. A transaction dropped without commit rolls back, so every
//! early-return path leaves the store untouched.
//!
//! Point lookups and filtered scans go through SeaORM's `find()` API
//! directly; this module adds only what SeaORM does not provide: row
//! exclusivity and the explicit owned-collection deletion rule for orders.

pub mod locks;

pub use locks::{EntityKind, LockManager, RowGuard};

use crate::entities::{Order, PrintJob, print_job};
use crate::errors::{Error, Result};
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on how long an operation waits for a contended row.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Shared handle to the backing database and the row lock registry.
///
/// Cloning is cheap; clones share the same lock registry, which is what makes
/// the per-row exclusivity process-wide.
#[derive(Debug, Clone)]
pub struct Store {
    db: DatabaseConnection,
    locks: Arc<LockManager>,
}

impl Store {
    /// Wraps an existing connection with a lock registry.
    #[must_use]
    pub fn new(db: DatabaseConnection, lock_wait: Duration) -> Self {
        Self {
            db,
            locks: Arc::new(LockManager::new(lock_wait)),
        }
    }

    /// Connects to the database and wraps the connection.
    ///
    /// The pool is capped at a single connection: SQLite allows one writer at
    /// a time, and a single-connection pool also keeps `sqlite::memory:`
    /// pointing at one database instead of one per pooled connection.
    pub async fn connect(url: &str, lock_wait: Duration) -> Result<Self> {
        let mut options = ConnectOptions::new(url.to_owned());
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await?;
        Ok(Self::new(db, lock_wait))
    }

    /// The underlying connection, for plain reads and scans.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Opens a database transaction. Rolls back on drop unless committed.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.db.begin().await.map_err(Into::into)
    }

    /// Acquires the exclusive lock for one row.
    ///
    /// # Errors
    /// [`Error::Busy`] when the row stays contended past the bounded wait.
    pub async fn lock(&self, kind: EntityKind, id: i64) -> Result<RowGuard> {
        self.locks.acquire(kind, id).await
    }

    /// Acquires several row locks in the fixed global order.
    ///
    /// Keys are sorted by (lock rank, id) and deduplicated before
    /// acquisition, so callers cannot introduce a lock-order cycle no matter
    /// how they list their rows. Guards are released together on drop.
    pub async fn lock_many(&self, keys: &[(EntityKind, i64)]) -> Result<Vec<RowGuard>> {
        let mut ordered: Vec<(EntityKind, i64)> = keys.to_vec();
        ordered.sort_by_key(|&(kind, id)| (kind.rank(), id));
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for (kind, id) in ordered {
            guards.push(self.locks.acquire(kind, id).await?);
        }
        Ok(guards)
    }
}

/// Deletes an order together with every job it owns.
///
/// Order exclusively owns its print jobs, so removing an order cascades to
/// them; this is the explicit deletion rule rather than an incidental ORM
/// side effect. Runs inside the caller's transaction.
///
/// # Errors
/// [`Error::NotFound`] when the order does not exist; nothing is deleted in
/// that case.
pub async fn delete_order_with_jobs<C>(conn: &C, order_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let jobs_removed = PrintJob::delete_many()
        .filter(print_job::Column::OrderId.eq(order_id))
        .exec(conn)
        .await?
        .rows_affected;

    let orders_removed = Order::delete_by_id(order_id).exec(conn).await?.rows_affected;
    if orders_removed == 0 {
        return Err(Error::NotFound {
            entity: "Order",
            id: order_id,
        });
    }

    Ok(jobs_removed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::JobStatus;
    use crate::test_utils::*;
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_lock_many_orders_and_dedups() -> Result<()> {
        let store = setup_test_store().await?;

        let guards = store
            .lock_many(&[
                (EntityKind::Order, 9),
                (EntityKind::Printer, 3),
                (EntityKind::Printer, 3),
                (EntityKind::Filament, 2),
            ])
            .await?;

        assert_eq!(guards.len(), 3);
        assert_eq!(guards[0].kind(), EntityKind::Printer);
        assert_eq!(guards[1].kind(), EntityKind::Filament);
        assert_eq!(guards[2].kind(), EntityKind::Order);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_order_with_jobs_cascades() -> Result<()> {
        let store = setup_test_store().await?;
        let order = create_test_order(&store).await?;
        create_test_job(&store, order.id, JobStatus::Waiting).await?;
        create_test_job(&store, order.id, JobStatus::Waiting).await?;

        let txn = store.begin().await?;
        let removed = delete_order_with_jobs(&txn, order.id).await?;
        txn.commit().await?;

        assert_eq!(removed, 2);
        let remaining_jobs = PrintJob::find().count(store.connection()).await?;
        assert_eq!(remaining_jobs, 0);
        let remaining_orders = Order::find().count(store.connection()).await?;
        assert_eq!(remaining_orders, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_order_with_jobs_missing_order() -> Result<()> {
        let store = setup_test_store().await?;

        let txn = store.begin().await?;
        let result = delete_order_with_jobs(&txn, 404).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound {
                entity: "Order",
                id: 404
            }
        ));

        Ok(())
    }
}
