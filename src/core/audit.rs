//! Audit recording - Immutable before/after trail of every state change.
//!
//! [`record`] appends inside the caller's transaction and is never committed
//! independently: if the surrounding operation rolls back, its audit entry
//! vanishes with it, so the trail only ever describes state that actually
//! exists. Entries are append-only; the crate exposes no way to update or
//! delete them.

use crate::entities::{AuditLog, audit_log};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, PaginatorTrait, QueryOrder, Set, prelude::*};
use serde_json::Value;
use tracing::debug;

/// Default page size for audit listings.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Appends one audit entry inside the caller's transaction.
///
/// `before` and `after` are free-form JSON objects holding only the fields
/// the operation changed. `None` means the side is not applicable (e.g. no
/// `after` for a deletion), not that nothing changed.
pub async fn record<C>(
    conn: &C,
    actor_user_id: Option<i64>,
    action: &str,
    entity_type: &str,
    entity_id: i64,
    before: Option<Value>,
    after: Option<Value>,
) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    let before_json = before.as_ref().map(serde_json::to_string).transpose()?;
    let after_json = after.as_ref().map(serde_json::to_string).transpose()?;

    let entry = audit_log::ActiveModel {
        actor_user_id: Set(actor_user_id),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id),
        before_json: Set(before_json),
        after_json: Set(after_json),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    debug!(
        "Recorded audit entry {}: {} on {} {}",
        entry.id, action, entity_type, entity_id
    );
    Ok(entry)
}

/// Filter for audit log listings. Unset fields match everything.
#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    /// Restrict to one entity type (e.g. "PrintJob")
    pub entity_type: Option<String>,
    /// Restrict to one entity id
    pub entity_id: Option<i64>,
    /// Restrict to one action name
    pub action: Option<String>,
    /// Restrict to one actor
    pub actor_user_id: Option<i64>,
}

/// Lists audit entries matching `filter`, newest first.
///
/// `page` is zero-based; each page holds `per_page` entries.
pub async fn list_audit_log(
    db: &DatabaseConnection,
    filter: &AuditFilter,
    page: u64,
    per_page: u64,
) -> Result<Vec<audit_log::Model>> {
    let mut query = AuditLog::find();

    if let Some(entity_type) = &filter.entity_type {
        query = query.filter(audit_log::Column::EntityType.eq(entity_type.as_str()));
    }
    if let Some(entity_id) = filter.entity_id {
        query = query.filter(audit_log::Column::EntityId.eq(entity_id));
    }
    if let Some(action) = &filter.action {
        query = query.filter(audit_log::Column::Action.eq(action.as_str()));
    }
    if let Some(actor) = filter.actor_user_id {
        query = query.filter(audit_log::Column::ActorUserId.eq(actor));
    }

    query
        .order_by_desc(audit_log::Column::CreatedAt)
        .order_by_desc(audit_log::Column::Id)
        .paginate(db, per_page)
        .fetch_page(page)
        .await
        .map_err(Into::into)
}
