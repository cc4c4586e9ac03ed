//! AuditLog entity - Immutable record of one state-changing operation.
//!
//! Rows are append-only: the crate exposes no update or delete path for them.
//! `before_json`/`after_json` are JSON-text snapshots of only the fields the
//! operation changed; `None` means "not applicable", not "empty".

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier for the audit entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who performed the action, None for system-initiated operations
    pub actor_user_id: Option<i64>,
    /// Operation name (e.g. "assign_job", "consume")
    pub action: String,
    /// Entity type the action applied to (e.g. "PrintJob", "Filament")
    pub entity_type: String,
    /// Primary key of the affected entity
    pub entity_id: i64,
    /// JSON snapshot of the changed fields before the mutation
    pub before_json: Option<String>,
    /// JSON snapshot of the changed fields after the mutation
    pub after_json: Option<String>,
    /// When the entry was recorded
    pub created_at: DateTimeUtc,
}

/// Audit entries reference other entities only by type name and id
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
