//! Printer entity - A physical machine in the farm.
//!
//! `current_job_id` is the hot contended field: it is only ever mutated while
//! the printer's row lock is held, and a printer holds at most one job.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    /// Available for assignment
    #[sea_orm(string_value = "idle")]
    Idle,
    /// Reserved by or running a job
    #[sea_orm(string_value = "printing")]
    Printing,
    /// Hardware fault reported by the machine
    #[sea_orm(string_value = "error")]
    Error,
    /// Taken out of rotation after a failed job; a human must clear it
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
}

/// Printer database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "printers")]
pub struct Model {
    /// Unique identifier for the printer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable machine name
    #[sea_orm(unique)]
    pub name: String,
    /// Physical location in the shop
    pub location: Option<String>,
    /// Current lifecycle state
    pub status: PrinterStatus,
    /// Free-form maintenance notes
    pub notes: Option<String>,
    /// Job currently reserved on or running on this printer
    pub current_job_id: Option<i64>,
}

/// Defines relationships between Printer and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Jobs that are or were assigned to this printer
    #[sea_orm(has_many = "super::print_job::Entity")]
    PrintJobs,
}

impl Related<super::print_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrintJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
