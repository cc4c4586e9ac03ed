//! PrintJob entity - One unit of print work belonging to an order.
//!
//! A job references its printer weakly through `assigned_printer_id`. A
//! WAITING job has no printer; QUEUED and PRINTING jobs have exactly one.
//! DONE and FAILED jobs keep the last printer id for history.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not yet assigned to any printer
    #[sea_orm(string_value = "waiting")]
    Waiting,
    /// Reserved on a printer, not started
    #[sea_orm(string_value = "queued")]
    Queued,
    /// Actively printing
    #[sea_orm(string_value = "printing")]
    Printing,
    /// Finished successfully
    #[sea_orm(string_value = "done")]
    Done,
    /// Failed on the printer; can be retried
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Print job database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "print_jobs")]
pub struct Model {
    /// Unique identifier for the job
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    pub order_id: i64,
    /// Storage path of the uploaded STL file
    pub stl_path: String,
    /// Filename as uploaded by the customer
    pub original_filename: String,
    /// Requested material (e.g. "PLA", "PETG", "ABS")
    pub material_type: String,
    /// Requested filament color
    pub color: String,
    /// Number of copies to print
    pub quantity: i32,
    /// Estimated print time per unit, in minutes
    pub estimated_time_minutes: i32,
    /// Estimated material per unit, in grams
    pub estimated_material_grams: f64,
    /// Printer this job is (or was last) assigned to
    pub assigned_printer_id: Option<i64>,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Free-form notes left by operators
    pub operator_notes: Option<String>,
}

/// Defines relationships between PrintJob and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each job belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    /// Non-owning reference to the assigned printer
    #[sea_orm(
        belongs_to = "super::printer::Entity",
        from = "Column::AssignedPrinterId",
        to = "super::printer::Column::Id",
        on_delete = "SetNull"
    )]
    Printer,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::printer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Printer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
