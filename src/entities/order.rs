//! Order entity - A customer's print order, owning one or more print jobs.
//!
//! Order status is a closed enum persisted as a string. The status only moves
//! forward along the fulfillment path; CANCELLED is reachable from REVIEW only
//! and removes the order together with its jobs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle states of an order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Just placed, not yet reviewed
    #[sea_orm(string_value = "new")]
    New,
    /// Under operator review; the only state an order can be cancelled from
    #[sea_orm(string_value = "review")]
    Review,
    /// All jobs assigned to printers, none started yet
    #[sea_orm(string_value = "queued")]
    Queued,
    /// At least one job is on a printer
    #[sea_orm(string_value = "printing")]
    Printing,
    /// Every owned job finished printing
    #[sea_orm(string_value = "done")]
    Done,
    /// Shipment created and handed to the carrier
    #[sea_orm(string_value = "shipped")]
    Shipped,
    /// Delivered to the customer
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Cancelled while in review
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User ID of the customer who placed the order
    pub customer_user_id: i64,
    /// Current lifecycle state
    pub status: OrderStatus,
    /// Rush-handling flag set at review time
    pub priority: bool,
    /// JSON snapshot of the shipping address taken at order time
    pub shipping_address: Option<String>,
    /// Quoted price at intake
    pub total_estimated_price: f64,
    /// Final price fixed at review, None until then
    pub total_final_price: Option<f64>,
    /// When the order was placed
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One order owns many print jobs
    #[sea_orm(has_many = "super::print_job::Entity")]
    PrintJobs,
    /// One order has at most one shipment
    #[sea_orm(has_one = "super::shipment::Entity")]
    Shipment,
}

impl Related<super::print_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrintJobs.def()
    }
}

impl Related<super::shipment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shipment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
