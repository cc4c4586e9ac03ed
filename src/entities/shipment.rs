//! Shipment entity - Carrier hand-off record for a completed order.
//!
//! At most one shipment exists per order, and it is created only once every
//! job of the order is done.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Created but not yet handed to the carrier
    #[sea_orm(string_value = "created")]
    Created,
    /// In transit with the carrier
    #[sea_orm(string_value = "shipped")]
    Shipped,
    /// Confirmed delivered
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

/// Shipment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    /// Unique identifier for the shipment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order this shipment fulfills; one shipment per order
    #[sea_orm(unique)]
    pub order_id: i64,
    /// Carrier name
    pub carrier: String,
    /// Carrier tracking reference
    pub tracking_number: String,
    /// Current lifecycle state
    pub status: ShipmentStatus,
    /// When the parcel was handed to the carrier
    pub shipped_at: Option<DateTimeUtc>,
    /// When delivery was confirmed
    pub delivered_at: Option<DateTimeUtc>,
}

/// Defines relationships between Shipment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each shipment belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
